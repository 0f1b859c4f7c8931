#![deny(unsafe_code)]

/// Word-by-word reveal scheduling with cancellable worker/stream pairs.
pub mod reveal;
/// Canned response pool and pluggable response selection.
pub mod script;

pub use reveal::{
    RevealEvent, RevealEventStream, RevealPayload, RevealScheduler, RevealSessionId,
    RevealStreamHandle, RevealWorker,
};
pub use script::{
    FixedSelector, ResponsePool, ResponseSelector, ScriptError, ScriptResult, ScriptedResponder,
    UniformSelector,
};
