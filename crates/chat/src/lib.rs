#![deny(unsafe_code)]

//! Conversation engine: a single-turn chat loop where the agent's canned
//! reply is revealed word by word after a staged "typing" pause.
//!
//! The [`engine::ChatEngine`] owns the moving parts; the other modules are
//! its building blocks and stay usable on their own.

pub mod engine;
pub mod indicator;
pub mod message;
pub mod scroll;
pub mod settings;
pub mod timeline;

pub use engine::{ChatEngine, EngineFeeds, SubmitOutcome};
pub use indicator::{DOT_COUNT, DotFrame, IndicatorTicker, TypingIndicator, dot_frame, spawn_frame_feed};
pub use message::{
    Message, MessageId, MessagePhase, Sender, TurnRejection, TurnState, TurnTransition,
    TurnTransitionResult,
};
pub use scroll::{ScrollCommand, ScrollCoordinator};
pub use settings::{EngineSettings, SettingsError};
pub use timeline::{TimelineEvent, TimelineRejection, TimelineStore};
