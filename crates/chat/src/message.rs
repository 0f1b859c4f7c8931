use vitaly_sim::RevealSessionId;

/// Stable identifier for one message, assigned monotonically at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a typed message identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Chat speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    User,
    Agent,
}

/// Lifecycle position of one message.
///
/// `Typing` is a placeholder with no text while the indicator runs.
/// `Streaming` means the text is being revealed in growing prefixes.
/// `Final` content is settled and immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessagePhase {
    Typing,
    Streaming,
    Final,
}

impl MessagePhase {
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Final)
    }
}

/// Core message model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub phase: MessagePhase,
    pub text: String,
}

impl Message {
    /// Creates a message with explicit phase.
    pub fn new(
        id: MessageId,
        sender: Sender,
        phase: MessagePhase,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            sender,
            phase,
            text: text.into(),
        }
    }

    /// Creates a settled user entry.
    pub fn user_final(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, Sender::User, MessagePhase::Final, text)
    }

    /// Creates an agent placeholder shown while "thinking".
    pub fn agent_typing(id: MessageId) -> Self {
        Self::new(id, Sender::Agent, MessagePhase::Typing, String::new())
    }

    pub fn is_final(&self) -> bool {
        self.phase.is_final()
    }
}

/// Turn lifecycle boundary for the response cycle.
///
/// One turn runs `Idle -> TypingDelay -> Streaming -> Idle`; a new turn
/// cannot begin until the previous one returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    TypingDelay(RevealSessionId),
    Streaming(RevealSessionId),
}

/// State transition input for the turn lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnTransition {
    Begin(RevealSessionId),
    StartStreaming(RevealSessionId),
    Complete(RevealSessionId),
    Abort(RevealSessionId),
}

/// Rejection reason for illegal turn transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRejection {
    TurnInFlight {
        active: RevealSessionId,
        attempted: RevealSessionId,
    },
    NoActiveTurn,
    SessionMismatch {
        active: RevealSessionId,
        attempted: RevealSessionId,
    },
}

pub type TurnTransitionResult = Result<TurnState, TurnRejection>;

impl TurnState {
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns the in-flight session if and only if a turn is running.
    pub const fn active_session(&self) -> Option<RevealSessionId> {
        match self {
            Self::Idle => None,
            Self::TypingDelay(session) | Self::Streaming(session) => Some(*session),
        }
    }

    /// Applies one transition deterministically.
    ///
    /// `Begin` is only legal from `Idle`; every later transition must match
    /// the active session exactly.
    pub fn apply(&self, transition: TurnTransition) -> TurnTransitionResult {
        match transition {
            TurnTransition::Begin(session) => self.apply_begin(session),
            TurnTransition::StartStreaming(session) => self.apply_start_streaming(session),
            TurnTransition::Complete(session) => self.apply_complete(session),
            TurnTransition::Abort(session) => self.apply_abort(session),
        }
    }

    fn apply_begin(&self, session: RevealSessionId) -> TurnTransitionResult {
        match self {
            Self::Idle => Ok(Self::TypingDelay(session)),
            Self::TypingDelay(active) | Self::Streaming(active) => {
                Err(TurnRejection::TurnInFlight {
                    active: *active,
                    attempted: session,
                })
            }
        }
    }

    fn apply_start_streaming(&self, session: RevealSessionId) -> TurnTransitionResult {
        match self {
            Self::TypingDelay(active) if *active == session => Ok(Self::Streaming(session)),
            Self::TypingDelay(active) | Self::Streaming(active) => {
                Err(TurnRejection::SessionMismatch {
                    active: *active,
                    attempted: session,
                })
            }
            Self::Idle => Err(TurnRejection::NoActiveTurn),
        }
    }

    fn apply_complete(&self, session: RevealSessionId) -> TurnTransitionResult {
        match self {
            Self::Streaming(active) if *active == session => Ok(Self::Idle),
            Self::TypingDelay(active) | Self::Streaming(active) => {
                Err(TurnRejection::SessionMismatch {
                    active: *active,
                    attempted: session,
                })
            }
            Self::Idle => Err(TurnRejection::NoActiveTurn),
        }
    }

    fn apply_abort(&self, session: RevealSessionId) -> TurnTransitionResult {
        match self {
            Self::TypingDelay(active) | Self::Streaming(active) if *active == session => {
                Ok(Self::Idle)
            }
            Self::TypingDelay(active) | Self::Streaming(active) => {
                Err(TurnRejection::SessionMismatch {
                    active: *active,
                    attempted: session,
                })
            }
            Self::Idle => Err(TurnRejection::NoActiveTurn),
        }
    }
}
