use crate::message::{Message, MessageId, MessagePhase, Sender};

/// Notification emitted synchronously after each timeline mutation, in the
/// order the mutation was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineEvent {
    Appended {
        id: MessageId,
        sender: Sender,
        phase: MessagePhase,
    },
    TailReplaced {
        id: MessageId,
        phase: MessagePhase,
    },
}

/// Rejection reason for illegal timeline mutations.
///
/// `StaleMutation` covers every attempt after teardown; the attempt is
/// dropped and logged, never escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineRejection {
    TailNotFinal { tail_id: MessageId },
    EmptyTimeline,
    FinalTail { tail_id: MessageId },
    StaleMutation,
}

type ObserverFn = Box<dyn FnMut(&TimelineEvent) + Send>;

/// Ordered message sequence: append-only except for the tail, which may be
/// mutated in place while it has not settled.
///
/// The store is the single source of truth; every other component either
/// mutates it through the engine or observes it through subscriptions.
pub struct TimelineStore {
    messages: Vec<Message>,
    next_message_id: u64,
    observers: Vec<ObserverFn>,
    torn_down: bool,
}

impl TimelineStore {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_message_id: 1,
            observers: Vec::new(),
            torn_down: false,
        }
    }

    /// Registers an observer invoked synchronously after every mutation.
    pub fn subscribe(&mut self, observer: impl FnMut(&TimelineEvent) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Appends a new message, allocating its identifier.
    ///
    /// Rejected while an existing tail has not settled: at most one message
    /// may be outside `Final` at any instant.
    pub fn append(
        &mut self,
        sender: Sender,
        phase: MessagePhase,
        text: impl Into<String>,
    ) -> Result<MessageId, TimelineRejection> {
        if self.torn_down {
            tracing::warn!("dropped append on a torn-down timeline");
            return Err(TimelineRejection::StaleMutation);
        }

        if let Some(tail) = self.messages.last()
            && !tail.is_final()
        {
            return Err(TimelineRejection::TailNotFinal { tail_id: tail.id });
        }

        let id = self.alloc_message_id();
        self.messages.push(Message::new(id, sender, phase, text));
        self.notify(TimelineEvent::Appended { id, sender, phase });
        Ok(id)
    }

    /// Applies `updater` to the last message only.
    ///
    /// Used for phase transitions and incremental text growth; rejected once
    /// the tail has settled, so no call site can mutate finished content.
    pub fn replace_tail(
        &mut self,
        updater: impl FnOnce(&mut Message),
    ) -> Result<(), TimelineRejection> {
        if self.torn_down {
            tracing::warn!("dropped tail replacement on a torn-down timeline");
            return Err(TimelineRejection::StaleMutation);
        }

        let Some(tail) = self.messages.last_mut() else {
            return Err(TimelineRejection::EmptyTimeline);
        };
        if tail.is_final() {
            return Err(TimelineRejection::FinalTail { tail_id: tail.id });
        }

        updater(tail);
        let event = TimelineEvent::TailReplaced {
            id: tail.id,
            phase: tail.phase,
        };
        self.notify(event);
        Ok(())
    }

    /// Read-only view for rendering.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn tail(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Marks the store dead. Idempotent; later mutation attempts are dropped
    /// and observers receive nothing further.
    pub fn tear_down(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.observers.clear();
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn alloc_message_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id = self.next_message_id.saturating_add(1);
        id
    }

    fn notify(&mut self, event: TimelineEvent) {
        for observer in &mut self.observers {
            observer(&event);
        }
    }
}

impl Default for TimelineStore {
    fn default() -> Self {
        Self::new()
    }
}
