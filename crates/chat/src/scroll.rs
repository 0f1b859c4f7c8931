use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Request emitted toward the view layer once content growth has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollCommand {
    ToNewest,
}

struct ScrollInner {
    settle_task: Option<JoinHandle<()>>,
    shut_down: bool,
}

/// Debounces timeline mutations into single "scroll to newest" requests.
///
/// Mutations arriving while a settle timer is pending coalesce into that one
/// request instead of queueing redundant scrolls. Must be used inside a tokio
/// runtime because the settle timer is a spawned task.
#[derive(Clone)]
pub struct ScrollCoordinator {
    settle_delay: Duration,
    command_tx: mpsc::UnboundedSender<ScrollCommand>,
    inner: Arc<Mutex<ScrollInner>>,
}

impl ScrollCoordinator {
    pub fn new(settle_delay: Duration) -> (Self, mpsc::UnboundedReceiver<ScrollCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            settle_delay,
            command_tx,
            inner: Arc::new(Mutex::new(ScrollInner {
                settle_task: None,
                shut_down: false,
            })),
        };
        (coordinator, command_rx)
    }

    /// Schedules one scroll request after the settle delay, letting the view
    /// finish re-measuring before it runs.
    pub fn on_timeline_mutated(&self) {
        let mut inner = lock_inner(&self.inner);
        if inner.shut_down {
            return;
        }

        if inner
            .settle_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            // Coalesce: one pending request covers every mutation in the window.
            return;
        }

        let command_tx = self.command_tx.clone();
        let settle_delay = self.settle_delay;
        inner.settle_task = Some(tokio::spawn(async move {
            tokio::time::sleep(settle_delay).await;
            let _ = command_tx.send(ScrollCommand::ToNewest);
        }));
    }

    /// Aborts any pending settle timer. Idempotent.
    pub fn shut_down(&self) {
        let mut inner = lock_inner(&self.inner);
        inner.shut_down = true;
        if let Some(task) = inner.settle_task.take() {
            task.abort();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        lock_inner(&self.inner).shut_down
    }
}

fn lock_inner(inner: &Arc<Mutex<ScrollInner>>) -> MutexGuard<'_, ScrollInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
