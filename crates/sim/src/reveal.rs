use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, oneshot};

/// Identifier for one reveal session.
///
/// This must change on every turn so stale reveal events can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevealSessionId(pub u64);

impl RevealSessionId {
    /// Creates a typed reveal session identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Payload of one reveal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealPayload {
    /// Growing prefix of the target: the first `index + 1` words rejoined
    /// with single spaces.
    Prefix { index: usize, text: String },
    /// Emitted exactly once, strictly after the last prefix, and only when
    /// the session was not cancelled.
    Done,
}

/// One event emitted by a reveal worker, tagged with its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealEvent {
    pub session_id: RevealSessionId,
    pub payload: RevealPayload,
}

pub type RevealWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Consumer half of one reveal session.
///
/// Dropping the stream cancels the session, which stops the worker at its
/// next timer wait instead of leaving the sleep pending.
pub struct RevealEventStream {
    session_id: RevealSessionId,
    events: mpsc::UnboundedReceiver<RevealEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// Worker/stream pair for one reveal session.
///
/// The worker future must be spawned by the caller; the stream yields its
/// events and owns cancellation.
pub struct RevealStreamHandle {
    pub stream: RevealEventStream,
    pub worker: RevealWorker,
}

impl RevealEventStream {
    pub(crate) fn new(
        session_id: RevealSessionId,
        events: mpsc::UnboundedReceiver<RevealEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            session_id,
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn session_id(&self) -> RevealSessionId {
        self.session_id
    }

    pub async fn recv(&mut self) -> Option<RevealEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RevealEvent> {
        self.events.try_recv().ok()
    }

    /// Requests cancellation. Idempotent: the second and later calls return
    /// false without error.
    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for RevealEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

impl Stream for RevealEventStream {
    type Item = RevealEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RevealEvent>> {
        self.events.poll_recv(cx)
    }
}

/// Turns a target string into a timed sequence of growing word prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealScheduler {
    token_delay: Duration,
}

impl RevealScheduler {
    pub const fn new(token_delay: Duration) -> Self {
        Self { token_delay }
    }

    pub const fn token_delay(&self) -> Duration {
        self.token_delay
    }

    /// Starts one reveal session over `target`.
    ///
    /// Word `i` is emitted at relative time `i * token_delay`; word 0 fires
    /// immediately so the first word never waits a full tick.
    pub fn start(&self, session_id: RevealSessionId, target: &str) -> RevealStreamHandle {
        let (event_tx, stream, cancel_rx) = make_event_stream(session_id);
        let words = split_words(target);
        let worker: RevealWorker = Box::pin(run_reveal_worker(
            session_id,
            words,
            self.token_delay,
            event_tx,
            cancel_rx,
        ));

        RevealStreamHandle { stream, worker }
    }
}

/// Splits on single spaces.
///
/// Whitespace runs other than single spaces are not preserved losslessly;
/// prefixes are rejoined with single spaces.
fn split_words(target: &str) -> Vec<String> {
    target.split(' ').map(str::to_string).collect()
}

async fn run_reveal_worker(
    session_id: RevealSessionId,
    words: Vec<String>,
    token_delay: Duration,
    event_tx: mpsc::UnboundedSender<RevealEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let mut revealed = String::new();

    for (index, word) in words.iter().enumerate() {
        if index > 0 {
            tokio::select! {
                _ = &mut cancel_rx => {
                    // Dropping out of the select drops the pending sleep, so no
                    // timer outlives the session.
                    tracing::debug!(session_id = session_id.0, index, "reveal session cancelled");
                    return;
                }
                _ = tokio::time::sleep(token_delay) => {}
            }
            revealed.push(' ');
        }

        revealed.push_str(word);

        let event = RevealEvent {
            session_id,
            payload: RevealPayload::Prefix {
                index,
                text: revealed.clone(),
            },
        };
        if event_tx.send(event).is_err() {
            // Receiver gone; completion must not fire either.
            return;
        }
    }

    let _ = event_tx.send(RevealEvent {
        session_id,
        payload: RevealPayload::Done,
    });
}

fn make_event_stream(
    session_id: RevealSessionId,
) -> (
    mpsc::UnboundedSender<RevealEvent>,
    RevealEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        RevealEventStream::new(session_id, event_rx, cancel_tx),
        cancel_rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    const SESSION: RevealSessionId = RevealSessionId::new(7);

    fn scheduler_ms(token_delay_ms: u64) -> RevealScheduler {
        RevealScheduler::new(Duration::from_millis(token_delay_ms))
    }

    #[test]
    fn split_words_matches_single_space_tokenization() {
        assert_eq!(split_words("red panda sleeps"), ["red", "panda", "sleeps"]);
        assert_eq!(split_words("one"), ["one"]);
        // Double spaces produce an empty token; runs are not collapsed.
        assert_eq!(split_words("a  b"), ["a", "", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn emits_prefixes_at_token_delay_intervals() {
        let handle = scheduler_ms(100).start(SESSION, "red panda sleeps");
        let mut stream = handle.stream;
        tokio::spawn(handle.worker);

        let start = Instant::now();
        let mut observed = Vec::new();
        while let Some(event) = stream.recv().await {
            assert_eq!(event.session_id, SESSION);
            match event.payload {
                RevealPayload::Prefix { index, text } => {
                    observed.push((index, text, start.elapsed()));
                }
                RevealPayload::Done => break,
            }
        }

        assert_eq!(
            observed,
            vec![
                (0, "red".to_string(), Duration::ZERO),
                (1, "red panda".to_string(), Duration::from_millis(100)),
                (2, "red panda sleeps".to_string(), Duration::from_millis(200)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn done_fires_exactly_once_after_last_prefix() {
        let handle = scheduler_ms(50).start(SESSION, "hi there");
        let mut stream = handle.stream;
        tokio::spawn(handle.worker);

        let mut payloads = Vec::new();
        while let Some(event) = stream.recv().await {
            let done = matches!(event.payload, RevealPayload::Done);
            payloads.push(event.payload);
            if done {
                break;
            }
        }

        assert_eq!(payloads.len(), 3);
        assert!(matches!(
            payloads[1],
            RevealPayload::Prefix { index: 1, .. }
        ));
        assert!(matches!(payloads[2], RevealPayload::Done));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn single_word_target_completes_without_waiting() {
        let handle = scheduler_ms(100).start(SESSION, "hello");
        let mut stream = handle.stream;
        tokio::spawn(handle.worker);

        let start = Instant::now();
        let first = stream.recv().await.expect("prefix");
        let done = stream.recv().await.expect("done");

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(matches!(first.payload, RevealPayload::Prefix { index: 0, .. }));
        assert!(matches!(done.payload, RevealPayload::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_updates_and_completion() {
        let handle = scheduler_ms(100).start(SESSION, "a b c d");
        let mut stream = handle.stream;
        let worker = tokio::spawn(handle.worker);

        // First prefix arrives immediately.
        let first = stream.recv().await.expect("first prefix");
        assert!(matches!(first.payload, RevealPayload::Prefix { index: 0, .. }));

        assert!(stream.cancel());
        // Second cancel is a no-op, not an error.
        assert!(!stream.cancel());

        worker.await.expect("worker exits after cancel");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_stream_cancels_the_worker() {
        let handle = scheduler_ms(100).start(SESSION, "a b c");
        let worker = tokio::spawn(handle.worker);
        drop(handle.stream);

        worker.await.expect("worker exits once the stream is gone");
    }
}
