use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use vitaly_sim::{
    ResponseSelector, RevealPayload, RevealScheduler, RevealSessionId, ScriptedResponder,
    UniformSelector,
};

use crate::indicator::{DOT_COUNT, DotFrame, TypingIndicator};
use crate::message::{Message, MessagePhase, Sender, TurnState, TurnTransition};
use crate::scroll::{ScrollCommand, ScrollCoordinator};
use crate::settings::{EngineSettings, SettingsError};
use crate::timeline::{TimelineEvent, TimelineStore};

/// Outcome of one submission. Rejections are deliberate no-ops for the
/// caller, never failures, and never disturb an in-flight turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted { session_id: RevealSessionId },
    RejectedEmptyInput,
    RejectedTurnInFlight,
    RejectedTornDown,
}

impl SubmitOutcome {
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Receiver ends of the engine's outward feeds, handed out once at
/// construction for the view layer to consume.
pub struct EngineFeeds {
    /// One event per timeline mutation; the view re-renders on each.
    pub timeline_events: mpsc::UnboundedReceiver<TimelineEvent>,
    /// Debounced "scroll to newest" requests.
    pub scroll_commands: mpsc::UnboundedReceiver<ScrollCommand>,
}

/// Per-turn cancellation bookkeeping so teardown is a single "cancel all
/// handles" operation.
struct ActiveTurn {
    session_id: RevealSessionId,
    cancel_tx: Option<oneshot::Sender<()>>,
    driver: JoinHandle<()>,
}

struct TurnSlot {
    state: TurnState,
    active: Option<ActiveTurn>,
    next_session_id: u64,
    torn_down: bool,
}

struct EngineShared {
    typing_delay: Duration,
    scheduler: RevealScheduler,
    responder: StdMutex<ScriptedResponder>,
    timeline: Mutex<TimelineStore>,
    turn: StdMutex<TurnSlot>,
    scroll: ScrollCoordinator,
    indicator: StdMutex<TypingIndicator>,
}

/// Orchestrates one turn at a time: user append, typing placeholder, the
/// fake thinking delay, then the word-by-word reveal, with every timer
/// individually cancellable.
///
/// Cloning shares the same engine; all methods take `&self`.
#[derive(Clone)]
pub struct ChatEngine {
    shared: Arc<EngineShared>,
}

impl ChatEngine {
    /// Builds an engine with uniform random response selection.
    pub fn new(settings: EngineSettings) -> Result<(Self, EngineFeeds), SettingsError> {
        Self::with_selector(settings, Box::new(UniformSelector))
    }

    /// Builds an engine with an injected selector, e.g. a fixed index for
    /// deterministic tests.
    pub fn with_selector(
        settings: EngineSettings,
        selector: Box<dyn ResponseSelector>,
    ) -> Result<(Self, EngineFeeds), SettingsError> {
        let settings = settings.normalized();
        let pool = settings.response_pool()?;
        let responder = ScriptedResponder::new(pool, selector);

        let (scroll, scroll_commands) = ScrollCoordinator::new(settings.scroll_settle());
        let (event_tx, timeline_events) = mpsc::unbounded_channel();

        let mut timeline = TimelineStore::new();
        // Seed the greeting before wiring observers so construction neither
        // notifies the view nor schedules a scroll.
        if let Err(rejection) = timeline.append(Sender::Agent, MessagePhase::Final, &settings.greeting)
        {
            tracing::warn!(?rejection, "failed to seed greeting message");
        }

        timeline.subscribe(move |event| {
            let _ = event_tx.send(*event);
        });
        let scroll_observer = scroll.clone();
        timeline.subscribe(move |_| scroll_observer.on_timeline_mutated());

        let shared = Arc::new(EngineShared {
            typing_delay: settings.typing_delay(),
            scheduler: RevealScheduler::new(settings.reveal_token_delay()),
            responder: StdMutex::new(responder),
            timeline: Mutex::new(timeline),
            turn: StdMutex::new(TurnSlot {
                state: TurnState::Idle,
                active: None,
                next_session_id: 1,
                torn_down: false,
            }),
            scroll,
            indicator: StdMutex::new(TypingIndicator::new()),
        });

        Ok((
            Self { shared },
            EngineFeeds {
                timeline_events,
                scroll_commands,
            },
        ))
    }

    /// Submits one user message and, when accepted, starts the agent turn.
    ///
    /// Input is trimmed before the emptiness check. Submissions while a turn
    /// is in flight are ignored, not queued.
    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        let text = input.trim();
        if text.is_empty() {
            tracing::debug!("ignored empty submission");
            return SubmitOutcome::RejectedEmptyInput;
        }

        // Reserve the turn before touching the timeline so a concurrent
        // submit cannot interleave between the two appends.
        let session_id = {
            let mut turn = lock(&self.shared.turn);
            if turn.torn_down {
                tracing::debug!("ignored submission after teardown");
                return SubmitOutcome::RejectedTornDown;
            }

            let session_id = RevealSessionId::new(turn.next_session_id);
            match turn.state.apply(TurnTransition::Begin(session_id)) {
                Ok(next_state) => turn.state = next_state,
                Err(rejection) => {
                    tracing::debug!(?rejection, "ignored submission while a turn is in flight");
                    return SubmitOutcome::RejectedTurnInFlight;
                }
            }
            // Reserve the session id immediately so no later turn reuses it.
            turn.next_session_id = turn.next_session_id.saturating_add(1);
            session_id
        };

        {
            let mut timeline = self.shared.timeline.lock().await;
            let appended = timeline
                .append(Sender::User, MessagePhase::Final, text)
                .and_then(|_| timeline.append(Sender::Agent, MessagePhase::Typing, ""));
            if let Err(rejection) = appended {
                // Torn down between the reservation and the append.
                tracing::warn!(?rejection, "submission dropped before the turn started");
                self.shared.abort_turn(session_id);
                return SubmitOutcome::RejectedTornDown;
            }
        }

        lock(&self.shared.indicator).activate();

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let driver = tokio::spawn(run_turn(Arc::clone(&self.shared), session_id, cancel_rx));

        let mut turn = lock(&self.shared.turn);
        turn.active = Some(ActiveTurn {
            session_id,
            cancel_tx: Some(cancel_tx),
            driver,
        });

        tracing::info!(session_id = session_id.0, "turn accepted");
        SubmitOutcome::Accepted { session_id }
    }

    /// Read-only render feed.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.shared.timeline.lock().await.snapshot()
    }

    pub fn is_idle(&self) -> bool {
        lock(&self.shared.turn).state.is_idle()
    }

    /// Samples the typing indicator; `None` while no placeholder is typing.
    pub fn indicator_frames(&self) -> Option<[DotFrame; DOT_COUNT]> {
        lock(&self.shared.indicator).sample(Instant::now())
    }

    /// Cancels every pending timer for the in-flight turn and marks the
    /// timeline dead. Idempotent; no mutation can land afterwards.
    pub async fn tear_down(&self) {
        let active = {
            let mut turn = lock(&self.shared.turn);
            turn.torn_down = true;
            turn.active.take()
        };

        if let Some(mut active) = active {
            if let Some(cancel_tx) = active.cancel_tx.take() {
                let _ = cancel_tx.send(());
            }
            // The cancel channel stops the driver at its next await; abort
            // also covers a driver that never reaches one again.
            active.driver.abort();
            tracing::debug!(session_id = active.session_id.0, "cancelled in-flight turn");
        }

        self.shared.timeline.lock().await.tear_down();
        self.shared.scroll.shut_down();
        lock(&self.shared.indicator).deactivate();
        tracing::info!("engine torn down");
    }
}

impl EngineShared {
    fn finish_turn(&self, session_id: RevealSessionId) {
        let mut turn = lock(&self.turn);
        match turn.state.apply(TurnTransition::Complete(session_id)) {
            Ok(next_state) => turn.state = next_state,
            Err(rejection) => {
                tracing::warn!(?rejection, "turn completion hit an unexpected state")
            }
        }
        turn.active = None;
        tracing::info!(session_id = session_id.0, "turn complete");
    }

    fn abort_turn(&self, session_id: RevealSessionId) {
        let mut turn = lock(&self.turn);
        if let Ok(next_state) = turn.state.apply(TurnTransition::Abort(session_id)) {
            turn.state = next_state;
        }
        turn.active = None;
    }
}

/// One turn's driver task: typing delay, reveal, finalization.
///
/// Every suspension point also listens on the turn's cancel channel, so
/// teardown stops the pending timer instead of letting it fire.
async fn run_turn(
    shared: Arc<EngineShared>,
    session_id: RevealSessionId,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    tokio::select! {
        _ = &mut cancel_rx => {
            tracing::debug!(session_id = session_id.0, "turn cancelled during typing delay");
            return;
        }
        _ = tokio::time::sleep(shared.typing_delay) => {}
    }

    let reply = lock(&shared.responder).next_reply();

    {
        let mut timeline = shared.timeline.lock().await;
        let replaced = timeline.replace_tail(|message| {
            message.phase = MessagePhase::Streaming;
            message.text.clear();
        });
        if let Err(rejection) = replaced {
            tracing::warn!(?rejection, "could not move the placeholder into streaming");
            shared.abort_turn(session_id);
            return;
        }
    }

    // The dots unmount once streamed text takes over the placeholder.
    lock(&shared.indicator).deactivate();

    {
        let mut turn = lock(&shared.turn);
        match turn.state.apply(TurnTransition::StartStreaming(session_id)) {
            Ok(next_state) => turn.state = next_state,
            Err(rejection) => {
                tracing::warn!(?rejection, "streaming start hit an unexpected state");
                return;
            }
        }
    }

    let handle = shared.scheduler.start(session_id, &reply);
    let mut stream = handle.stream;
    let worker = tokio::spawn(handle.worker);

    loop {
        tokio::select! {
            _ = &mut cancel_rx => {
                stream.cancel();
                worker.abort();
                tracing::debug!(session_id = session_id.0, "turn cancelled during reveal");
                return;
            }
            event = stream.recv() => {
                let Some(event) = event else {
                    // Worker ended without a completion event.
                    shared.abort_turn(session_id);
                    return;
                };
                if event.session_id != session_id {
                    // Strict session equality keeps stale events out.
                    continue;
                }

                match event.payload {
                    RevealPayload::Prefix { text, .. } => {
                        let mut timeline = shared.timeline.lock().await;
                        if let Err(rejection) = timeline.replace_tail(|message| message.text = text)
                        {
                            tracing::warn!(?rejection, "dropped reveal prefix");
                            stream.cancel();
                            worker.abort();
                            shared.abort_turn(session_id);
                            return;
                        }
                    }
                    RevealPayload::Done => {
                        let mut timeline = shared.timeline.lock().await;
                        if let Err(rejection) =
                            timeline.replace_tail(|message| message.phase = MessagePhase::Final)
                        {
                            tracing::warn!(?rejection, "dropped reveal completion");
                            shared.abort_turn(session_id);
                            return;
                        }
                        break;
                    }
                }
            }
        }
    }

    shared.finish_turn(session_id);
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitaly_sim::FixedSelector;

    fn test_settings() -> EngineSettings {
        EngineSettings {
            typing_delay_ms: 2_000,
            reveal_token_delay_ms: 100,
            scroll_settle_ms: 100,
            greeting: "Hello! How can I help?".to_string(),
            responses: vec![
                "red panda sleeps".to_string(),
                "second canned reply".to_string(),
            ],
        }
    }

    fn engine_with_fixed_reply(index: usize) -> (ChatEngine, EngineFeeds) {
        ChatEngine::with_selector(test_settings(), Box::new(FixedSelector(index)))
            .expect("valid settings")
    }

    async fn settle() {
        // Let spawned driver tasks run up to their next timer wait.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_and_whitespace_submissions_mutate_nothing() {
        let (engine, _feeds) = engine_with_fixed_reply(0);

        assert_eq!(engine.submit("").await, SubmitOutcome::RejectedEmptyInput);
        assert_eq!(engine.submit("   \t ").await, SubmitOutcome::RejectedEmptyInput);

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.len(), 1); // only the greeting
        assert!(engine.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn a_full_turn_walks_typing_streaming_final() {
        let (engine, _feeds) = engine_with_fixed_reply(0);

        assert!(engine.submit("  hi  ").await.is_accepted());

        // User entry is final immediately; placeholder follows it.
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[1].sender, Sender::User);
        assert_eq!(snapshot[1].phase, MessagePhase::Final);
        assert_eq!(snapshot[1].text, "hi");
        assert_eq!(snapshot[2].sender, Sender::Agent);
        assert_eq!(snapshot[2].phase, MessagePhase::Typing);
        assert!(engine.indicator_frames().is_some());

        // Mid typing delay: still the placeholder.
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(engine.snapshot().await[2].phase, MessagePhase::Typing);

        // After the delay the reveal begins word by word.
        tokio::time::sleep(Duration::from_millis(1_001)).await;
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot[2].phase, MessagePhase::Streaming);
        assert_eq!(snapshot[2].text, "red");
        assert!(engine.indicator_frames().is_none());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.snapshot().await[2].text, "red panda");

        tokio::time::sleep(Duration::from_millis(101)).await;
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot[2].phase, MessagePhase::Final);
        assert_eq!(snapshot[2].text, "red panda sleeps");
        assert!(engine.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn the_final_reply_is_one_untruncated_pool_entry() {
        let (engine, _feeds) = engine_with_fixed_reply(1);

        engine.submit("hello").await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snapshot = engine.snapshot().await;
        let tail = snapshot.last().expect("agent reply");
        assert_eq!(tail.text, "second canned reply");
        assert_eq!(tail.phase, MessagePhase::Final);
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_message_is_ever_unsettled() {
        let (engine, mut feeds) = engine_with_fixed_reply(0);

        engine.submit("hi").await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        // Replay every notification against snapshots along the way: the
        // invariant is checked on the final state plus event count sanity.
        let mut events = 0;
        while feeds.timeline_events.try_recv().is_ok() {
            events += 1;
        }
        // user append + placeholder append + streaming flip + 3 prefixes + final flip
        assert_eq!(events, 7);

        let unsettled = engine
            .snapshot()
            .await
            .iter()
            .filter(|message| !message.is_final())
            .count();
        assert_eq!(unsettled, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_submissions_are_rejected_not_queued() {
        let (engine, _feeds) = engine_with_fixed_reply(0);

        assert!(engine.submit("a").await.is_accepted());
        assert_eq!(
            engine.submit("b").await,
            SubmitOutcome::RejectedTurnInFlight
        );

        // Mid-stream it is still rejected.
        tokio::time::sleep(Duration::from_millis(2_050)).await;
        assert_eq!(
            engine.submit("b").await,
            SubmitOutcome::RejectedTurnInFlight
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        let snapshot = engine.snapshot().await;
        let user_texts: Vec<_> = snapshot
            .iter()
            .filter(|message| message.sender == Sender::User)
            .map(|message| message.text.as_str())
            .collect();
        assert_eq!(user_texts, vec!["a"]);

        // Back at idle the next submission is accepted.
        assert!(engine.submit("b").await.is_accepted());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_mid_typing_delay_stops_everything() {
        let (engine, mut feeds) = engine_with_fixed_reply(0);

        engine.submit("hi").await;
        settle().await;
        while feeds.timeline_events.try_recv().is_ok() {}

        engine.tear_down().await;
        engine.tear_down().await; // idempotent

        tokio::time::sleep(Duration::from_secs(30)).await;

        // No further mutation, no further notifications; the placeholder is
        // frozen where teardown caught it.
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[2].phase, MessagePhase::Typing);
        assert!(feeds.timeline_events.try_recv().is_err());
        assert!(feeds.scroll_commands.try_recv().is_err());
        assert!(engine.indicator_frames().is_none());

        assert_eq!(engine.submit("late").await, SubmitOutcome::RejectedTornDown);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_mid_reveal_stops_further_prefixes() {
        let (engine, _feeds) = engine_with_fixed_reply(0);

        engine.submit("hi").await;
        // Into the reveal: first word out, second pending.
        tokio::time::sleep(Duration::from_millis(2_050)).await;
        assert_eq!(engine.snapshot().await[2].text, "red");

        engine.tear_down().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot[2].text, "red");
        assert_eq!(snapshot[2].phase, MessagePhase::Streaming);
    }

    #[tokio::test(start_paused = true)]
    async fn scroll_requests_follow_timeline_mutations() {
        let (engine, mut feeds) = engine_with_fixed_reply(0);

        engine.submit("hi").await;
        // Both submit-time appends land in one settle window.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            feeds.scroll_commands.try_recv().ok(),
            Some(ScrollCommand::ToNewest)
        );
        assert!(feeds.scroll_commands.try_recv().is_err());

        // The reveal keeps requesting as new prefixes land.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(feeds.scroll_commands.try_recv().is_ok());
    }

    #[test]
    fn an_empty_response_pool_fails_construction() {
        let settings = EngineSettings {
            responses: Vec::new(),
            ..test_settings()
        };
        assert!(ChatEngine::new(settings).is_err());
    }
}
