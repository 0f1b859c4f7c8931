use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DOT_COUNT: usize = 3;

/// Half of one pulse: rest-to-raised takes 400 ms, raised-to-rest another 400 ms.
const HALF_CYCLE: Duration = Duration::from_millis(400);
/// Dot `k` starts its loop `k * 200 ms` after dot 0.
const DOT_STAGGER: Duration = Duration::from_millis(200);
const RAISED_OFFSET: f32 = -4.0;
const RESTING_OPACITY: f32 = 0.6;
const RAISED_OPACITY: f32 = 1.0;

/// Display values for one indicator dot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotFrame {
    pub offset: f32,
    pub opacity: f32,
}

impl DotFrame {
    const RESTING: Self = Self {
        offset: 0.0,
        opacity: RESTING_OPACITY,
    };
}

/// Pure mapping from elapsed active time to one dot's display values.
///
/// No free-running shared state: the oscillator is a function of elapsed time,
/// sampled on demand or per tick.
pub fn dot_frame(elapsed: Duration, dot: usize) -> DotFrame {
    let stagger = DOT_STAGGER * dot as u32;
    let Some(into_loop) = elapsed.checked_sub(stagger) else {
        return DotFrame::RESTING;
    };

    let half_ms = HALF_CYCLE.as_millis() as f32;
    let cycle_ms = (into_loop.as_millis() % (2 * HALF_CYCLE.as_millis())) as f32;
    let progress = if cycle_ms < half_ms {
        cycle_ms / half_ms
    } else {
        (2.0 * half_ms - cycle_ms) / half_ms
    };

    DotFrame {
        offset: RAISED_OFFSET * progress,
        opacity: RESTING_OPACITY + (RAISED_OPACITY - RESTING_OPACITY) * progress,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum IndicatorState {
    #[default]
    Inactive,
    Active {
        started: Instant,
    },
}

/// Looping three-dot pulse shown while the agent placeholder is "typing".
///
/// Activation records a start instant; display values are derived from it on
/// demand. Deactivation is idempotent and leaves nothing ticking.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypingIndicator {
    state: IndicatorState,
}

impl TypingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the loop. A second call while active keeps the original phase.
    pub fn activate(&mut self) {
        if matches!(self.state, IndicatorState::Inactive) {
            self.state = IndicatorState::Active {
                started: Instant::now(),
            };
        }
    }

    pub fn deactivate(&mut self) {
        self.state = IndicatorState::Inactive;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, IndicatorState::Active { .. })
    }

    /// Samples all three dots at `now`; `None` once deactivated, so a caller
    /// can never render a stale pulse.
    pub fn sample(&self, now: Instant) -> Option<[DotFrame; DOT_COUNT]> {
        let IndicatorState::Active { started } = self.state else {
            return None;
        };
        let elapsed = now.saturating_duration_since(started);
        Some([
            dot_frame(elapsed, 0),
            dot_frame(elapsed, 1),
            dot_frame(elapsed, 2),
        ])
    }
}

/// Handle for a running frame feed; dropping it also stops the feed.
pub struct IndicatorTicker {
    task: JoinHandle<()>,
}

impl IndicatorTicker {
    /// Stops the feed so no further display updates occur. Idempotent.
    pub fn deactivate(&self) {
        self.task.abort();
    }
}

impl Drop for IndicatorTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns a ticker that emits sampled frames every `period` until deactivated.
///
/// Leaving the ticker running after the placeholder settles would be a timer
/// leak, not just a visual bug; the returned handle owns the task's lifetime.
pub fn spawn_frame_feed(
    period: Duration,
) -> (IndicatorTicker, mpsc::UnboundedReceiver<[DotFrame; DOT_COUNT]>) {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        let started = Instant::now();
        let mut ticks = tokio::time::interval(period);
        loop {
            ticks.tick().await;
            let elapsed = started.elapsed();
            let frames = [
                dot_frame(elapsed, 0),
                dot_frame(elapsed, 1),
                dot_frame(elapsed, 2),
            ];
            if frame_tx.send(frames).is_err() {
                return;
            }
        }
    });

    (IndicatorTicker { task }, frame_rx)
}
