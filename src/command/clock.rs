use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct ClockState {
    depth: u32,
    since: Option<Instant>,
    total: Duration,
}

/// Accumulates the time a command spends suspended (waiting on a person,
/// not on I/O). Clones share the same clock.
///
/// Suspension nests: only the outermost `suspend`/`resume` pair is timed.
#[derive(Debug, Clone, Default)]
pub struct SuspendClock {
    inner: Arc<Mutex<ClockState>>,
}

impl SuspendClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suspend(&self) {
        let mut state = self.inner.lock();
        if state.depth == 0 {
            state.since = Some(Instant::now());
        }
        state.depth += 1;
    }

    pub fn resume(&self) {
        let mut state = self.inner.lock();
        if state.depth == 0 {
            tracing::warn!("resume without matching suspend ignored");
            return;
        }
        state.depth -= 1;
        if state.depth == 0 {
            if let Some(since) = state.since.take() {
                state.total += since.elapsed();
            }
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.lock().depth > 0
    }

    /// Suspended time so far, counting an open suspension up to now.
    pub fn suspended(&self) -> Duration {
        let state = self.inner.lock();
        state.total + state.since.map_or(Duration::ZERO, |s| s.elapsed())
    }

    /// Close any open suspension at `at` and return the total.
    pub(crate) fn finish(&self, at: Instant) -> Duration {
        let mut state = self.inner.lock();
        if let Some(since) = state.since.take() {
            state.total += at.saturating_duration_since(since);
        }
        state.depth = 0;
        state.total
    }
}
