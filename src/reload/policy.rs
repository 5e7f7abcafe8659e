//! Reload debounce policy.
//!
//! Pure decision logic, kept apart from the event loop so it can be tested
//! without a filesystem or timers.

use std::time::Duration;

use tokio::time::Instant;

/// Lower bound for the poll interval; a ticker cannot run with a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Decides when a pending change is old enough to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadPolicy {
    min_reload_interval: Duration,
    poll_interval: Duration,
}

impl ReloadPolicy {
    /// Poll interval is a tenth of `min_reload_interval`.
    pub fn new(min_reload_interval: Duration) -> Self {
        Self {
            min_reload_interval,
            poll_interval: (min_reload_interval / 10).max(MIN_POLL_INTERVAL),
        }
    }

    pub fn min_reload_interval(&self) -> Duration {
        self.min_reload_interval
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// `None` means no change is pending.
    pub fn due_for_reload(&self, now: Instant, last_change_at: Option<Instant>) -> bool {
        match last_change_at {
            None => false,
            Some(changed) => now.saturating_duration_since(changed) >= self.min_reload_interval,
        }
    }
}
