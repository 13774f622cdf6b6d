//! Persisted retry schedule.

use serde::{Deserialize, Serialize};

/// The singleton row governing when the next sync cycle may run.
///
/// All timestamps are unix seconds. The initial value is all zeros, so a
/// fresh database may sync immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySchedule {
    /// Earliest time the next cycle may start.
    pub next_attempt: u64,
    /// Consecutive failed cycles since the last success.
    pub error_count: u32,
    /// Start time of the most recent cycle, successful or not.
    pub last_attempt: u64,
    /// Start time of the most recent successful cycle.
    pub last_success: u64,
}

impl RetrySchedule {
    /// Seconds left before `next_attempt`, or `None` if a cycle may run now.
    pub fn wait_secs(&self, now: u64) -> Option<u64> {
        (now < self.next_attempt).then(|| self.next_attempt - now)
    }
}
