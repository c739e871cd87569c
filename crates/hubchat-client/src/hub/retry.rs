use std::time::Duration;

use hubchat_shared::constants::RECONNECT_DELAYS_SECS;

/// Fixed reconnect schedule. Attempts past the end of the table reuse the
/// last delay, so reconnection never gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        match self.delays.last() {
            Some(last) => self.delays.get(attempt).copied().unwrap_or(*last),
            None => Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            RECONNECT_DELAYS_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        )
    }
}
