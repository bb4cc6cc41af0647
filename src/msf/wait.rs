//! Wait timer gating the next request toward the parent.

use std::time::{Duration, Instant};

/// One-shot timer; expired when never armed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestWaitTimer {
    deadline: Option<Instant>,
}

impl RequestWaitTimer {
    /// Create an expired timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire the timer now.
    pub fn reset(&mut self) {
        self.deadline = None;
    }

    /// Run the timer for `duration` from `now`.
    pub fn arm(&mut self, now: Instant, duration: Duration) {
        self.deadline = Some(now + duration);
    }

    /// Check if the timer has run out.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_none_or(|at| now >= at)
    }

    /// Time left before expiry.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}
