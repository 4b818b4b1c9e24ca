//! Polled software timers
//!
//! The engine is single-threaded and event-driven: timers are plain
//! deadlines checked once per loop iteration, never delivered
//! asynchronously.

use std::time::{Duration, Instant};

/// A single-shot retransmission timer, polled from the main loop.
#[derive(Debug, Clone)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    /// Create a stopped timer.
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Arm the timer to fire `after` from `now`, replacing any deadline.
    pub fn start(&mut self, now: Instant, after: Duration) {
        self.deadline = Some(now + after);
    }

    /// Disarm the timer.
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// True while armed.
    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Check for expiry; a fired timer disarms itself.
    pub fn expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(d) if now >= d => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
