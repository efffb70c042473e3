use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks the time of the last published cloud.
///
/// Uses [`tokio::time::Instant`] so paused test clocks apply.
#[derive(Debug)]
pub struct Watchdog {
    last_update: Mutex<Instant>,
    timeout: Duration,
}

impl Watchdog {
    /// Create a watchdog whose deadline starts counting now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_update: Mutex::new(Instant::now()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record that output was produced.
    pub fn update(&self) {
        self.update_at(Instant::now());
    }

    pub fn update_at(&self, now: Instant) {
        *self.last_update.lock() = now;
    }

    /// Whether output was produced within the timeout before `now`.
    pub fn is_alive_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(*self.last_update.lock()) <= self.timeout
    }

    /// Time elapsed between the last update and `now`.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_update.lock())
    }
}
