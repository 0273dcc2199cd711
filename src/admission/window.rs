use std::time::{Duration, Instant};

/// One fixed counting window.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixedWindow {
    pub started: Instant,
    pub count: u32,
}

impl FixedWindow {
    pub fn new(now: Instant) -> Self {
        Self {
            started: now,
            count: 0,
        }
    }

    /// Roll over if `length` has fully elapsed, then count one hit.
    /// Returns the post-increment count.
    pub fn hit(&mut self, now: Instant, length: Duration) -> u32 {
        if self.is_expired(now, length) {
            self.started = now;
            self.count = 0;
        }
        self.count = self.count.saturating_add(1);
        self.count
    }

    pub fn is_expired(&self, now: Instant, length: Duration) -> bool {
        now.saturating_duration_since(self.started) >= length
    }

    /// Time left until the window rolls over.
    pub fn remaining(&self, now: Instant, length: Duration) -> Duration {
        length.saturating_sub(now.saturating_duration_since(self.started))
    }
}
