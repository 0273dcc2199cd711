//! Progressive latency injection, independent of hard rejection.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::policy::ThrottlePolicy;
use super::window::FixedWindow;

pub struct AdmissionThrottle {
    policy: ThrottlePolicy,
    windows: DashMap<String, FixedWindow>,
}

impl AdmissionThrottle {
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self {
            policy,
            windows: DashMap::new(),
        }
    }

    /// Count a request and return the delay to hold it for, if any.
    pub fn observe(&self, client: &str) -> Option<Duration> {
        self.observe_at(client, Instant::now())
    }

    pub fn observe_at(&self, client: &str, now: Instant) -> Option<Duration> {
        if !self.policy.is_enabled() {
            return None;
        }

        let count = self
            .windows
            .entry(client.to_string())
            .or_insert_with(|| FixedWindow::new(now))
            .hit(now, self.policy.window());

        (count > self.policy.delay_after).then(|| self.policy.delay())
    }

    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.windows.len();
        let length = self.policy.window();
        self.windows
            .retain(|_, window| !window.is_expired(now, length));
        before.saturating_sub(self.windows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(delay_after: u32, delay_ms: u64) -> AdmissionThrottle {
        AdmissionThrottle::new(ThrottlePolicy {
            window_secs: 60,
            delay_after,
            delay_ms,
        })
    }

    #[test]
    fn test_delay_after_threshold() {
        let throttle = throttle(3, 500);
        let t0 = Instant::now();
        for _ in 0..3 {
            assert_eq!(throttle.observe_at("c", t0), None);
        }
        assert_eq!(throttle.observe_at("c", t0), Some(Duration::from_millis(500)));
        assert_eq!(throttle.observe_at("c", t0), Some(Duration::from_millis(500)));
        // Other clients are unaffected
        assert_eq!(throttle.observe_at("d", t0), None);
    }

    #[test]
    fn test_new_window_clears_delay() {
        let throttle = throttle(1, 100);
        let t0 = Instant::now();
        throttle.observe_at("c", t0);
        assert!(throttle.observe_at("c", t0).is_some());
        assert_eq!(throttle.observe_at("c", t0 + Duration::from_secs(60)), None);
    }

    #[test]
    fn test_zero_delay_disables() {
        let throttle = throttle(0, 0);
        let t0 = Instant::now();
        for _ in 0..10 {
            assert_eq!(throttle.observe_at("c", t0), None);
        }
        assert_eq!(throttle.sweep(t0), 0);
    }

    #[test]
    fn test_sweep() {
        let throttle = throttle(5, 100);
        let t0 = Instant::now();
        throttle.observe_at("a", t0);
        throttle.observe_at("b", t0 + Duration::from_secs(30));
        assert_eq!(throttle.sweep(t0 + Duration::from_secs(60)), 1);
    }
}
