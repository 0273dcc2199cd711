//! Fixed-window request counters keyed by (client, route class).
//!
//! Each key's read-modify-write happens under its dashmap entry lock, so
//! concurrent requests from one client can never overrun the limit.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::policy::{AdmissionPolicy, RouteClass, WindowLimit};
use super::window::FixedWindow;

/// Request rejected by the hard limit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for {route_class}: retry after {}s", .retry_after.as_secs())]
pub struct RateLimitExceeded {
    pub route_class: RouteClass,
    pub limit: u32,
    pub retry_after: Duration,
}

impl RateLimitExceeded {
    /// Whole seconds, rounded up, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        ceil_secs(self.retry_after)
    }
}

/// Budget left after an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

impl Admitted {
    pub fn reset_after_secs(&self) -> u64 {
        ceil_secs(self.reset_after)
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

pub struct RateLimitCounter {
    policy: AdmissionPolicy,
    windows: DashMap<(String, RouteClass), FixedWindow>,
}

impl RateLimitCounter {
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            policy,
            windows: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    pub fn admit(&self, client: &str, class: RouteClass) -> Result<Admitted, RateLimitExceeded> {
        self.admit_at(client, class, Instant::now())
    }

    pub fn admit_at(
        &self,
        client: &str,
        class: RouteClass,
        now: Instant,
    ) -> Result<Admitted, RateLimitExceeded> {
        let budget: WindowLimit = self.policy.limit_for(class);
        let (limit, length) = (budget.limit, budget.window());

        let mut window = self
            .windows
            .entry((client.to_string(), class))
            .or_insert_with(|| FixedWindow::new(now));
        let count = window.hit(now, length);
        let remaining_time = window.remaining(now, length);
        drop(window);

        if count > limit {
            return Err(RateLimitExceeded {
                route_class: class,
                limit,
                retry_after: remaining_time,
            });
        }

        Ok(Admitted {
            limit,
            remaining: limit - count,
            reset_after: remaining_time,
        })
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|(_, class), window| {
            !window.is_expired(now, self.policy.limit_for(*class).window())
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeMode;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    fn counter(limit: u32, window_secs: u64) -> RateLimitCounter {
        let mut policy = AdmissionPolicy::for_mode(RuntimeMode::Development);
        policy.general = WindowLimit::new(limit, window_secs);
        policy.auth = WindowLimit::new(limit, window_secs);
        policy.password_reset = WindowLimit::new(1, window_secs);
        RateLimitCounter::new(policy)
    }

    #[test]
    fn test_limit_then_reject() {
        let counter = counter(5, 60);
        let t0 = Instant::now();
        for i in 0..5 {
            let admitted = counter
                .admit_at("1.2.3.4", RouteClass::Auth, t0 + Duration::from_secs(i))
                .unwrap();
            assert_eq!(admitted.remaining, 4 - i as u32);
        }

        let err = counter
            .admit_at("1.2.3.4", RouteClass::Auth, t0 + Duration::from_secs(10))
            .unwrap_err();
        assert_eq!(err.route_class, RouteClass::Auth);
        assert_eq!(err.limit, 5);
        assert_eq!(err.retry_after, Duration::from_secs(50));
        assert_eq!(err.retry_after_secs(), 50);
    }

    #[test]
    fn test_window_rollover_readmits() {
        let counter = counter(2, 60);
        let t0 = Instant::now();
        assert!(counter.admit_at("c", RouteClass::General, t0).is_ok());
        assert!(counter.admit_at("c", RouteClass::General, t0).is_ok());
        assert!(counter.admit_at("c", RouteClass::General, t0).is_err());
        assert!(
            counter
                .admit_at("c", RouteClass::General, t0 + Duration::from_secs(59))
                .is_err()
        );

        let admitted = counter
            .admit_at("c", RouteClass::General, t0 + Duration::from_secs(60))
            .unwrap();
        assert_eq!(admitted.remaining, 1);
        assert_eq!(admitted.reset_after_secs(), 60);
    }

    #[test]
    fn test_keys_are_independent() {
        let counter = counter(1, 60);
        let t0 = Instant::now();
        assert!(counter.admit_at("a", RouteClass::Auth, t0).is_ok());
        assert!(counter.admit_at("a", RouteClass::Auth, t0).is_err());
        assert!(counter.admit_at("b", RouteClass::Auth, t0).is_ok());
        assert!(counter.admit_at("a", RouteClass::General, t0).is_ok());
        assert_eq!(counter.tracked_keys(), 3);
    }

    #[test]
    fn test_retry_after_never_zero() {
        let counter = counter(1, 1);
        let t0 = Instant::now();
        counter.admit_at("c", RouteClass::PasswordReset, t0).unwrap();
        let err = counter
            .admit_at("c", RouteClass::PasswordReset, t0 + Duration::from_millis(999))
            .unwrap_err();
        assert_eq!(err.retry_after_secs(), 1);
    }

    #[test]
    fn test_sweep_removes_expired_only() {
        let counter = counter(10, 60);
        let t0 = Instant::now();
        counter.admit_at("old", RouteClass::General, t0).unwrap();
        counter
            .admit_at("new", RouteClass::General, t0 + Duration::from_secs(30))
            .unwrap();

        assert_eq!(counter.sweep(t0 + Duration::from_secs(61)), 1);
        assert_eq!(counter.tracked_keys(), 1);
    }

    #[test]
    fn test_concurrent_admission_never_exceeds_limit() {
        let counter = Arc::new(counter(10, 60));
        let admitted = Arc::new(AtomicU32::new(0));
        let now = Instant::now();

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let counter = Arc::clone(&counter);
                let admitted = Arc::clone(&admitted);
                thread::spawn(move || {
                    if counter.admit_at("shared", RouteClass::Auth, now).is_ok() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 10);
    }
}
