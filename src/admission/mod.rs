//! Admission control: hard rate limits and soft throttling.
//!
//! ## Components
//! - `policy`: route classes and the per-mode limit table
//! - `rate_limit`: fixed-window counters keyed by (client, route class)
//! - `throttle`: latency injection past a lower threshold
//! - `client`: client identity extraction

pub mod client;
pub mod policy;
pub mod rate_limit;
pub mod throttle;
mod window;

use std::sync::Arc;
use std::time::{Duration, Instant};

pub use client::{UNKNOWN_CLIENT, client_identity};
pub use policy::{AdmissionPolicy, POLICY_VERSION, RouteClass, ThrottlePolicy, WindowLimit};
pub use rate_limit::{Admitted, RateLimitCounter, RateLimitExceeded};
pub use throttle::AdmissionThrottle;

/// Periodically evict expired windows so idle clients do not accumulate.
pub fn spawn_sweeper(
    counter: Arc<RateLimitCounter>,
    throttle: Arc<AdmissionThrottle>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let now = Instant::now();
            let windows = counter.sweep(now);
            let throttled = throttle.sweep(now);
            if windows + throttled > 0 {
                tracing::debug!(windows, throttled, "Swept expired admission windows");
            }
        }
    })
}
