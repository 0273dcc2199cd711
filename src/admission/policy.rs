//! Admission policy: the single source of rate-limit and throttle numbers.
//!
//! Development and production differ only in the values chosen here;
//! configuration may override any of them per class.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::{AdmissionConfig, RuntimeMode};

/// Bumped whenever the default numbers or classification rules change.
pub const POLICY_VERSION: u32 = 1;

/// Endpoint category with its own rate-limit budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteClass {
    General,
    Auth,
    PasswordReset,
}

impl RouteClass {
    pub const ALL: [RouteClass; 3] = [Self::General, Self::Auth, Self::PasswordReset];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
            Self::PasswordReset => "passwordReset",
        }
    }

    /// Classify a request path.
    pub fn for_path(path: &str) -> Self {
        let path = path.trim_end_matches('/');
        match path {
            "/auth/login" | "/auth/register" => Self::Auth,
            p if p.starts_with("/auth/") && p.contains("password") => Self::PasswordReset,
            _ => Self::General,
        }
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `limit` requests per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub limit: u32,
    pub window_secs: u64,
}

impl WindowLimit {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Soft backpressure: after `delay_after` requests in a window, each further
/// request waits `delay_ms`. A zero `delay_ms` disables throttling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottlePolicy {
    pub window_secs: u64,
    pub delay_after: u32,
    pub delay_ms: u64,
}

impl ThrottlePolicy {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn is_enabled(&self) -> bool {
        self.delay_ms > 0
    }
}

const FIFTEEN_MINUTES: u64 = 15 * 60;
const ONE_HOUR: u64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionPolicy {
    pub general: WindowLimit,
    pub auth: WindowLimit,
    pub password_reset: WindowLimit,
    pub throttle: ThrottlePolicy,
}

impl AdmissionPolicy {
    pub fn for_mode(mode: RuntimeMode) -> Self {
        match mode {
            RuntimeMode::Production => Self {
                general: WindowLimit::new(100, FIFTEEN_MINUTES),
                auth: WindowLimit::new(5, FIFTEEN_MINUTES),
                password_reset: WindowLimit::new(3, ONE_HOUR),
                throttle: ThrottlePolicy {
                    window_secs: FIFTEEN_MINUTES,
                    delay_after: 50,
                    delay_ms: 500,
                },
            },
            RuntimeMode::Development => Self {
                general: WindowLimit::new(1000, FIFTEEN_MINUTES),
                auth: WindowLimit::new(50, FIFTEEN_MINUTES),
                password_reset: WindowLimit::new(30, ONE_HOUR),
                throttle: ThrottlePolicy {
                    window_secs: FIFTEEN_MINUTES,
                    delay_after: 500,
                    delay_ms: 500,
                },
            },
        }
    }

    /// Mode defaults with configured overrides applied.
    pub fn from_config(mode: RuntimeMode, config: &AdmissionConfig) -> Self {
        let mut policy = Self::for_mode(mode);
        if let Some(limit) = config.general {
            policy.general = limit;
        }
        if let Some(limit) = config.auth {
            policy.auth = limit;
        }
        if let Some(limit) = config.password_reset {
            policy.password_reset = limit;
        }
        if let Some(throttle) = config.throttle {
            policy.throttle = throttle;
        }
        policy
    }

    pub fn limit_for(&self, class: RouteClass) -> WindowLimit {
        match class {
            RouteClass::General => self.general,
            RouteClass::Auth => self.auth,
            RouteClass::PasswordReset => self.password_reset,
        }
    }
}
