use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::str::FromStr;

use crate::admission::policy::{ThrottlePolicy, WindowLimit};

/// Deployment posture. Selects the admission policy and whether the
/// development signing key may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    #[default]
    Development,
    Production,
}

impl RuntimeMode {
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Development),
            "prod" | "production" => Ok(Self::Production),
            other => anyhow::bail!("Unknown runtime mode: {}", other),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub mode: RuntimeMode,
    pub log_level: String,
    /// Level for the `SECURITY` log target.
    pub security_log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub identity: IdentityConfig,
    pub admission: AdmissionConfig,
    pub sanitizer: SanitizerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::Development,
            log_level: "info".to_string(),
            security_log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "gateway.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
            identity: IdentityConfig::default(),
            admission: AdmissionConfig::default(),
            sanitizer: SanitizerConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Use the first `X-Forwarded-For` hop as the client identity.
    /// Only enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            trust_forwarded_for: false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret. Normally supplied through `JWT_SECRET`.
    pub jwt_secret: Option<String>,
    pub token_ttl_secs: u64,
    pub min_password_length: usize,
    pub hashing: HashingConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_secs: 7 * 24 * 60 * 60,
            min_password_length: 6,
            hashing: HashingConfig::default(),
        }
    }
}

// Keep the secret out of debug output and logs.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("min_password_length", &self.min_password_length)
            .field("hashing", &self.hashing)
            .finish()
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        // OWASP baseline for argon2id: 19 MiB, 2 passes, 1 lane (~tens of ms)
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct IdentityConfig {
    pub backend: StoreBackend,
    pub data_file: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            data_file: "./data/identities.json".to_string(),
        }
    }
}

/// Per-class overrides on top of the mode-derived admission policy.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AdmissionConfig {
    pub general: Option<WindowLimit>,
    pub auth: Option<WindowLimit>,
    pub password_reset: Option<WindowLimit>,
    pub throttle: Option<ThrottlePolicy>,
    pub sweep_interval_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            general: None,
            auth: None,
            password_reset: None,
            throttle: None,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SanitizerConfig {
    pub max_depth: usize,
    pub max_nodes: usize,
    pub max_body_bytes: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_nodes: 10_000,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml` and apply environment overrides.
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config yaml")
    }

    /// Apply `APP_MODE` and `JWT_SECRET` from the given lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("APP_MODE") {
            self.mode = mode.parse().context("Invalid APP_MODE")?;
        }
        if let Some(secret) = lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            self.auth.jwt_secret = Some(secret);
        }
        Ok(())
    }
}
