//! Subscriber setup: rolling file output plus an optional console layer.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Target for rejected credentials, refused tokens, rate-limit hits and
/// stripped payloads. Filtered separately from the general level.
pub const SECURITY_TARGET: &str = "SECURITY";

/// Default directives when `RUST_LOG` is not set.
pub fn filter_directives(config: &AppConfig) -> String {
    format!(
        "{},{}={}",
        config.log_level, SECURITY_TARGET, config.security_log_level
    )
}

/// Install the global subscriber. The returned guard must live until
/// shutdown or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));
    let registry = tracing_subscriber::registry().with(filter);

    // Production ships JSON to the file only; targets stay in the record so
    // security events can be queried on their own.
    if config.use_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .with(fmt::layer().with_ansi(true))
            .init();
    }

    guard
}
