//! Admission Gateway entry point.
//!
//! ```text
//! client ──▶ throttle ──▶ rate limit ──▶ sanitize ──▶ [bearer] ──▶ handler
//! ```
//!
//! Usage: `admission_gateway [--env dev|prod] [--port 8080]`

use anyhow::{Context, Result};

use admission_gateway::admission::POLICY_VERSION;
use admission_gateway::config::AppConfig;
use admission_gateway::gateway::run_server;
use admission_gateway::logging::init_logging;

fn get_arg(flags: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| flags.contains(&a.as_str()))
        .and_then(|i| args.get(i + 1).cloned())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string());
    let config = AppConfig::load(&env)?;
    let port = match get_arg(&["--port"]) {
        Some(p) => p.parse::<u16>().context("Invalid --port")?,
        None => config.gateway.port,
    };

    let _guard = init_logging(&config);
    tracing::info!(
        env = %env,
        mode = %config.mode,
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        policy_version = POLICY_VERSION,
        "Starting admission gateway"
    );

    if let Err(e) = run_server(&config, port).await {
        tracing::error!(error = ?e, "Gateway failed");
        return Err(e);
    }
    Ok(())
}
