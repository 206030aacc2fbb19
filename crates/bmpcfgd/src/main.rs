//! bmpcfgd - BMP Configuration Daemon
//!
//! Entry point for the bmpcfgd daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use sonic_bmpcfgd::{build_daemon, BmpcfgdConfig, DAEMON_NAME, DEFAULT_CONFIG_PATH};
use sonic_reconcile_common::{
    init_logging, spawn_signal_handler, HangupAction, RedisStore, SystemRunner,
};

/// Restarts the BMP service when the CONFIG_DB BMP table changes
#[derive(Debug, Parser)]
#[command(name = "bmpcfgd", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Redis host, overrides [store] redis_host
    #[arg(long)]
    redis_host: Option<String>,

    /// Redis port, overrides [store] redis_port
    #[arg(long)]
    redis_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_json);

    info!("--- Starting bmpcfgd (Rust) ---");

    let mut config = BmpcfgdConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(host) = args.redis_host {
        config.common.store.redis_host = host;
    }
    if let Some(port) = args.redis_port {
        config.common.store.redis_port = port;
    }
    config.validate().context("invalid configuration")?;

    let store = Arc::new(RedisStore::new(&config.common.store)?);
    let mut daemon = build_daemon(&config, store, Arc::new(SystemRunner))?;

    let signals = spawn_signal_handler(DAEMON_NAME, daemon.handle(), HangupAction::Ignore)?;
    daemon.run().await.context("bmpcfgd stopped on error")?;
    signals.abort();

    info!("bmpcfgd exited");
    Ok(())
}
