//! featured - Feature Service Manager Daemon
//!
//! Entry point for the featured daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use sonic_featured::{build_daemon, FeaturedConfig, DAEMON_NAME, DEFAULT_CONFIG_PATH};
use sonic_reconcile_common::{
    init_logging, spawn_signal_handler, HangupAction, RedisStore, SystemRunner,
};

/// Keeps systemd units in line with the CONFIG_DB FEATURE table
#[derive(Debug, Parser)]
#[command(name = "featured", version, about)]
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

    info!("--- Starting featured (Rust) ---");

    let mut config = FeaturedConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(host) = args.redis_host {
        config.common.store.redis_host = host;
    }
    if let Some(port) = args.redis_port {
        config.common.store.redis_port = port;
    }
    config.validate().context("invalid configuration")?;

    let store = Arc::new(RedisStore::new(&config.common.store)?);
    let mut daemon =
        build_daemon(&config, store.clone(), Arc::new(SystemRunner))?.with_status_sink(store);

    let signals = spawn_signal_handler(DAEMON_NAME, daemon.handle(), HangupAction::Resync)?;
    daemon.run().await.context("featured stopped on error")?;
    signals.abort();

    info!("featured exited");
    Ok(())
}
