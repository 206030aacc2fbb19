//! # featured - Feature Service Manager
//!
//! Keeps the systemd units of SONiC features in line with the CONFIG_DB
//! `FEATURE` table.
//!
//! ## Responsibilities
//! - Unmask, enable and start units of enabled features
//! - Stop, disable and mask units of disabled or removed features
//! - Render the `auto_restart.conf` drop-in when `auto_restart` changes
//! - Publish each feature's resulting state to STATE_DB `FEATURE`
//!
//! ## Multi-ASIC
//! On devices with more than one ASIC a feature maps to `<name>.service`
//! (global scope) and `<name>@<asic>.service` (per-ASIC scope).

mod config;
mod feature_mgr;
mod tables;
mod types;

use std::sync::Arc;

use sonic_reconcile_common::{
    ActionExecutor, ChangeListener, CommandRunner, DaemonSettings, PolicyRegistry,
    ReconcileResult, ReconciliationDaemon,
};

pub use config::*;
pub use feature_mgr::FeatureMgr;
pub use tables::*;
pub use types::*;

/// Daemon name used in logs and audit records
pub const DAEMON_NAME: &str = "featured";

/// Builds the featured reconciliation daemon on top of `listener`.
///
/// Status publishing is attached by the caller with
/// [`ReconciliationDaemon::with_status_sink`].
pub fn build_daemon(
    config: &FeaturedConfig,
    listener: Arc<dyn ChangeListener>,
    runner: Arc<dyn CommandRunner>,
) -> ReconcileResult<ReconciliationDaemon> {
    let mut registry = PolicyRegistry::new();
    registry.register(
        CFG_FEATURE_TABLE_NAME,
        FeatureMgr::new(
            config.featured.systemd_dir.clone(),
            config.featured.num_asics,
        ),
    )?;

    ReconciliationDaemon::new(
        DAEMON_NAME,
        vec![CFG_FEATURE_TABLE_NAME.to_string()],
        listener,
        registry,
        ActionExecutor::new(runner, config.common.executor.clone()),
        DaemonSettings::from(&config.common.daemon),
    )
}
