//! # bmpcfgd - BMP Configuration Daemon
//!
//! Watches the CONFIG_DB `BMP` table and restarts the BMP service whenever
//! the set of exported BGP tables (`bgp_neighbor_table`,
//! `bgp_rib_in_table`, `bgp_rib_out_table`) changes.

mod bmp_mgr;
mod config;
mod tables;
mod types;

use std::sync::Arc;

use sonic_reconcile_common::{
    ActionExecutor, ChangeListener, CommandRunner, DaemonSettings, PolicyRegistry,
    ReconcileResult, ReconciliationDaemon,
};

pub use bmp_mgr::BmpMgr;
pub use config::*;
pub use tables::*;
pub use types::*;

/// Daemon name used in logs and audit records
pub const DAEMON_NAME: &str = "bmpcfgd";

/// Builds the bmpcfgd reconciliation daemon on top of `listener`.
pub fn build_daemon(
    config: &BmpcfgdConfig,
    listener: Arc<dyn ChangeListener>,
    runner: Arc<dyn CommandRunner>,
) -> ReconcileResult<ReconciliationDaemon> {
    let mut registry = PolicyRegistry::new();
    registry.register(CFG_BMP_TABLE_NAME, BmpMgr::new(config.bmpcfgd.bmp_unit.clone()))?;

    ReconciliationDaemon::new(
        DAEMON_NAME,
        vec![CFG_BMP_TABLE_NAME.to_string()],
        listener,
        registry,
        ActionExecutor::new(runner, config.common.executor.clone()),
        DaemonSettings::from(&config.common.daemon),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use sonic_reconcile_common::shell::{CommandSpec, ExecResult};
    use sonic_reconcile_common::{row, ChangeEvent, EventOutcome, MemoryStore};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, spec: &CommandSpec) -> ReconcileResult<ExecResult> {
            self.calls.lock().unwrap().push(spec.argv.clone());
            Ok(ExecResult::default())
        }
    }

    #[tokio::test]
    async fn test_selection_change_restarts_bmp() {
        let store = MemoryStore::new();
        store.set(
            "BMP",
            "table",
            row! {
                "bgp_neighbor_table" => "false",
                "bgp_rib_in_table" => "false",
                "bgp_rib_out_table" => "false",
            },
        );
        let runner = Arc::new(RecordingRunner::default());
        let mut daemon =
            build_daemon(&BmpcfgdConfig::default(), Arc::new(store.clone()), runner.clone())
                .unwrap();

        let (_subscription, snapshot) = daemon.connect_with_retry().await.unwrap().unwrap();
        let summary = daemon.full_reconcile(snapshot).await;
        assert_eq!(summary.applied, 1);
        assert!(runner.calls.lock().unwrap().is_empty());

        let outcome = daemon
            .reconcile_event(ChangeEvent::set(
                "BMP",
                "table",
                row! {
                    "bgp_neighbor_table" => "true",
                    "bgp_rib_in_table" => "false",
                    "bgp_rib_out_table" => "false",
                },
            ))
            .await;
        assert!(matches!(outcome, EventOutcome::Applied(ref r) if r.all_succeeded()));
        assert_eq!(
            runner.calls.lock().unwrap().clone(),
            vec![
                vec!["/bin/systemctl", "stop", "bmp.service"],
                vec!["/bin/systemctl", "start", "bmp.service"],
            ]
        );
    }
}
