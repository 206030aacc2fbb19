//! Test fixtures for common reconciliation patterns
//!
//! Provides reusable CONFIG_DB changes and a harness that runs a daemon in
//! the background.

use std::time::Duration;

use tokio::task::JoinHandle;

use sonic_reconcile_common::{
    ChangeEvent, DaemonHandle, DaemonState, MemoryStore, Operation, ReconcileResult,
    ReconciliationDaemon, Row,
};

/// Default time a test waits for the daemon to settle
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Represents a CONFIG_DB change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// Table name (e.g., "FEATURE", "BMP")
    pub table: String,
    /// Key within the table
    pub key: String,
    /// Operation type
    pub op: Operation,
    /// Field-value pairs (for SET operations)
    pub fields: Row,
}

impl ConfigChange {
    /// Create a SET operation
    pub fn set(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            op: Operation::Set,
            fields: Row::new(),
        }
    }

    /// Create a DEL operation
    pub fn del(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            op: Operation::Del,
            fields: Row::new(),
        }
    }

    /// Add a field to a SET operation
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Add multiple fields to a SET operation
    pub fn with_fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in fields {
            self.fields.insert(k.into(), v.into());
        }
        self
    }

    /// Get the CONFIG_DB key (`TABLE|key`)
    pub fn config_db_key(&self) -> String {
        format!("{}|{}", self.table, self.key)
    }

    /// Converts into the event a listener would deliver.
    pub fn into_event(self) -> ChangeEvent {
        match self.op {
            Operation::Set => ChangeEvent::set(self.table, self.key, self.fields),
            Operation::Del => ChangeEvent::del(self.table, self.key),
        }
    }

    /// Commits the change to `store`, notifying its subscribers.
    pub fn apply_to(&self, store: &MemoryStore) {
        match self.op {
            Operation::Set => store.set(&self.table, &self.key, self.fields.clone()),
            Operation::Del => store.del(&self.table, &self.key),
        }
    }
}

/// Common FEATURE table fixtures
pub mod feature_fixtures {
    use super::*;

    pub fn feature_enabled(name: &str) -> ConfigChange {
        ConfigChange::set("FEATURE", name).with_field("state", "enabled")
    }

    pub fn feature_disabled(name: &str) -> ConfigChange {
        ConfigChange::set("FEATURE", name).with_field("state", "disabled")
    }

    /// Enabled feature with `auto_restart` set
    pub fn feature_auto_restart(name: &str, auto_restart: &str) -> ConfigChange {
        feature_enabled(name).with_field("auto_restart", auto_restart)
    }

    /// Feature whose state is an unrendered template
    pub fn feature_unrendered(name: &str) -> ConfigChange {
        ConfigChange::set("FEATURE", name).with_field(
            "state",
            "{% if not (DEVICE_METADATA is defined) %}enabled{% else %}disabled{% endif %}",
        )
    }

    /// Multi-ASIC feature running per ASIC only
    pub fn feature_per_asic(name: &str) -> ConfigChange {
        feature_enabled(name).with_fields([
            ("has_global_scope", "False"),
            ("has_per_asic_scope", "True"),
        ])
    }

    pub fn delete_feature(name: &str) -> ConfigChange {
        ConfigChange::del("FEATURE", name)
    }
}

/// Common BMP table fixtures
pub mod bmp_fixtures {
    use super::*;

    fn flag(on: bool) -> &'static str {
        if on {
            "true"
        } else {
            "false"
        }
    }

    pub fn bmp_selection(neighbor: bool, rib_in: bool, rib_out: bool) -> ConfigChange {
        ConfigChange::set("BMP", "table").with_fields([
            ("bgp_neighbor_table", flag(neighbor)),
            ("bgp_rib_in_table", flag(rib_in)),
            ("bgp_rib_out_table", flag(rib_out)),
        ])
    }

    pub fn bmp_all_disabled() -> ConfigChange {
        bmp_selection(false, false, false)
    }
}

/// A daemon running on a background task.
pub struct RunningDaemon {
    handle: DaemonHandle,
    task: JoinHandle<(ReconciliationDaemon, ReconcileResult<()>)>,
}

impl RunningDaemon {
    /// Spawns `daemon.run()`.
    pub fn start(mut daemon: ReconciliationDaemon) -> Self {
        let handle = daemon.handle();
        let task = tokio::spawn(async move {
            let result = daemon.run().await;
            (daemon, result)
        });
        Self { handle, task }
    }

    pub fn handle(&self) -> &DaemonHandle {
        &self.handle
    }

    /// Waits until the daemon reaches `Steady`. Returns false on timeout.
    pub async fn wait_steady(&self) -> bool {
        let wait = self
            .handle
            .wait_for(|state| matches!(state, DaemonState::Steady));
        tokio::time::timeout(SETTLE_TIMEOUT, wait)
            .await
            .unwrap_or(false)
    }

    /// Requests shutdown and returns the stopped daemon with its result.
    ///
    /// # Panics
    ///
    /// If the daemon task panicked.
    pub async fn stop(self) -> (ReconciliationDaemon, ReconcileResult<()>) {
        self.handle.shutdown();
        match self.task.await {
            Ok(stopped) => stopped,
            Err(e) => panic!("daemon task failed: {}", e),
        }
    }
}

/// Polls `condition` every 10ms until it holds or `SETTLE_TIMEOUT` passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
