//! The reconciliation daemon loop.
//!
//! ```text
//! Init -> Loading -> Steady -> Reconciling(table, key) -> Steady ...
//!            ^          |
//!            +----------+  (store unavailable)
//! any state -> Shutdown
//! ```
//!
//! Loading subscribes, reads every tracked table (retrying with exponential
//! backoff) and runs a full pass. Steady polls the subscription and
//! reconciles one key per event. Losing the store sends the daemon back to
//! Loading, which repeats the full pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::DaemonConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::executor::{ActionExecutor, DeltaReport};
use crate::listener::{ChangeListener, StatusSink, Subscription};
use crate::planner::{ActionPlanner, PlannedDelta, PolicyRegistry};
use crate::snapshot::{ChangeEvent, RowDelta, Snapshot};
use crate::state::ReconciliationState;

/// Lifecycle state published through [`DaemonHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonState {
    Init,
    Loading,
    Steady,
    Reconciling { table: String, key: String },
    Shutdown,
}

/// Exponential backoff: `initial`, doubled per attempt, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    /// Returns the delay before the next attempt and advances.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Loop timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub select_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub resync_interval: Option<Duration>,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self::from(&DaemonConfig::default())
    }
}

impl From<&DaemonConfig> for DaemonSettings {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            select_timeout: config.select_timeout(),
            backoff_initial: config.backoff_initial(),
            backoff_max: config.backoff_max(),
            resync_interval: config.resync_interval(),
        }
    }
}

/// Control handle for a running daemon.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    shutdown: CancellationToken,
    resync: Arc<AtomicBool>,
    state: watch::Receiver<DaemonState>,
}

impl DaemonHandle {
    /// Requests a cooperative shutdown. The daemon finishes the key it is
    /// reconciling and exits at the next loop iteration.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled on shutdown (for wiring signal handlers).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Requests a full resync at the next loop iteration.
    pub fn request_resync(&self) {
        self.resync.store(true, Ordering::SeqCst);
    }

    /// Current state.
    pub fn state(&self) -> DaemonState {
        self.state.borrow().clone()
    }

    /// Waits until the state satisfies `predicate`. Returns false if the
    /// daemon was dropped first.
    pub async fn wait_for(&self, predicate: impl FnMut(&DaemonState) -> bool) -> bool {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(predicate).await.is_ok();
        reached
    }
}

/// Counts for one full pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Deltas handed to the planner
    pub deltas: usize,
    /// Deltas whose actions all succeeded
    pub applied: usize,
    /// Deltas rejected by their policy or with a failed action
    pub failed: usize,
}

/// What happened to one change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event's table is not tracked.
    Dropped,
    /// The row equals the last applied row; nothing to do.
    Unchanged,
    /// Actions ran; see the report for per-action outcomes.
    Applied(DeltaReport),
    /// The policy rejected the row.
    PolicyFailed(String),
}

/// Event-driven reconciliation loop for one daemon.
pub struct ReconciliationDaemon {
    name: String,
    tables: Vec<String>,
    listener: Arc<dyn ChangeListener>,
    planner: ActionPlanner,
    executor: ActionExecutor,
    applied: ReconciliationState,
    snapshot: Snapshot,
    status_sink: Option<Arc<dyn StatusSink>>,
    settings: DaemonSettings,
    shutdown: CancellationToken,
    resync: Arc<AtomicBool>,
    state_tx: watch::Sender<DaemonState>,
}

impl std::fmt::Debug for ReconciliationDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationDaemon")
            .field("name", &self.name)
            .field("tables", &self.tables)
            .field("state", &*self.state_tx.borrow())
            .finish()
    }
}

impl ReconciliationDaemon {
    /// Creates a daemon tracking `tables`.
    ///
    /// # Errors
    ///
    /// `Config` if no table is given or a tracked table has no policy.
    pub fn new(
        name: impl Into<String>,
        tables: Vec<String>,
        listener: Arc<dyn ChangeListener>,
        registry: PolicyRegistry,
        executor: ActionExecutor,
        settings: DaemonSettings,
    ) -> ReconcileResult<Self> {
        if tables.is_empty() {
            return Err(ReconcileError::config("tables", "no table to track"));
        }
        registry.ensure_covers(tables.iter().map(String::as_str))?;

        let name = name.into();
        let (state_tx, _) = watch::channel(DaemonState::Init);
        Ok(Self {
            executor: executor.with_source(name.clone()),
            name,
            snapshot: Snapshot::new(tables.iter().cloned()),
            tables,
            listener,
            planner: ActionPlanner::new(registry),
            applied: ReconciliationState::new(),
            status_sink: None,
            settings,
            shutdown: CancellationToken::new(),
            resync: Arc::new(AtomicBool::new(false)),
            state_tx,
        })
    }

    /// Publishes per-key status rows to `sink`.
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            shutdown: self.shutdown.clone(),
            resync: self.resync.clone(),
            state: self.state_tx.subscribe(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last successfully applied rows.
    pub fn applied(&self) -> &ReconciliationState {
        &self.applied
    }

    /// Current view of the tracked tables.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn state(&self) -> DaemonState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&self, state: DaemonState) {
        debug!(daemon = %self.name, state = ?state, "State transition");
        self.state_tx.send_replace(state);
    }

    /// Runs until shutdown.
    ///
    /// # Errors
    ///
    /// Only errors other than store unavailability while loading are
    /// returned; everything else is handled inside the loop.
    pub async fn run(&mut self) -> ReconcileResult<()> {
        info!(daemon = %self.name, tables = ?self.tables, "Starting reconciliation daemon");
        audit_log!(AuditRecord::new(
            AuditCategory::SystemLifecycle,
            &self.name,
            "daemon_started",
        )
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({ "tables": self.tables })));

        'connect: while !self.shutdown.is_cancelled() {
            self.set_state(DaemonState::Loading);
            let Some((mut subscription, snapshot)) = self.connect_with_retry().await? else {
                break;
            };
            let cancel = subscription.cancel_handle();

            let summary = self.full_reconcile(snapshot).await;
            info!(
                daemon = %self.name,
                deltas = summary.deltas,
                applied = summary.applied,
                failed = summary.failed,
                "Full pass complete"
            );
            self.set_state(DaemonState::Steady);

            let mut next_resync = self.settings.resync_interval.map(|i| Instant::now() + i);

            loop {
                if self.shutdown.is_cancelled() {
                    cancel.cancel();
                    break 'connect;
                }

                let periodic = next_resync.is_some_and(|at| Instant::now() >= at);
                if self.resync.swap(false, Ordering::SeqCst) || periodic {
                    next_resync = self.settings.resync_interval.map(|i| Instant::now() + i);
                    match self.resync_now().await {
                        Ok(_) => {}
                        Err(e) if e.is_store_unavailable() => {
                            self.store_lost(&e);
                            cancel.cancel();
                            continue 'connect;
                        }
                        Err(e) => warn!(daemon = %self.name, error = %e, "Resync failed"),
                    }
                }

                match subscription.poll(self.settings.select_timeout).await {
                    Ok(None) => {}
                    Ok(Some(event)) => {
                        self.reconcile_event(event).await;
                    }
                    Err(e) if e.is_store_unavailable() => {
                        self.store_lost(&e);
                        cancel.cancel();
                        continue 'connect;
                    }
                    Err(e) => {
                        warn!(daemon = %self.name, error = %e, "Dropping undecodable notification");
                    }
                }
            }
        }

        self.set_state(DaemonState::Shutdown);
        info!(daemon = %self.name, "Reconciliation daemon stopped");
        audit_log!(AuditRecord::new(
            AuditCategory::SystemLifecycle,
            &self.name,
            "daemon_stopped",
        )
        .with_outcome(AuditOutcome::Success));
        Ok(())
    }

    fn store_lost(&self, err: &ReconcileError) {
        warn!(daemon = %self.name, error = %err, "Config store lost, reloading");
        audit_log!(store_lost_record(&self.name, err));
    }

    /// Subscribes and loads every tracked table, retrying with backoff
    /// while the store is unavailable.
    ///
    /// The subscription is opened first so that no change committed during
    /// the load is missed. Returns `None` if shutdown was requested.
    pub async fn connect_with_retry(
        &self,
    ) -> ReconcileResult<Option<(Box<dyn Subscription>, Snapshot)>> {
        let mut backoff = Backoff::new(self.settings.backoff_initial, self.settings.backoff_max);
        let mut attempt: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                return Ok(None);
            }
            attempt += 1;

            let result = async {
                let subscription = self.listener.subscribe(&self.tables).await?;
                let snapshot = self.listener.load_all(&self.tables).await?;
                Ok::<_, ReconcileError>((subscription, snapshot))
            }
            .await;

            match result {
                Ok(loaded) => {
                    info!(daemon = %self.name, rows = loaded.1.len(), attempt, "Loaded configuration");
                    return Ok(Some(loaded));
                }
                Err(e) if e.is_store_unavailable() => {
                    let delay = backoff.next_delay();
                    warn!(
                        daemon = %self.name,
                        error = %e,
                        attempt,
                        retry_in = ?delay,
                        "Config store unavailable"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.cancelled() => return Ok(None),
                    }
                }
                Err(e) => {
                    error!(daemon = %self.name, error = %e, "Failed to load configuration");
                    return Err(e);
                }
            }
        }
    }

    /// Reads the store again and runs a full pass.
    pub async fn resync_now(&mut self) -> ReconcileResult<PassSummary> {
        info!(daemon = %self.name, "Resyncing");
        let snapshot = self.listener.load_all(&self.tables).await?;
        Ok(self.full_reconcile(snapshot).await)
    }

    /// Plans every row of `snapshot` against the cache, plus a deletion for
    /// every cached key missing from it, and applies the result.
    ///
    /// Rows equal to their cached value are planned too, so the host is
    /// driven back to the configured state even if it drifted.
    #[instrument(skip(self, snapshot), fields(daemon = %self.name, rows = snapshot.len()))]
    pub async fn full_reconcile(&mut self, snapshot: Snapshot) -> PassSummary {
        let mut deltas: Vec<RowDelta> = snapshot
            .rows()
            .map(|(table, key, row)| {
                RowDelta::new(table, key, self.applied.get(table, key), Some(row.clone()))
            })
            .collect();
        for (table, key) in self.applied.keys() {
            if snapshot.get(&table, &key).is_none() {
                let old = self.applied.get(&table, &key);
                deltas.push(RowDelta::new(table, key, old, None));
            }
        }
        self.snapshot = snapshot;

        let mut summary = PassSummary {
            deltas: deltas.len(),
            ..Default::default()
        };

        let mut planned = Vec::with_capacity(deltas.len());
        for delta in deltas {
            match self.planner.plan(&delta) {
                Ok(actions) => planned.push(PlannedDelta::new(delta, actions)),
                Err(e) => {
                    warn!(key = %delta.full_key(), error = %e, "Policy rejected row");
                    summary.failed += 1;
                    self.commit(&delta, false).await;
                }
            }
        }

        let deltas: Vec<RowDelta> = planned.iter().map(|p| p.delta.clone()).collect();
        let reports = self.executor.execute_batch(planned).await;
        for (delta, report) in deltas.iter().zip(&reports) {
            let ok = report.all_succeeded();
            if ok {
                summary.applied += 1;
            } else {
                summary.failed += 1;
                log_failures(report);
            }
            self.commit(delta, ok).await;
        }
        summary
    }

    /// Reconciles one change event.
    #[instrument(skip(self, event), fields(daemon = %self.name, key = %event.full_key(), op = %event.op))]
    pub async fn reconcile_event(&mut self, event: ChangeEvent) -> EventOutcome {
        let next = match self.snapshot.apply_event(&event) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "Dropping event");
                return EventOutcome::Dropped;
            }
        };
        self.snapshot = next;

        let new = self.snapshot.get(&event.table, &event.key).cloned();
        let old = self.applied.get(&event.table, &event.key);
        if old == new {
            debug!("Row unchanged since last apply");
            return EventOutcome::Unchanged;
        }

        self.set_state(DaemonState::Reconciling {
            table: event.table.clone(),
            key: event.key.clone(),
        });
        let delta = RowDelta::new(event.table, event.key, old, new);

        let outcome = match self.planner.plan(&delta) {
            Ok(actions) => {
                let mut reports = self
                    .executor
                    .execute_batch(vec![PlannedDelta::new(delta.clone(), actions)])
                    .await;
                match reports.pop() {
                    Some(report) => {
                        let ok = report.all_succeeded();
                        if !ok {
                            log_failures(&report);
                        }
                        self.commit(&delta, ok).await;
                        EventOutcome::Applied(report)
                    }
                    None => EventOutcome::Unchanged,
                }
            }
            Err(e) => {
                warn!(error = %e, "Policy rejected row");
                self.commit(&delta, false).await;
                EventOutcome::PolicyFailed(e.to_string())
            }
        };

        self.set_state(DaemonState::Steady);
        outcome
    }

    /// Updates the cache (only when every action succeeded) and publishes
    /// the key's status.
    async fn commit(&self, delta: &RowDelta, applied: bool) {
        if applied {
            self.applied
                .record(&delta.table, &delta.key, delta.new.clone());
        }

        audit_log!({
            let record = AuditRecord::new(
                AuditCategory::ConfigurationChange,
                &self.name,
                if delta.is_delete() { "remove_row" } else { "apply_row" },
            )
            .with_resource(delta.full_key());
            if applied {
                record.with_outcome(AuditOutcome::Success)
            } else {
                record.with_error("row not fully applied")
            }
        });

        let Some(sink) = &self.status_sink else {
            return;
        };
        let result = match &delta.new {
            None if applied => sink.clear_status(&delta.table, &delta.key).await,
            None => Ok(()),
            Some(new) => match self.planner.status(&delta.table, &delta.key, new, applied) {
                Some(status) => sink.set_status(&delta.table, &delta.key, &status).await,
                None => Ok(()),
            },
        };
        if let Err(e) = result {
            warn!(key = %delta.full_key(), error = %e, "Failed to publish status");
        }
    }
}

fn log_failures(report: &DeltaReport) {
    for failed in report.failures() {
        warn!(
            table = %report.table,
            key = %report.key,
            action = %failed.action,
            outcome = ?failed.outcome,
            "Action did not succeed"
        );
    }
}

fn store_lost_record(daemon: &str, err: &ReconcileError) -> AuditRecord {
    AuditRecord::new(AuditCategory::ErrorCondition, daemon, "store_lost").with_error(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ServiceVerb};
    use crate::config::ExecutorConfig;
    use crate::error::PolicyError;
    use crate::executor::{ActionOutcome, CommandRunner};
    use crate::memory_store::MemoryStore;
    use crate::row;
    use crate::shell::{CommandSpec, ExecResult};
    use crate::snapshot::{Row, RowExt};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingRunner {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl CommandRunner for CountingRunner {
        async fn run(&self, spec: &CommandSpec) -> ReconcileResult<ExecResult> {
            self.calls.lock().unwrap().push(spec.argv.clone());
            Ok(ExecResult::default())
        }
    }

    fn start_policy(
        _table: &str,
        key: &str,
        _old: &Row,
        new: &Row,
    ) -> Result<Vec<Action>, PolicyError> {
        let verb = match new.get_field("state") {
            Some("enabled") => ServiceVerb::Start,
            Some(other) => return Err(PolicyError::new(format!("bad state {}", other))),
            None => ServiceVerb::Stop,
        };
        Ok(vec![Action::service(format!("{}.service", key), verb)])
    }

    fn daemon(store: &MemoryStore, runner: Arc<CountingRunner>) -> ReconciliationDaemon {
        let mut registry = PolicyRegistry::new();
        registry.register("FEATURE", start_policy).unwrap();
        let settings = DaemonSettings {
            select_timeout: Duration::from_millis(10),
            backoff_initial: Duration::from_millis(5),
            backoff_max: Duration::from_millis(20),
            resync_interval: None,
        };
        ReconciliationDaemon::new(
            "testd",
            vec!["FEATURE".to_string()],
            Arc::new(store.clone()),
            registry,
            ActionExecutor::new(runner, ExecutorConfig::default()),
            settings,
        )
        .unwrap()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        let delays: Vec<u128> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 350, 350, 350]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_store_lost_is_audited_as_error() {
        let err = ReconcileError::store_unavailable("poll", "connection reset");
        let record = store_lost_record("featured", &err);
        assert_eq!(record.category, AuditCategory::ErrorCondition);
        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(record.action, "store_lost");
        assert_eq!(record.error, Some(err.to_string()));
    }

    #[tokio::test]
    async fn test_wait_for_returns_false_after_daemon_dropped() {
        let store = MemoryStore::new();
        let daemon = daemon(&store, Arc::new(CountingRunner::default()));
        let handle = daemon.handle();
        assert!(handle.wait_for(|s| *s == DaemonState::Init).await);

        drop(daemon);
        assert!(!handle.wait_for(|s| *s == DaemonState::Steady).await);
    }

    #[test]
    fn test_new_requires_policy_for_every_table() {
        let store = MemoryStore::new();
        let result = ReconciliationDaemon::new(
            "testd",
            vec!["FEATURE".to_string()],
            Arc::new(store),
            PolicyRegistry::new(),
            ActionExecutor::new(Arc::new(CountingRunner::default()), ExecutorConfig::default()),
            DaemonSettings::default(),
        );
        assert!(matches!(result, Err(ReconcileError::Config { .. })));
    }

    #[tokio::test]
    async fn test_reconcile_event_idempotent() {
        let store = MemoryStore::new();
        let runner = Arc::new(CountingRunner::default());
        let mut daemon = daemon(&store, runner.clone());

        let event = ChangeEvent::set("FEATURE", "ntp", row! { "state" => "enabled" });
        assert!(matches!(
            daemon.reconcile_event(event.clone()).await,
            EventOutcome::Applied(_)
        ));
        assert_eq!(daemon.reconcile_event(event).await, EventOutcome::Unchanged);
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
        assert_eq!(
            daemon.applied().get("FEATURE", "ntp"),
            Some(row! { "state" => "enabled" })
        );
        assert_eq!(daemon.state(), DaemonState::Steady);
    }

    #[tokio::test]
    async fn test_reconcile_event_untracked_table() {
        let store = MemoryStore::new();
        let runner = Arc::new(CountingRunner::default());
        let mut daemon = daemon(&store, runner.clone());

        let event = ChangeEvent::set("PORT", "Ethernet0", row! { "mtu" => "9100" });
        assert_eq!(daemon.reconcile_event(event).await, EventOutcome::Dropped);
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_policy_failure_leaves_cache() {
        let store = MemoryStore::new();
        let runner = Arc::new(CountingRunner::default());
        let mut daemon = daemon(&store, runner.clone());

        let event = ChangeEvent::set("FEATURE", "mux", row! { "state" => "{{ state }}" });
        match daemon.reconcile_event(event).await {
            EventOutcome::PolicyFailed(msg) => assert!(msg.contains("bad state")),
            other => panic!("Expected PolicyFailed, got {:?}", other),
        }
        assert_eq!(daemon.applied().get("FEATURE", "mux"), None);
    }

    #[tokio::test]
    async fn test_full_reconcile_plans_deletions() {
        let store = MemoryStore::new();
        let runner = Arc::new(CountingRunner::default());
        let mut daemon = daemon(&store, runner.clone());
        daemon
            .applied()
            .record("FEATURE", "stale", Some(row! { "state" => "enabled" }));

        let mut snapshot = Snapshot::new(["FEATURE"]);
        snapshot
            .insert("FEATURE", "ntp", row! { "state" => "enabled" })
            .unwrap();
        let summary = daemon.full_reconcile(snapshot).await;

        assert_eq!(
            summary,
            PassSummary {
                deltas: 2,
                applied: 2,
                failed: 0
            }
        );
        assert_eq!(daemon.applied().get("FEATURE", "stale"), None);
        let calls = runner.calls.lock().unwrap().clone();
        assert!(calls.contains(&vec![
            "/bin/systemctl".to_string(),
            "stop".to_string(),
            "stale.service".to_string()
        ]));
    }

    #[tokio::test]
    async fn test_run_and_shutdown() {
        let store = MemoryStore::new();
        store.set("FEATURE", "ntp", row! { "state" => "enabled" });
        let runner = Arc::new(CountingRunner::default());
        let mut daemon = daemon(&store, runner.clone());
        let handle = daemon.handle();

        let task = tokio::spawn(async move {
            daemon.run().await.unwrap();
            daemon
        });

        assert!(handle.wait_for(|s| *s == DaemonState::Steady).await);
        handle.shutdown();
        let daemon = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(daemon.state(), DaemonState::Shutdown);
        assert_eq!(
            daemon.applied().get("FEATURE", "ntp"),
            Some(row! { "state" => "enabled" })
        );
    }

    #[tokio::test]
    async fn test_outcome_reports() {
        let store = MemoryStore::new();
        let runner = Arc::new(CountingRunner::default());
        let mut daemon = daemon(&store, runner);
        let event = ChangeEvent::set("FEATURE", "lldp", row! { "state" => "enabled" });
        match daemon.reconcile_event(event).await {
            EventOutcome::Applied(report) => {
                assert_eq!(report.key, "lldp");
                assert_eq!(report.reports[0].outcome, ActionOutcome::Success);
            }
            other => panic!("Expected Applied, got {:?}", other),
        }
    }
}
