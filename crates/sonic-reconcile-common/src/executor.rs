//! Applies planned actions to the host.
//!
//! The executor never raises: every action yields an [`ActionReport`] and
//! callers aggregate them. Within one chain, once an action on a resource
//! fails, later actions on that resource are skipped while actions on other
//! resources still run. Across deltas, [`ActionExecutor::execute_batch`]
//! serializes deltas that share a resource and runs independent groups
//! concurrently up to `max_parallel`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};

use crate::action::{Action, RuleOp};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::ExecutorConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::planner::PlannedDelta;
use crate::shell::{self, CommandSpec, ExecResult};

/// Runs external commands.
///
/// [`SystemRunner`] spawns real processes; tests substitute a recorder.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> ReconcileResult<ExecResult>;
}

/// Spawns commands with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> ReconcileResult<ExecResult> {
        shell::exec(spec).await
    }
}

/// Why an action failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionFailure {
    /// Command exited non-zero.
    Exit { code: i32, message: String },
    /// Command exceeded its timeout and was killed.
    Timeout { after: Duration },
    /// Command could not be started.
    Spawn(String),
    /// File operation failed.
    Io(String),
}

impl std::fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionFailure::Exit { code, message } => write!(f, "exit code {}: {}", code, message),
            ActionFailure::Timeout { after } => write!(f, "timed out after {:?}", after),
            ActionFailure::Spawn(msg) => write!(f, "spawn failed: {}", msg),
            ActionFailure::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

/// Result of one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    Failed(ActionFailure),
    /// Not attempted; carries the reason (the failed dependency).
    Skipped(String),
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub action: Action,
    pub outcome: ActionOutcome,
    pub finished_at: DateTime<Utc>,
}

/// Reports for every action planned for one (table, key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaReport {
    pub table: String,
    pub key: String,
    pub reports: Vec<ActionReport>,
}

impl DeltaReport {
    /// True when every action succeeded (vacuously true for no actions).
    pub fn all_succeeded(&self) -> bool {
        self.reports.iter().all(|r| r.outcome.is_success())
    }

    /// Reports that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &ActionReport> {
        self.reports.iter().filter(|r| !r.outcome.is_success())
    }
}

/// Per-resource async locks shared by every caller of an executor.
#[derive(Debug, Clone, Default)]
pub struct ResourceLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every resource, in sorted order so that concurrent callers
    /// cannot deadlock.
    pub async fn acquire(&self, resources: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&String> = resources.iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for resource in sorted {
            let lock = self.locks.entry(resource.clone()).or_default().clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

/// Executes action chains.
pub struct ActionExecutor {
    runner: Arc<dyn CommandRunner>,
    config: ExecutorConfig,
    locks: ResourceLocks,
    permits: Arc<Semaphore>,
    source: String,
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("config", &self.config)
            .field("source", &self.source)
            .finish()
    }
}

impl ActionExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, config: ExecutorConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_parallel.max(1)));
        Self {
            runner,
            config,
            locks: ResourceLocks::new(),
            permits,
            source: "reconcile".to_string(),
        }
    }

    /// Executor spawning real processes.
    pub fn system(config: ExecutorConfig) -> Self {
        Self::new(Arc::new(SystemRunner), config)
    }

    /// Sets the daemon name recorded in audit records.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs one delta's action chain strictly in order.
    ///
    /// Returns one report per action, in input order.
    pub async fn execute(&self, actions: &[Action]) -> Vec<ActionReport> {
        self.run_chain(None, actions).await
    }

    /// Runs many deltas.
    ///
    /// Deltas that share any resource form one group and run one after
    /// another in arrival order. Groups run concurrently, bounded by
    /// `max_parallel`. Reports come back in input order.
    pub async fn execute_batch(&self, planned: Vec<PlannedDelta>) -> Vec<DeltaReport> {
        let groups = group_by_resource(&planned);
        tracing::debug!(
            deltas = planned.len(),
            groups = groups.len(),
            "Executing batch"
        );

        let planned = &planned;
        let runs = groups.into_iter().map(|group| async move {
            // The semaphore is never closed.
            let _permit = self.permits.acquire().await.ok();
            let mut reports = Vec::with_capacity(group.len());
            for index in group {
                let item = &planned[index];
                let correlation = item.delta.full_key();
                let chain = self.run_chain(Some(&correlation), &item.actions).await;
                reports.push((
                    index,
                    DeltaReport {
                        table: item.delta.table.clone(),
                        key: item.delta.key.clone(),
                        reports: chain,
                    },
                ));
            }
            reports
        });

        let mut ordered: BTreeMap<usize, DeltaReport> = BTreeMap::new();
        for group in join_all(runs).await {
            ordered.extend(group);
        }
        ordered.into_values().collect()
    }

    async fn run_chain(&self, correlation: Option<&str>, actions: &[Action]) -> Vec<ActionReport> {
        let resources: Vec<String> = actions.iter().map(Action::resource).collect();
        let _guards = self.locks.acquire(&resources).await;

        let mut failed: HashSet<String> = HashSet::new();
        let mut reports = Vec::with_capacity(actions.len());

        for (action, resource) in actions.iter().zip(resources) {
            let outcome = if failed.contains(&resource) {
                ActionOutcome::Skipped(format!("earlier action on {} did not succeed", resource))
            } else {
                self.apply(action).await
            };

            if !outcome.is_success() {
                failed.insert(resource.clone());
            }
            self.audit(correlation, action, &resource, &outcome);

            reports.push(ActionReport {
                action: action.clone(),
                outcome,
                finished_at: Utc::now(),
            });
        }
        reports
    }

    async fn apply(&self, action: &Action) -> ActionOutcome {
        match action {
            Action::File { path, content } => match write_atomic(path, content).await {
                Ok(()) => ActionOutcome::Success,
                Err(e) => ActionOutcome::Failed(ActionFailure::Io(format!(
                    "{}: {}",
                    path.display(),
                    e
                ))),
            },
            Action::RemoveFile { path } => match tokio::fs::remove_file(path).await {
                Ok(()) => ActionOutcome::Success,
                Err(e) if e.kind() == io::ErrorKind::NotFound => ActionOutcome::Success,
                Err(e) => ActionOutcome::Failed(ActionFailure::Io(format!(
                    "{}: {}",
                    path.display(),
                    e
                ))),
            },
            _ => {
                let spec = self.command_for(action);
                outcome_from_exec(self.runner.run(&spec).await)
            }
        }
    }

    /// Builds the argv for a command-backed action.
    pub fn command_for(&self, action: &Action) -> CommandSpec {
        let mut argv = self.config.command_prefix.clone();
        match action {
            Action::Service { unit, verb } => {
                argv.push(self.config.systemctl_path.clone());
                argv.push(verb.as_str().to_string());
                argv.push(unit.clone());
            }
            Action::DaemonReload => {
                argv.push(self.config.systemctl_path.clone());
                argv.push("daemon-reload".to_string());
            }
            Action::Rule { op, spec } => {
                argv.push(self.config.iptables_path.clone());
                argv.push(op.flag().to_string());
                argv.extend(spec.iter().cloned());
            }
            Action::File { .. } | Action::RemoveFile { .. } => {}
        }
        CommandSpec::new(argv).with_timeout(self.config.command_timeout())
    }

    fn audit(
        &self,
        correlation: Option<&str>,
        action: &Action,
        resource: &str,
        outcome: &ActionOutcome,
    ) {
        let category = match action {
            Action::Service { .. } | Action::DaemonReload => AuditCategory::ServiceControl,
            Action::File { .. } | Action::RemoveFile { .. } => AuditCategory::FileChange,
            Action::Rule { .. } => AuditCategory::FirewallRule,
        };
        let mut record =
            AuditRecord::new(category, &self.source, action.verb()).with_resource(resource);
        if let Some(id) = correlation {
            record = record.with_correlation_id(id);
        }
        if let Action::Rule { op, spec } = action {
            record = record.with_details(serde_json::json!({
                "op": if *op == RuleOp::Add { "add" } else { "remove" },
                "spec": spec,
            }));
        }
        record = match outcome {
            ActionOutcome::Success => record.with_outcome(AuditOutcome::Success),
            ActionOutcome::Failed(failure) => record.with_error(failure.to_string()),
            ActionOutcome::Skipped(reason) => {
                let mut r = record.with_outcome(AuditOutcome::Skipped);
                r.error = Some(reason.clone());
                r
            }
        };
        audit_log!(record);
    }
}

fn outcome_from_exec(result: ReconcileResult<ExecResult>) -> ActionOutcome {
    match result {
        Ok(res) if res.success() => ActionOutcome::Success,
        Ok(res) => {
            let message = res
                .error_line()
                .map(str::to_string)
                .unwrap_or_else(|| res.combined_output());
            ActionOutcome::Failed(ActionFailure::Exit {
                code: res.exit_code,
                message,
            })
        }
        Err(ReconcileError::CommandTimeout { timeout, .. }) => {
            ActionOutcome::Failed(ActionFailure::Timeout { after: timeout })
        }
        Err(e) => ActionOutcome::Failed(ActionFailure::Spawn(e.to_string())),
    }
}

/// Writes `content` next to `path` and renames it into place.
async fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

    tokio::fs::write(&tmp, content).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// Partitions deltas into groups connected by shared resources.
///
/// Each group lists delta indices in arrival order; groups are ordered by
/// their first index.
fn group_by_resource(planned: &[PlannedDelta]) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..planned.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut owner: BTreeMap<String, usize> = BTreeMap::new();
    for (index, item) in planned.iter().enumerate() {
        for action in &item.actions {
            match owner.get(&action.resource()) {
                Some(&other) => {
                    let a = find(&mut parent, index);
                    let b = find(&mut parent, other);
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
                None => {
                    owner.insert(action.resource(), index);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for index in 0..planned.len() {
        let root = find(&mut parent, index);
        groups.entry(root).or_default().push(index);
    }
    groups.into_values().collect()
}
