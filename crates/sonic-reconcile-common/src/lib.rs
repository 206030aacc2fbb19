//! Configuration reconciliation core for SONiC host daemons.
//!
//! A host daemon (featured, bmpcfgd, ...) watches a set of CONFIG_DB
//! tables and keeps the host in line with them by issuing idempotent
//! corrective actions: systemd unit control, file rendering and firewall
//! rule rewrites. This crate holds everything those daemons share:
//!
//! - [`snapshot`]: rows, snapshots, change events and [`snapshot::diff`]
//! - [`action`]: the [`Action`] model with resource keys and priorities
//! - [`planner`]: per-table [`Policy`] registry and the [`ActionPlanner`]
//! - [`executor`]: [`ActionExecutor`] running action chains through a [`CommandRunner`]
//! - [`listener`]: the store contract, with [`MemoryStore`] and (feature `redis`) `RedisStore`
//! - [`daemon`]: the [`ReconciliationDaemon`] state machine
//! - [`host_service`]: handlers behind the host RPC surface
//! - [`config`], [`audit`], [`error`], [`shell`], [`signals`]: ambient support
//!
//! # Architecture
//!
//! 1. Subscribe to the tracked tables and load them (retrying with backoff)
//! 2. Plan every row against the last-applied cache and apply the result
//! 3. For each change event, diff against the cache and apply only changes
//! 4. Record a row as applied only when every action for it succeeded
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sonic_reconcile_common::{
//!     Action, ActionExecutor, DaemonSettings, MemoryStore, PolicyError,
//!     PolicyRegistry, ReconciliationDaemon, Row, ServiceVerb,
//! };
//!
//! let mut registry = PolicyRegistry::new();
//! registry.register("BMP", |_: &str, _: &str, _: &Row, _: &Row| -> Result<Vec<Action>, PolicyError> {
//!     Ok(vec![
//!         Action::service("openbmpd", ServiceVerb::Stop),
//!         Action::service("openbmpd", ServiceVerb::Start),
//!     ])
//! })?;
//!
//! let mut daemon = ReconciliationDaemon::new(
//!     "bmpcfgd",
//!     vec!["BMP".to_string()],
//!     Arc::new(MemoryStore::new()),
//!     registry,
//!     ActionExecutor::system(Default::default()),
//!     DaemonSettings::default(),
//! )?;
//! daemon.run().await?;
//! ```

pub mod action;
pub mod audit;
pub mod config;
pub mod daemon;
pub mod error;
pub mod executor;
pub mod host_service;
pub mod listener;
pub mod memory_store;
pub mod planner;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod shell;
pub mod signals;
pub mod snapshot;
pub mod state;

// Re-export commonly used items at crate root
pub use action::{sort_by_priority, Action, RuleOp, ServiceVerb};
pub use audit::{init_logging, AuditCategory, AuditOutcome, AuditRecord};
pub use config::{DaemonConfig, ExecutorConfig, ReconcileConfig, StoreConfig};
pub use daemon::{
    Backoff, DaemonHandle, DaemonSettings, DaemonState, EventOutcome, PassSummary,
    ReconciliationDaemon,
};
pub use error::{PolicyError, ReconcileError, ReconcileResult};
pub use executor::{
    ActionExecutor, ActionFailure, ActionOutcome, ActionReport, CommandRunner, DeltaReport,
    SystemRunner,
};
pub use listener::{ChangeListener, StatusSink, Subscription};
pub use memory_store::MemoryStore;
pub use planner::{ActionPlanner, PlannedDelta, Policy, PolicyRegistry};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use signals::{spawn_signal_handler, HangupAction};
pub use snapshot::{diff, ChangeEvent, Operation, Row, RowDelta, RowExt, Snapshot};
pub use state::ReconciliationState;
