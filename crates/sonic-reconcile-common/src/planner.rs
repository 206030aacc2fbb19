//! Table policies and the action planner.
//!
//! A [`Policy`] maps `(table, key, old_row, new_row)` to an ordered list of
//! [`Action`]s. Policies are registered explicitly per table in a
//! [`PolicyRegistry`]; the [`ActionPlanner`] looks up the policy for a
//! [`RowDelta`] and contains its failures to that one key.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::action::Action;
use crate::error::{PolicyError, ReconcileError, ReconcileResult};
use crate::snapshot::{Row, RowDelta};

/// Per-table planning logic.
///
/// `old` and `new` are the empty row when the key is absent on that side.
/// A policy must be deterministic and must not touch the host itself.
pub trait Policy: Send + Sync {
    /// Returns the actions that move the host from `old` to `new`, in the
    /// order they must run.
    fn plan(&self, table: &str, key: &str, old: &Row, new: &Row)
        -> Result<Vec<Action>, PolicyError>;

    /// Returns the status row to publish after `new` was reconciled.
    ///
    /// `applied` is true when every planned action succeeded. The default
    /// publishes nothing.
    fn status(&self, _key: &str, _new: &Row, _applied: bool) -> Option<Row> {
        None
    }
}

impl<F> Policy for F
where
    F: Fn(&str, &str, &Row, &Row) -> Result<Vec<Action>, PolicyError> + Send + Sync,
{
    fn plan(
        &self,
        table: &str,
        key: &str,
        old: &Row,
        new: &Row,
    ) -> Result<Vec<Action>, PolicyError> {
        self(table, key, old, new)
    }
}

/// Explicit table name to policy mapping.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, Arc<dyn Policy>>,
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("tables", &self.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the policy for a table.
    ///
    /// # Errors
    ///
    /// `Config` if the table already has a policy.
    pub fn register(
        &mut self,
        table: impl Into<String>,
        policy: impl Policy + 'static,
    ) -> ReconcileResult<()> {
        self.register_arc(table, Arc::new(policy))
    }

    /// Registers a shared policy for a table.
    pub fn register_arc(
        &mut self,
        table: impl Into<String>,
        policy: Arc<dyn Policy>,
    ) -> ReconcileResult<()> {
        let table = table.into();
        if self.policies.contains_key(&table) {
            return Err(ReconcileError::config(
                format!("policy.{}", table),
                "a policy is already registered for this table",
            ));
        }
        self.policies.insert(table, policy);
        Ok(())
    }

    /// Returns the policy for a table.
    pub fn get(&self, table: &str) -> Option<&Arc<dyn Policy>> {
        self.policies.get(table)
    }

    /// Returns the registered table names.
    pub fn tables(&self) -> Vec<String> {
        self.policies.keys().cloned().collect()
    }

    /// Checks that every table in `tables` has a policy.
    ///
    /// # Errors
    ///
    /// `Config` naming the first uncovered table.
    pub fn ensure_covers<'a>(&self, tables: impl IntoIterator<Item = &'a str>) -> ReconcileResult<()> {
        for table in tables {
            if !self.policies.contains_key(table) {
                return Err(ReconcileError::config(
                    format!("policy.{}", table),
                    "table is tracked but has no registered policy",
                ));
            }
        }
        Ok(())
    }
}

/// A delta together with the actions planned for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDelta {
    pub delta: RowDelta,
    pub actions: Vec<Action>,
}

impl PlannedDelta {
    pub fn new(delta: RowDelta, actions: Vec<Action>) -> Self {
        Self { delta, actions }
    }
}

/// Turns row deltas into action sequences using the registered policies.
#[derive(Debug, Clone)]
pub struct ActionPlanner {
    registry: PolicyRegistry,
}

impl ActionPlanner {
    pub fn new(registry: PolicyRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Plans one delta.
    ///
    /// The policy's sequence is returned unchanged. A policy error or a
    /// panic inside the policy becomes `ReconcileError::Policy` for this
    /// key only.
    ///
    /// # Errors
    ///
    /// `UnknownTable` if no policy is registered for the delta's table.
    pub fn plan(&self, delta: &RowDelta) -> ReconcileResult<Vec<Action>> {
        let policy = self
            .registry
            .get(&delta.table)
            .ok_or_else(|| ReconcileError::unknown_table(&delta.table))?;

        let empty = Row::new();
        let old = delta.old.as_ref().unwrap_or(&empty);
        let new = delta.new.as_ref().unwrap_or(&empty);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            policy.plan(&delta.table, &delta.key, old, new)
        }));

        match outcome {
            Ok(Ok(actions)) => {
                tracing::debug!(
                    table = %delta.table,
                    key = %delta.key,
                    actions = actions.len(),
                    "Planned delta"
                );
                Ok(actions)
            }
            Ok(Err(e)) => Err(ReconcileError::policy(&delta.table, &delta.key, e.message)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    table = %delta.table,
                    key = %delta.key,
                    panic = %message,
                    "Policy panicked"
                );
                Err(ReconcileError::policy(
                    &delta.table,
                    &delta.key,
                    format!("policy panicked: {}", message),
                ))
            }
        }
    }

    /// Returns the status row the table's policy wants published.
    pub fn status(&self, table: &str, key: &str, new: &Row, applied: bool) -> Option<Row> {
        let policy = self.registry.get(table)?;
        catch_unwind(AssertUnwindSafe(|| policy.status(key, new, applied)))
            .ok()
            .flatten()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
