//! Last-applied configuration cache.

use dashmap::DashMap;

use crate::snapshot::Row;

/// Per-daemon cache of `(table, key) -> last successfully applied row`.
///
/// Process-local; rebuilt from the store by a full pass after restart.
/// An entry changes only when every action planned for its key succeeded.
#[derive(Debug, Default)]
pub struct ReconciliationState {
    applied: DashMap<(String, String), Row>,
}

impl ReconciliationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last applied row.
    pub fn get(&self, table: &str, key: &str) -> Option<Row> {
        self.applied
            .get(&(table.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Records the result of a fully successful reconciliation.
    ///
    /// `None` means the row was deleted and its entry is dropped.
    pub fn record(&self, table: &str, key: &str, row: Option<Row>) {
        let id = (table.to_string(), key.to_string());
        match row {
            Some(row) => {
                self.applied.insert(id, row);
            }
            None => {
                self.applied.remove(&id);
            }
        }
    }

    pub fn remove(&self, table: &str, key: &str) -> Option<Row> {
        self.applied
            .remove(&(table.to_string(), key.to_string()))
            .map(|(_, row)| row)
    }

    /// Returns every cached `(table, key)`, sorted.
    pub fn keys(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.applied.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    pub fn clear(&self) {
        self.applied.clear();
    }
}
