//! Configuration snapshots, change events and row diffs.
//!
//! A [`Snapshot`] is an immutable view of the tracked tables. Applying a
//! [`ChangeEvent`] returns a new snapshot; [`diff`] compares two snapshots
//! and yields one [`RowDelta`] per row whose field map changed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ReconcileError, ReconcileResult};

/// Field name to value mapping for one row.
///
/// An empty row is the "absent" sentinel handed to policies.
pub type Row = BTreeMap<String, String>;

/// Row key to row mapping for one table.
pub type Table = BTreeMap<String, Row>;

/// Builds a [`Row`] from `field => value` pairs.
///
/// ```ignore
/// let row = row! { "state" => "enabled", "auto_restart" => "disabled" };
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::snapshot::Row::new()
    };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::snapshot::Row::new();
        $(row.insert($field.to_string(), $value.to_string());)+
        row
    }};
}

/// Extension methods for reading typed fields out of a [`Row`].
pub trait RowExt {
    /// Returns the value for a field, if present.
    fn get_field(&self, field: &str) -> Option<&str>;

    /// Returns the value for a field or the given default.
    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str {
        self.get_field(field).unwrap_or(default)
    }

    /// Returns true if this row has the given field.
    fn has_field(&self, field: &str) -> bool {
        self.get_field(field).is_some()
    }

    /// Parses a SONiC boolean ("true"/"True"/"1" and friends).
    fn get_bool(&self, field: &str) -> Option<bool> {
        self.get_field(field).map(|v| {
            matches!(
                v.to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on" | "enabled"
            )
        })
    }
}

impl RowExt for Row {
    fn get_field(&self, field: &str) -> Option<&str> {
        self.get(field).map(String::as_str)
    }
}

/// Operation carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Row created or updated
    Set,
    /// Row deleted
    Del,
}

impl Operation {
    /// Returns the wire name ("SET" / "DEL").
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Set => "SET",
            Operation::Del => "DEL",
        }
    }

    /// Parses the wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SET" | "set" | "hset" => Some(Operation::Set),
            "DEL" | "del" => Some(Operation::Del),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change notification from the configuration store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Table name (e.g. "FEATURE")
    pub table: String,
    /// Row key within the table
    pub key: String,
    /// SET or DEL
    pub op: Operation,
    /// Full row contents for SET; empty for DEL
    pub row: Row,
}

impl ChangeEvent {
    /// Creates a SET event carrying the full row.
    pub fn set(table: impl Into<String>, key: impl Into<String>, row: Row) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            op: Operation::Set,
            row,
        }
    }

    /// Creates a DEL event.
    pub fn del(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            op: Operation::Del,
            row: Row::new(),
        }
    }

    /// Decodes the store's list encoding `[key, op, f1, v1, f2, v2, ...]`.
    ///
    /// # Errors
    ///
    /// `MalformedEvent` if the key or op is missing, the op is unknown, or
    /// a field has no value.
    pub fn from_fields(table: &str, fields: &[String]) -> ReconcileResult<Self> {
        let (key, rest) = fields
            .split_first()
            .ok_or_else(|| ReconcileError::malformed(table, "missing key"))?;
        let (op, pairs) = rest
            .split_first()
            .ok_or_else(|| ReconcileError::malformed(table, format!("missing op for {}", key)))?;
        let op = Operation::parse(op).ok_or_else(|| {
            ReconcileError::malformed(table, format!("unknown op '{}' for {}", op, key))
        })?;
        if pairs.len() % 2 != 0 {
            return Err(ReconcileError::malformed(
                table,
                format!("odd field/value count for {}", key),
            ));
        }

        let row = match op {
            Operation::Set => pairs
                .chunks_exact(2)
                .map(|fv| (fv[0].clone(), fv[1].clone()))
                .collect(),
            Operation::Del => Row::new(),
        };

        Ok(Self {
            table: table.to_string(),
            key: key.clone(),
            op,
            row,
        })
    }

    /// Returns "TABLE|key" for logs and correlation ids.
    pub fn full_key(&self) -> String {
        format!("{}|{}", self.table, self.key)
    }
}

/// Change of one row between two snapshots.
///
/// `None` on either side means the row is absent there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDelta {
    pub table: String,
    pub key: String,
    pub old: Option<Row>,
    pub new: Option<Row>,
}

impl RowDelta {
    pub fn new(
        table: impl Into<String>,
        key: impl Into<String>,
        old: Option<Row>,
        new: Option<Row>,
    ) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            old,
            new,
        }
    }

    /// Returns true if the row disappears.
    pub fn is_delete(&self) -> bool {
        self.new.is_none()
    }

    /// Returns "TABLE|key".
    pub fn full_key(&self) -> String {
        format!("{}|{}", self.table, self.key)
    }
}

/// Immutable view of the tracked tables.
///
/// Cloning is cheap; tables are shared and copied on write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    tables: BTreeMap<String, Arc<Table>>,
}

impl Snapshot {
    /// Creates an empty snapshot tracking the given tables.
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables
                .into_iter()
                .map(|t| (t.into(), Arc::new(Table::new())))
                .collect(),
        }
    }

    /// Returns true if `table` is tracked.
    pub fn tracks(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Returns the names of the tracked tables.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Returns the rows of a tracked table.
    pub fn table(&self, table: &str) -> Option<&Table> {
        self.tables.get(table).map(|t| t.as_ref())
    }

    /// Returns one row.
    pub fn get(&self, table: &str, key: &str) -> Option<&Row> {
        self.tables.get(table).and_then(|t| t.get(key))
    }

    /// Iterates over every `(table, key, row)` in (table, key) order.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &str, &Row)> {
        self.tables.iter().flat_map(|(table, rows)| {
            rows.iter()
                .map(move |(key, row)| (table.as_str(), key.as_str(), row))
        })
    }

    /// Total number of rows across all tables.
    pub fn len(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a row while building a snapshot from a bulk load.
    ///
    /// # Errors
    ///
    /// `UnknownTable` if the table is not tracked.
    pub fn insert(&mut self, table: &str, key: impl Into<String>, row: Row) -> ReconcileResult<()> {
        let rows = self
            .tables
            .get_mut(table)
            .ok_or_else(|| ReconcileError::unknown_table(table))?;
        Arc::make_mut(rows).insert(key.into(), row);
        Ok(())
    }

    /// Returns a new snapshot with the event applied.
    ///
    /// A SET replaces the whole row; a SET with no fields removes it, as
    /// the store does for an empty hash. A DEL of a missing key is a no-op.
    ///
    /// # Errors
    ///
    /// `UnknownTable` if the event's table is not tracked.
    pub fn apply_event(&self, event: &ChangeEvent) -> ReconcileResult<Snapshot> {
        let mut next = self.clone();
        let rows = next
            .tables
            .get_mut(&event.table)
            .ok_or_else(|| ReconcileError::unknown_table(&event.table))?;

        match event.op {
            Operation::Set if !event.row.is_empty() => {
                Arc::make_mut(rows).insert(event.key.clone(), event.row.clone());
            }
            _ => {
                if rows.contains_key(&event.key) {
                    Arc::make_mut(rows).remove(&event.key);
                }
            }
        }
        Ok(next)
    }
}

/// Compares two snapshots row by row.
///
/// Returns one delta per (table, key) whose field map differs, ordered by
/// (table, key). Tables present in only one snapshot are compared against
/// an empty table.
pub fn diff(old: &Snapshot, new: &Snapshot) -> Vec<RowDelta> {
    let empty = Table::new();
    let mut names: Vec<&str> = old.table_names().chain(new.table_names()).collect();
    names.sort_unstable();
    names.dedup();

    let mut deltas = Vec::new();
    for name in names {
        let before = old.table(name).unwrap_or(&empty);
        let after = new.table(name).unwrap_or(&empty);

        let mut keys: Vec<&String> = before.keys().chain(after.keys()).collect();
        keys.sort_unstable();
        keys.dedup();

        for key in keys {
            let old_row = before.get(key);
            let new_row = after.get(key);
            if old_row != new_row {
                deltas.push(RowDelta::new(
                    name,
                    key.as_str(),
                    old_row.cloned(),
                    new_row.cloned(),
                ));
            }
        }
    }
    deltas
}
