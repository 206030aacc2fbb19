//! Error types for reconciliation operations.
//!
//! Only store connectivity failures ([`ReconcileError::StoreUnavailable`])
//! are meant to reach a daemon's retry loop. Everything else is contained
//! within the reconciliation of a single key.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors that can occur while loading, planning or applying configuration.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The configuration store cannot be reached.
    #[error("Config store unavailable during {operation}: {message}")]
    StoreUnavailable {
        /// The store operation that failed (e.g., "load_all", "poll").
        operation: String,
        /// Error message.
        message: String,
    },

    /// The table is not tracked by this daemon.
    #[error("Unknown table '{table}'")]
    UnknownTable {
        /// The table name.
        table: String,
    },

    /// A table policy rejected a row or panicked while planning.
    #[error("Policy error for {table}|{key}: {message}")]
    Policy {
        /// The table name.
        table: String,
        /// The row key.
        key: String,
        /// Error message.
        message: String,
    },

    /// A change notification could not be decoded.
    #[error("Malformed event from {source_name}: {message}")]
    MalformedEvent {
        /// Where the event came from (table or channel name).
        source_name: String,
        /// Error message.
        message: String,
    },

    /// Failed to spawn an external command.
    #[error("Failed to execute command '{command}': {source}")]
    CommandSpawn {
        /// The command line that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// External command exceeded its timeout and was killed.
    #[error("Command '{command}' timed out after {timeout:?}")]
    CommandTimeout {
        /// The command line.
        command: String,
        /// The timeout that expired.
        timeout: Duration,
    },

    /// External command returned a non-zero exit code.
    #[error("Command failed: '{command}' (exit code {exit_code}): {output}")]
    CommandFailed {
        /// The command line.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Filesystem operation failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The path involved.
        path: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Invalid daemon configuration.
    #[error("Invalid configuration for {field}: {message}")]
    Config {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl ReconcileError {
    /// Creates a store unavailable error.
    pub fn store_unavailable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown table error.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable {
            table: table.into(),
        }
    }

    /// Creates a policy error.
    pub fn policy(
        table: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Policy {
            table: table.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed event error.
    pub fn malformed(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedEvent {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the store could not be reached.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, ReconcileError::StoreUnavailable { .. })
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::StoreUnavailable { .. }
                | ReconcileError::CommandTimeout { .. }
                | ReconcileError::CommandFailed { .. }
        )
    }
}

/// Error returned by a table policy for one row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PolicyError {
    /// Human-readable reason.
    pub message: String,
}

impl PolicyError {
    /// Creates a policy error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
