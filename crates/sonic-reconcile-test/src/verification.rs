//! Verification helpers for testing reconciliation daemons
//!
//! Provides assertion helpers to verify issued commands, the last-applied
//! cache and published status rows.

use thiserror::Error;

use sonic_reconcile_common::{MemoryStore, ReconciliationDaemon, Row};

use crate::RecordingRunner;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Command mismatch: expected {expected:?}, got {actual:?}")]
    CommandsMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Expected a command containing '{pattern}', got {actual:?}")]
    CommandNotFound { pattern: String, actual: Vec<String> },

    #[error("Expected {expected} commands containing '{pattern}', found {actual}")]
    CommandCountMismatch {
        pattern: String,
        expected: usize,
        actual: usize,
    },

    #[error("Cache mismatch for {key}: expected {expected:?}, got {actual:?}")]
    CacheMismatch {
        key: String,
        expected: Option<Row>,
        actual: Option<Row>,
    },

    #[error("Status mismatch for {key}: expected {expected:?}, got {actual:?}")]
    StatusMismatch {
        key: String,
        expected: Option<Row>,
        actual: Option<Row>,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Verifier for commands issued through a [`RecordingRunner`]
pub struct CommandVerifier<'a> {
    runner: &'a RecordingRunner,
}

impl<'a> CommandVerifier<'a> {
    pub fn new(runner: &'a RecordingRunner) -> Self {
        Self { runner }
    }

    /// Verify the exact command lines, in order
    pub fn assert_commands(&self, expected: &[&str]) -> VerifyResult<()> {
        let actual = self.runner.command_lines();
        if actual.iter().map(String::as_str).eq(expected.iter().copied()) {
            Ok(())
        } else {
            Err(VerificationError::CommandsMismatch {
                expected: expected.iter().map(|s| s.to_string()).collect(),
                actual,
            })
        }
    }

    /// Verify that commands containing each pattern ran in the given order,
    /// possibly with other commands in between
    pub fn assert_in_order(&self, patterns: &[&str]) -> VerifyResult<()> {
        let actual = self.runner.command_lines();
        let mut lines = actual.iter();
        for pattern in patterns {
            if !lines.any(|line| line.contains(pattern)) {
                return Err(VerificationError::CommandNotFound {
                    pattern: pattern.to_string(),
                    actual: actual.clone(),
                });
            }
        }
        Ok(())
    }

    /// Verify how many commands contain `pattern`
    pub fn assert_count(&self, pattern: &str, expected: usize) -> VerifyResult<()> {
        let actual = self.runner.count(pattern);
        if actual == expected {
            Ok(())
        } else {
            Err(VerificationError::CommandCountMismatch {
                pattern: pattern.to_string(),
                expected,
                actual,
            })
        }
    }

    /// Verify that no command ran at all
    pub fn assert_none(&self) -> VerifyResult<()> {
        self.assert_commands(&[])
    }
}

/// Verifier for daemon cache and status rows
pub struct StateVerifier<'a> {
    daemon: Option<&'a ReconciliationDaemon>,
    store: Option<&'a MemoryStore>,
}

impl<'a> StateVerifier<'a> {
    pub fn new(daemon: &'a ReconciliationDaemon, store: &'a MemoryStore) -> Self {
        Self {
            daemon: Some(daemon),
            store: Some(store),
        }
    }

    /// Verifier for status rows only (the daemon is still running)
    pub fn for_store(store: &'a MemoryStore) -> Self {
        Self {
            daemon: None,
            store: Some(store),
        }
    }

    /// Verify the last-applied row for a key
    pub fn assert_applied(&self, table: &str, key: &str, expected: Option<&Row>) -> VerifyResult<()> {
        let actual = self.daemon.and_then(|d| d.applied().get(table, key));
        if actual.as_ref() == expected {
            Ok(())
        } else {
            Err(VerificationError::CacheMismatch {
                key: format!("{}|{}", table, key),
                expected: expected.cloned(),
                actual,
            })
        }
    }

    /// Verify the published status row for a key
    pub fn assert_status(&self, table: &str, key: &str, expected: Option<&Row>) -> VerifyResult<()> {
        let actual = self.store.and_then(|s| s.status(table, key));
        if actual.as_ref() == expected {
            Ok(())
        } else {
            Err(VerificationError::StatusMismatch {
                key: format!("{}|{}", table, key),
                expected: expected.cloned(),
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_reconcile_common::shell::CommandSpec;
    use sonic_reconcile_common::{row, CommandRunner, StatusSink};

    #[tokio::test]
    async fn test_command_verifier() {
        let runner = RecordingRunner::new();
        for verb in ["stop", "disable", "mask"] {
            runner
                .run(&CommandSpec::new(["systemctl", verb, "mux.service"]))
                .await
                .unwrap();
        }

        let verifier = CommandVerifier::new(&runner);
        verifier
            .assert_commands(&[
                "systemctl stop mux.service",
                "systemctl disable mux.service",
                "systemctl mask mux.service",
            ])
            .unwrap();
        verifier.assert_in_order(&["stop", "mask"]).unwrap();
        assert!(verifier.assert_in_order(&["mask", "stop"]).is_err());
        verifier.assert_count("mux.service", 3).unwrap();
        assert!(verifier.assert_none().is_err());
    }

    #[tokio::test]
    async fn test_status_verifier() {
        let store = MemoryStore::new();
        store
            .set_status("FEATURE", "mux", &row! { "state" => "enabled" })
            .await
            .unwrap();

        let verifier = StateVerifier::for_store(&store);
        verifier
            .assert_status("FEATURE", "mux", Some(&row! { "state" => "enabled" }))
            .unwrap();
        verifier.assert_status("FEATURE", "ntp", None).unwrap();
        assert!(verifier.assert_applied("FEATURE", "mux", None).is_ok());
    }
}
