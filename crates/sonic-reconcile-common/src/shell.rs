//! External command execution for reconciliation daemons.
//!
//! Commands are always passed as argument vectors and spawned directly,
//! never through `/bin/sh -c`, so configuration values cannot inject
//! shell syntax. Every invocation carries an explicit timeout; a command
//! that exceeds it is killed.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use sonic_reconcile_common::shell::{self, CommandSpec, SYSTEMCTL_CMD};
//!
//! let spec = CommandSpec::new([SYSTEMCTL_CMD, "restart", "ntp-config"])
//!     .with_timeout(Duration::from_secs(30));
//! let result = shell::exec(&spec).await?;
//! ```

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{ReconcileError, ReconcileResult};

/// Path to `systemctl` for service unit management.
pub const SYSTEMCTL_CMD: &str = "/bin/systemctl";

/// Path to `sudo`, used as a command prefix when the daemon is unprivileged.
pub const SUDO_CMD: &str = "/usr/bin/sudo";

/// Path to the `iptables` command for firewall rules.
pub const IPTABLES_CMD: &str = "/sbin/iptables";

/// Path to the SONiC `config` CLI.
pub const CONFIG_CMD: &str = "/usr/local/bin/config";

/// Default timeout applied when a spec does not set one.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// An external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    /// Bytes written to the child's stdin, if any.
    pub stdin: Option<Vec<u8>>,
    /// Maximum run time.
    pub timeout: Duration,
}

impl CommandSpec {
    /// Creates a spec from an argument vector with the default timeout.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            stdin: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the stdin payload.
    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Returns the command as a single display string (for logs only).
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// The exit code of the command (0 = success, -1 = killed by signal).
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Returns the first stderr line containing `Error`.
    ///
    /// Host modules surface this line to RPC callers as the failure message.
    pub fn error_line(&self) -> Option<&str> {
        first_error_line(&self.stderr)
    }
}

/// Returns the first line of `output` that contains the substring `Error`.
pub fn first_error_line(output: &str) -> Option<&str> {
    output.split('\n').find(|line| line.contains("Error"))
}

/// Executes a command with its timeout.
///
/// # Returns
///
/// * `Ok(ExecResult)` - The command ran to completion (any exit code)
/// * `Err(ReconcileError::CommandSpawn)` - The program could not be started
/// * `Err(ReconcileError::CommandTimeout)` - The timeout expired; the child was killed
pub async fn exec(spec: &CommandSpec) -> ReconcileResult<ExecResult> {
    let command_line = spec.display();
    let (program, args) = spec
        .argv
        .split_first()
        .ok_or_else(|| ReconcileError::internal("empty command argv"))?;

    tracing::debug!(command = %command_line, timeout = ?spec.timeout, "Executing command");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ReconcileError::CommandSpawn {
            command: command_line.clone(),
            source: e,
        })?;

    if let (Some(input), Some(mut stdin)) = (spec.stdin.as_ref(), child.stdin.take()) {
        stdin
            .write_all(input)
            .await
            .map_err(|e| ReconcileError::CommandSpawn {
                command: command_line.clone(),
                source: e,
            })?;
        // Closing stdin lets the child see EOF.
        drop(stdin);
    }

    // The child is killed when the wait future is dropped on timeout.
    let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| ReconcileError::CommandSpawn {
            command: command_line.clone(),
            source: e,
        })?,
        Err(_) => {
            tracing::warn!(command = %command_line, timeout = ?spec.timeout, "Command timed out");
            return Err(ReconcileError::CommandTimeout {
                command: command_line,
                timeout: spec.timeout,
            });
        }
    };

    let exit_code = output.status.code().unwrap_or(-1);
    let result = ExecResult {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if result.success() {
        tracing::trace!(command = %command_line, exit_code, "Command succeeded");
    } else {
        tracing::warn!(
            command = %command_line,
            exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a command and returns an error on non-zero exit.
pub async fn exec_or_throw(spec: &CommandSpec) -> ReconcileResult<String> {
    let result = exec(spec).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(ReconcileError::CommandFailed {
            command: spec.display(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_line() {
        let stderr = "Usage: config reload\nWarning: x\nError: Invalid JSON\nError: second";
        assert_eq!(first_error_line(stderr), Some("Error: Invalid JSON"));
    }

    #[test]
    fn test_first_error_line_substring_match() {
        assert_eq!(
            first_error_line("Traceback\nValueError: bad value"),
            Some("ValueError: bad value")
        );
        assert_eq!(first_error_line("error lowercase\nfatal"), None);
        assert_eq!(first_error_line(""), None);
    }

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new(["/bin/echo", "hello"])
            .with_timeout(Duration::from_secs(3))
            .with_stdin("payload");
        assert_eq!(spec.argv, vec!["/bin/echo", "hello"]);
        assert_eq!(spec.timeout, Duration::from_secs(3));
        assert_eq!(spec.stdin.as_deref(), Some(b"payload".as_slice()));
        assert_eq!(spec.display(), "/bin/echo hello");
    }

    #[test]
    fn test_exec_result_combined() {
        let result = ExecResult {
            exit_code: 1,
            stdout: "stdout".to_string(),
            stderr: "Error: stderr".to_string(),
        };
        assert!(!result.success());
        assert_eq!(result.combined_output(), "stdout\nError: stderr");
        assert_eq!(result.error_line(), Some("Error: stderr"));
    }

    #[tokio::test]
    async fn test_exec_echo() {
        let result = exec(&CommandSpec::new(["echo", "hello"])).await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "hello");
    }

    #[tokio::test]
    async fn test_exec_arguments_are_not_shell_interpreted() {
        let result = exec(&CommandSpec::new(["echo", "$HOME;", "`id`"]))
            .await
            .unwrap();
        assert_eq!(result.stdout, "$HOME; `id`");
    }

    #[tokio::test]
    async fn test_exec_stdin() {
        let spec = CommandSpec::new(["cat"]).with_stdin("from stdin\n");
        let result = exec(&spec).await.unwrap();
        assert_eq!(result.stdout, "from stdin");
    }

    #[tokio::test]
    async fn test_exec_timeout() {
        let spec = CommandSpec::new(["sleep", "5"]).with_timeout(Duration::from_millis(50));
        match exec(&spec).await {
            Err(ReconcileError::CommandTimeout { timeout, .. }) => {
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("Expected CommandTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exec_spawn_failure() {
        let result = exec(&CommandSpec::new(["/nonexistent/program"])).await;
        assert!(matches!(result, Err(ReconcileError::CommandSpawn { .. })));
    }

    #[tokio::test]
    async fn test_exec_or_throw_failure() {
        let result = exec_or_throw(&CommandSpec::new(["false"])).await;
        match result {
            Err(ReconcileError::CommandFailed { exit_code, .. }) => assert_eq!(exit_code, 1),
            other => panic!("Expected CommandFailed, got {:?}", other),
        }
    }
}
