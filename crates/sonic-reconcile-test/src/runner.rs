//! Recording command runner.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use sonic_reconcile_common::shell::{CommandSpec, ExecResult};
use sonic_reconcile_common::{CommandRunner, ReconcileError, ReconcileResult};

type Matcher = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Exit code reported for injected failures
pub const INJECTED_EXIT_CODE: i32 = 1;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Command runner that records every argv instead of executing it.
///
/// Commands matching a failure rule exit with [`INJECTED_EXIT_CODE`] and an
/// `Error:` line on stderr; commands matching a timeout rule report
/// `CommandTimeout`. Rules are checked in registration order.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Vec<String>>>,
    failures: Mutex<Vec<Matcher>>,
    timeouts: Mutex<Vec<Matcher>>,
}

impl std::fmt::Debug for RecordingRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingRunner")
            .field("calls", &lock(&self.calls).len())
            .finish()
    }
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every command for which `matcher` returns true.
    pub fn fail_when(&self, matcher: impl Fn(&[String]) -> bool + Send + Sync + 'static) {
        lock(&self.failures).push(Box::new(matcher));
    }

    /// Fails every command whose joined argv contains `needle`.
    pub fn fail_containing(&self, needle: impl Into<String>) {
        let needle = needle.into();
        self.fail_when(move |argv| argv.join(" ").contains(&needle));
    }

    /// Times out every command for which `matcher` returns true.
    pub fn time_out_when(&self, matcher: impl Fn(&[String]) -> bool + Send + Sync + 'static) {
        lock(&self.timeouts).push(Box::new(matcher));
    }

    /// Drops all failure and timeout rules.
    pub fn clear_rules(&self) {
        lock(&self.failures).clear();
        lock(&self.timeouts).clear();
    }

    /// Recorded argv lists, in execution order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }

    /// Recorded commands as space-joined strings.
    pub fn command_lines(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|argv| argv.join(" ")).collect()
    }

    /// Number of recorded commands containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> ReconcileResult<ExecResult> {
        lock(&self.calls).push(spec.argv.clone());
        tracing::debug!(command = %spec.display(), "Recorded command");

        if lock(&self.timeouts).iter().any(|m| m(&spec.argv)) {
            return Err(ReconcileError::CommandTimeout {
                command: spec.display(),
                timeout: spec.timeout,
            });
        }
        if lock(&self.failures).iter().any(|m| m(&spec.argv)) {
            return Ok(ExecResult {
                exit_code: INJECTED_EXIT_CODE,
                stdout: String::new(),
                stderr: format!("Error: injected failure for '{}'", spec.display()),
            });
        }
        Ok(ExecResult::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_injects() {
        let runner = RecordingRunner::new();
        runner.fail_containing("start");
        runner.time_out_when(|argv| argv.iter().any(|a| a == "restart"));

        let ok = runner
            .run(&CommandSpec::new(["systemctl", "stop", "ntp.service"]))
            .await
            .unwrap();
        assert!(ok.success());

        let failed = runner
            .run(&CommandSpec::new(["systemctl", "start", "ntp.service"]))
            .await
            .unwrap();
        assert_eq!(failed.exit_code, INJECTED_EXIT_CODE);
        assert!(failed.stderr.starts_with("Error:"));

        let timed_out = runner
            .run(&CommandSpec::new(["systemctl", "restart", "ntp.service"]))
            .await;
        assert!(matches!(timed_out, Err(ReconcileError::CommandTimeout { .. })));

        assert_eq!(runner.calls().len(), 3);
        // "restart" contains "start".
        assert_eq!(runner.count("start"), 2);

        runner.clear_rules();
        runner.clear();
        let ok = runner
            .run(&CommandSpec::new(["systemctl", "start", "ntp.service"]))
            .await
            .unwrap();
        assert!(ok.success());
        assert_eq!(runner.command_lines(), vec!["systemctl start ntp.service"]);
    }
}
