//! Request handlers for the host service RPC surface.
//!
//! The transport (D-Bus) is external; this module provides what sits
//! behind it: a `(status, message)` reply type, a bounded worker pool with
//! cancellation, and the `config` and `systemd` modules that run host
//! commands on behalf of a caller.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::error::{ReconcileError, ReconcileResult};
use crate::executor::CommandRunner;
use crate::shell::{CommandSpec, ExecResult, CONFIG_CMD, DEFAULT_COMMAND_TIMEOUT};

/// Exit status returned for requests rejected before running anything.
pub const EXIT_FAILURE: i32 = 1;

/// Default config file written by `config save` without an argument.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/sonic/config_db.json";

/// Path to systemctl used by the systemd host module.
pub const HOST_SYSTEMCTL_CMD: &str = "/usr/bin/systemctl";

/// Services the systemd module may restart or stop.
pub const ALLOWED_SERVICES: &[&str] = &[
    "snmp",
    "swss",
    "dhcp_relay",
    "radv",
    "restapi",
    "lldp",
    "sshd",
    "pmon",
    "rsyslog",
    "telemetry",
];

/// `(status, message)` pair returned to RPC callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    /// Command exit code; 0 on success.
    pub status: i32,
    /// Empty on success, otherwise a human-readable reason.
    pub message: String,
}

impl CommandReply {
    pub fn ok() -> Self {
        Self {
            status: 0,
            message: String::new(),
        }
    }

    pub fn failure(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Builds a reply whose message is the first stderr line containing
    /// `Error` (empty if there is none or the command succeeded).
    pub fn from_exec(result: &ExecResult) -> Self {
        if result.success() {
            return Self::ok();
        }
        Self {
            status: result.exit_code,
            message: result.error_line().unwrap_or_default().to_string(),
        }
    }

    /// Builds a reply carrying the whole stderr on failure.
    pub fn from_exec_stderr(result: &ExecResult) -> Self {
        if result.success() {
            return Self::ok();
        }
        Self::failure(result.exit_code, result.stderr.clone())
    }

    /// Builds a failure reply from an execution error.
    pub fn from_error(err: &ReconcileError) -> Self {
        Self::failure(EXIT_FAILURE, err.to_string())
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// Bounded pool for request handlers.
///
/// At most `max_workers` requests run at once; further submissions wait
/// for a slot. After [`shutdown`](Self::shutdown) new submissions are
/// rejected and [`wait`](Self::wait) returns once in-flight work is done.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Runs `task` on the pool and waits for its result.
    ///
    /// # Errors
    ///
    /// `Internal` if the pool is shut down or the task panicked.
    pub async fn submit<F, T>(&self, task: F) -> ReconcileResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => permit
                .map_err(|_| ReconcileError::internal("worker pool closed"))?,
            _ = self.cancel.cancelled() => {
                return Err(ReconcileError::internal("worker pool shutting down"));
            }
        };
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::internal("worker pool shutting down"));
        }

        let handle = self.tracker.spawn(async move {
            let output = task.await;
            drop(permit);
            output
        });
        handle
            .await
            .map_err(|e| ReconcileError::internal(format!("worker task failed: {}", e)))
    }

    /// Rejects new submissions. In-flight tasks keep running.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
    }

    /// Waits for in-flight tasks after [`shutdown`](Self::shutdown).
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Number of free worker slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// The `config` host module: `config reload` / `config save`.
pub struct ConfigService {
    runner: Arc<dyn CommandRunner>,
    config_cmd: String,
    default_config_file: PathBuf,
    timeout: Duration,
}

impl ConfigService {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            config_cmd: CONFIG_CMD.to_string(),
            default_config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs `config reload -y`, feeding `config_db_json` on stdin when it
    /// is not blank.
    pub async fn reload(&self, config_db_json: &str) -> CommandReply {
        let mut argv = vec![self.config_cmd.clone(), "reload".into(), "-y".into()];
        let spec = if config_db_json.trim().is_empty() {
            CommandSpec::new(argv)
        } else {
            argv.push("/dev/stdin".into());
            CommandSpec::new(argv).with_stdin(format!("{}\n", config_db_json))
        };
        self.run("reload", spec).await
    }

    /// Runs `config save -y`, naming `config_file` unless it is empty or
    /// the default location.
    pub async fn save(&self, config_file: &str) -> CommandReply {
        let mut argv = vec![self.config_cmd.clone(), "save".into(), "-y".into()];
        if !config_file.is_empty() && PathBuf::from(config_file) != self.default_config_file {
            argv.push(config_file.to_string());
        }
        self.run("save", CommandSpec::new(argv)).await
    }

    async fn run(&self, action: &str, spec: CommandSpec) -> CommandReply {
        let spec = spec.with_timeout(self.timeout);
        let reply = match self.runner.run(&spec).await {
            Ok(result) => CommandReply::from_exec(&result),
            Err(e) => CommandReply::from_error(&e),
        };
        audit_reply("config", action, &reply);
        reply
    }
}

/// The `systemd` host module: restart or stop an allowed service.
pub struct SystemdService {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl SystemdService {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Rejects empty or unlisted services. `operation` names the rejected
    /// operation in the reply ("restart" or "management").
    fn check_allowed(service: &str, method: &str, operation: &str) -> Option<CommandReply> {
        if service.is_empty() {
            return Some(CommandReply::failure(
                EXIT_FAILURE,
                format!("Dbus {} called with no service specified", method),
            ));
        }
        if !ALLOWED_SERVICES.contains(&service) {
            return Some(CommandReply::failure(
                EXIT_FAILURE,
                format!("Dbus does not support {} service {}", service, operation),
            ));
        }
        None
    }

    async fn systemctl(&self, verb: &str, service: &str) -> ReconcileResult<ExecResult> {
        let spec = CommandSpec::new([HOST_SYSTEMCTL_CMD, verb, service]).with_timeout(self.timeout);
        self.runner.run(&spec).await
    }

    /// Clears the failed state of `service` and restarts it.
    ///
    /// A reset-failed error saying the unit was not in a failed state is
    /// expected and ignored.
    pub async fn restart_service(&self, service: &str) -> CommandReply {
        if let Some(rejected) = Self::check_allowed(service, "restart_service", "restart") {
            return rejected;
        }

        match self.systemctl("reset-failed", service).await {
            Ok(result)
                if !result.success()
                    && !result.stderr.contains("Failed to reset failed state") =>
            {
                let reply = CommandReply::from_exec_stderr(&result);
                audit_reply("systemd", "reset-failed", &reply);
                return reply;
            }
            Ok(_) => {}
            Err(e) => return CommandReply::from_error(&e),
        }

        let reply = match self.systemctl("restart", service).await {
            Ok(result) => CommandReply::from_exec_stderr(&result),
            Err(e) => CommandReply::from_error(&e),
        };
        audit_reply("systemd", "restart", &reply);
        reply
    }

    pub async fn stop_service(&self, service: &str) -> CommandReply {
        if let Some(rejected) = Self::check_allowed(service, "stop_service", "management") {
            return rejected;
        }
        let reply = match self.systemctl("stop", service).await {
            Ok(result) => CommandReply::from_exec_stderr(&result),
            Err(e) => CommandReply::from_error(&e),
        };
        audit_reply("systemd", "stop", &reply);
        reply
    }
}

fn audit_reply(module: &str, action: &str, reply: &CommandReply) {
    if reply.is_ok() {
        info!(module, action, "Host request succeeded");
    } else {
        warn!(module, action, status = reply.status, message = %reply.message, "Host request failed");
    }
    audit_log!({
        let record = AuditRecord::new(AuditCategory::AdminAction, module, action);
        if reply.is_ok() {
            record.with_outcome(AuditOutcome::Success)
        } else {
            record.with_error(format!("status {}: {}", reply.status, reply.message))
        }
    });
}
