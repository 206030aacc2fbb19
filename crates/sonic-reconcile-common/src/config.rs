//! Daemon configuration files.
//!
//! Shared `[store]`, `[daemon]` and `[executor]` sections loaded from TOML.
//! Daemon crates embed [`ReconcileConfig`] with `#[serde(flatten)]` and add
//! their own section; [`load_toml_or_default`] loads either shape.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ReconcileError, ReconcileResult};
use crate::shell::{IPTABLES_CMD, SYSTEMCTL_CMD};

/// Configuration store connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Redis database number for CONFIG_DB
    #[serde(default = "default_config_db_number")]
    pub config_db_number: u32,

    /// Redis database number for STATE_DB
    #[serde(default = "default_state_db_number")]
    pub state_db_number: u32,
}

/// Reconciliation loop tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Subscription poll timeout in milliseconds
    #[serde(default = "default_select_timeout_ms")]
    pub select_timeout_ms: u64,

    /// First retry delay after a failed load, in milliseconds
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Upper bound for the load retry delay, in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Periodic full resync interval in seconds (0 disables)
    #[serde(default)]
    pub resync_interval_secs: u64,
}

/// Action executor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Timeout for each external command, in seconds
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Maximum number of independent resource groups applied concurrently
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Arguments prepended to every command (e.g. `["/usr/bin/sudo"]`)
    #[serde(default)]
    pub command_prefix: Vec<String>,

    /// Path to systemctl
    #[serde(default = "default_systemctl_path")]
    pub systemctl_path: String,

    /// Path to iptables
    #[serde(default = "default_iptables_path")]
    pub iptables_path: String,
}

/// Shared configuration for reconciliation daemons
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,
}

// Default functions
fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_config_db_number() -> u32 {
    4
}

fn default_state_db_number() -> u32 {
    6
}

fn default_select_timeout_ms() -> u64 {
    1000
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_command_timeout_secs() -> u64 {
    60
}

fn default_max_parallel() -> usize {
    4
}

fn default_systemctl_path() -> String {
    SYSTEMCTL_CMD.to_string()
}

fn default_iptables_path() -> String {
    IPTABLES_CMD.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            config_db_number: default_config_db_number(),
            state_db_number: default_state_db_number(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            select_timeout_ms: default_select_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            resync_interval_secs: 0,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
            max_parallel: default_max_parallel(),
            command_prefix: Vec::new(),
            systemctl_path: default_systemctl_path(),
            iptables_path: default_iptables_path(),
        }
    }
}

impl StoreConfig {
    /// Returns `redis://host:port/` for the redis client.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }
}

impl DaemonConfig {
    /// Get poll timeout as Duration
    pub fn select_timeout(&self) -> Duration {
        Duration::from_millis(self.select_timeout_ms)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Periodic resync interval, `None` when disabled
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}

impl ExecutorConfig {
    /// Get command timeout as Duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl ReconcileConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> ReconcileResult<Self> {
        load_toml_or_default(path)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> ReconcileResult<()> {
        save_toml(self, path)
    }

    /// Validate configuration
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.store.redis_port == 0 {
            return Err(ReconcileError::config("store.redis_port", "must be > 0"));
        }
        if self.store.config_db_number == self.store.state_db_number {
            return Err(ReconcileError::config(
                "store.state_db_number",
                "must differ from config_db_number",
            ));
        }
        if self.daemon.select_timeout_ms == 0 {
            return Err(ReconcileError::config("daemon.select_timeout_ms", "must be > 0"));
        }
        if self.daemon.backoff_initial_ms == 0 {
            return Err(ReconcileError::config("daemon.backoff_initial_ms", "must be > 0"));
        }
        if self.daemon.backoff_max_ms < self.daemon.backoff_initial_ms {
            return Err(ReconcileError::config(
                "daemon.backoff_max_ms",
                "must be >= backoff_initial_ms",
            ));
        }
        if self.executor.command_timeout_secs == 0 {
            return Err(ReconcileError::config(
                "executor.command_timeout_secs",
                "must be > 0",
            ));
        }
        if self.executor.max_parallel == 0 {
            return Err(ReconcileError::config("executor.max_parallel", "must be > 0"));
        }
        if self.executor.systemctl_path.is_empty() {
            return Err(ReconcileError::config(
                "executor.systemctl_path",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

/// Loads a TOML configuration, falling back to `T::default()` if the file
/// does not exist.
pub fn load_toml_or_default<T>(path: impl AsRef<Path>) -> ReconcileResult<T>
where
    T: DeserializeOwned + Default,
{
    let path = path.as_ref();

    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).map_err(|e| {
            ReconcileError::config(
                path.display().to_string(),
                format!("failed to parse: {}", e),
            )
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(ReconcileError::Io {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

/// Writes a configuration as pretty TOML.
pub fn save_toml<T: Serialize>(config: &T, path: impl AsRef<Path>) -> ReconcileResult<()> {
    let path = path.as_ref();
    let content = toml::to_string_pretty(config)
        .map_err(|e| ReconcileError::config("serialize", e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ReconcileError::Io {
        path: path.display().to_string(),
        source: e,
    })
}
