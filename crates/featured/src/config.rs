//! featured configuration file.
//!
//! ```toml
//! [store]
//! redis_host = "127.0.0.1"
//!
//! [executor]
//! command_prefix = ["/usr/bin/sudo"]
//!
//! [featured]
//! systemd_dir = "/etc/systemd/system"
//! num_asics = 1
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use sonic_reconcile_common::config::{load_toml_or_default, save_toml};
use sonic_reconcile_common::{ReconcileConfig, ReconcileError, ReconcileResult};

use crate::constants::SYSTEMD_SYSTEM_DIR;

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/featured.toml";

/// `[featured]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturedSection {
    /// Directory holding per-unit drop-in directories
    #[serde(default = "default_systemd_dir")]
    pub systemd_dir: PathBuf,

    /// Number of ASICs on the device (1 for single-ASIC)
    #[serde(default = "default_num_asics")]
    pub num_asics: usize,
}

/// Complete featured configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturedConfig {
    #[serde(flatten)]
    pub common: ReconcileConfig,

    #[serde(default)]
    pub featured: FeaturedSection,
}

fn default_systemd_dir() -> PathBuf {
    PathBuf::from(SYSTEMD_SYSTEM_DIR)
}

fn default_num_asics() -> usize {
    1
}

impl Default for FeaturedSection {
    fn default() -> Self {
        Self {
            systemd_dir: default_systemd_dir(),
            num_asics: default_num_asics(),
        }
    }
}

impl FeaturedConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> ReconcileResult<Self> {
        load_toml_or_default(path)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ReconcileResult<()> {
        save_toml(self, path)
    }

    pub fn validate(&self) -> ReconcileResult<()> {
        self.common.validate()?;
        if self.featured.num_asics == 0 {
            return Err(ReconcileError::config("featured.num_asics", "must be > 0"));
        }
        if !self.featured.systemd_dir.is_absolute() {
            return Err(ReconcileError::config(
                "featured.systemd_dir",
                "must be an absolute path",
            ));
        }
        Ok(())
    }
}
