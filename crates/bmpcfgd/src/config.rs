//! bmpcfgd configuration file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use sonic_reconcile_common::config::{load_toml_or_default, save_toml};
use sonic_reconcile_common::{ReconcileConfig, ReconcileError, ReconcileResult};

use crate::constants::DEFAULT_BMP_UNIT;

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/bmpcfgd.toml";

/// `[bmpcfgd]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BmpcfgdSection {
    /// Unit restarted when the BMP selection changes
    #[serde(default = "default_bmp_unit")]
    pub bmp_unit: String,
}

/// Complete bmpcfgd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BmpcfgdConfig {
    #[serde(flatten)]
    pub common: ReconcileConfig,

    #[serde(default)]
    pub bmpcfgd: BmpcfgdSection,
}

fn default_bmp_unit() -> String {
    DEFAULT_BMP_UNIT.to_string()
}

impl Default for BmpcfgdSection {
    fn default() -> Self {
        Self {
            bmp_unit: default_bmp_unit(),
        }
    }
}

impl BmpcfgdConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> ReconcileResult<Self> {
        load_toml_or_default(path)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ReconcileResult<()> {
        save_toml(self, path)
    }

    pub fn validate(&self) -> ReconcileResult<()> {
        self.common.validate()?;
        if self.bmpcfgd.bmp_unit.trim().is_empty() {
            return Err(ReconcileError::config("bmpcfgd.bmp_unit", "must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = BmpcfgdConfig::load_or_default("/nonexistent/bmpcfgd.toml").unwrap();
        assert_eq!(config.bmpcfgd.bmp_unit, "bmp.service");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_unit_override() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[bmpcfgd]\nbmp_unit = \"openbmpd.service\"\n").unwrap();

        let config = BmpcfgdConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.bmpcfgd.bmp_unit, "openbmpd.service");
        assert_eq!(config.common.daemon.select_timeout_ms, 1000);
    }

    #[test]
    fn test_validate_empty_unit() {
        let mut config = BmpcfgdConfig::default();
        config.bmpcfgd.bmp_unit = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[bmpcfgd\nbmp_unit = 1").unwrap();
        assert!(BmpcfgdConfig::load_or_default(file.path()).is_err());
    }
}
