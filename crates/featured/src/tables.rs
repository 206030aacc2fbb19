//! Table name constants for featured

/// CONFIG_DB FEATURE table
pub const CFG_FEATURE_TABLE_NAME: &str = "FEATURE";

/// STATE_DB FEATURE table
pub const STATE_FEATURE_TABLE_NAME: &str = "FEATURE";

/// Field names used in the FEATURE table
pub mod fields {
    pub const STATE: &str = "state";
    pub const AUTO_RESTART: &str = "auto_restart";
    pub const HAS_GLOBAL_SCOPE: &str = "has_global_scope";
    pub const HAS_PER_ASIC_SCOPE: &str = "has_per_asic_scope";
}

/// Special constants
pub mod constants {
    /// Directory holding per-unit drop-in directories
    pub const SYSTEMD_SYSTEM_DIR: &str = "/etc/systemd/system";

    /// Drop-in file carrying the unit's `Restart=` policy
    pub const AUTO_RESTART_CONF: &str = "auto_restart.conf";

    /// Suffix of systemd service units
    pub const SERVICE_SUFFIX: &str = ".service";

    /// STATE_DB `state` value when the unit actions failed
    pub const STATE_FAILED: &str = "failed";
}
