//! Type definitions for featured

use std::fmt;

use sonic_reconcile_common::{PolicyError, Row, RowExt};

use crate::constants::SERVICE_SUFFIX;
use crate::fields;

/// Configured `state` of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureState {
    Enabled,
    Disabled,
    AlwaysEnabled,
    AlwaysDisabled,
}

impl FeatureState {
    /// Parses a `state` value.
    ///
    /// Anything outside the four known values (an unrendered template,
    /// for instance) is rejected.
    pub fn parse(value: &str) -> Result<Self, PolicyError> {
        match value {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            "always_enabled" => Ok(Self::AlwaysEnabled),
            "always_disabled" => Ok(Self::AlwaysDisabled),
            other => Err(PolicyError::new(format!("invalid feature state '{}'", other))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled | Self::AlwaysEnabled)
    }

    /// Value published to STATE_DB once the units are in this state.
    pub fn status_str(&self) -> &'static str {
        if self.is_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    }
}

impl fmt::Display for FeatureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::AlwaysEnabled => "always_enabled",
            Self::AlwaysDisabled => "always_disabled",
        };
        write!(f, "{}", s)
    }
}

/// `auto_restart` setting, rendered into the unit's `Restart=` drop-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoRestart {
    Enabled,
    #[default]
    Disabled,
}

impl AutoRestart {
    /// Parses an `auto_restart` value; `always_enabled` counts as enabled.
    pub fn parse(value: &str) -> Result<Self, PolicyError> {
        if value.contains("enabled") {
            Ok(Self::Enabled)
        } else if value.contains("disabled") {
            Ok(Self::Disabled)
        } else {
            Err(PolicyError::new(format!("invalid auto_restart '{}'", value)))
        }
    }

    /// Reads the setting from a row, defaulting to disabled.
    pub fn from_row(row: &Row) -> Result<Self, PolicyError> {
        row.get_field(fields::AUTO_RESTART)
            .map(Self::parse)
            .unwrap_or(Ok(Self::Disabled))
    }

    /// Value of systemd's `Restart=` setting.
    pub fn restart_value(&self) -> &'static str {
        match self {
            Self::Enabled => "always",
            Self::Disabled => "no",
        }
    }

    /// Contents of the `auto_restart.conf` drop-in.
    pub fn drop_in(&self) -> String {
        format!("[Service]\nRestart={}", self.restart_value())
    }
}

/// Where a feature runs on a multi-ASIC device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureScope {
    pub has_global_scope: bool,
    pub has_per_asic_scope: bool,
}

impl Default for FeatureScope {
    fn default() -> Self {
        Self {
            has_global_scope: true,
            has_per_asic_scope: false,
        }
    }
}

impl FeatureScope {
    pub fn from_row(row: &Row) -> Self {
        let defaults = Self::default();
        Self {
            has_global_scope: row
                .get_bool(fields::HAS_GLOBAL_SCOPE)
                .unwrap_or(defaults.has_global_scope),
            has_per_asic_scope: row
                .get_bool(fields::HAS_PER_ASIC_SCOPE)
                .unwrap_or(defaults.has_per_asic_scope),
        }
    }

    /// Returns the systemd units of feature `name`.
    ///
    /// A single-ASIC device always runs the plain `<name>.service`.
    pub fn units(&self, name: &str, num_asics: usize) -> Vec<String> {
        if num_asics <= 1 {
            return vec![format!("{}{}", name, SERVICE_SUFFIX)];
        }

        let mut units = Vec::new();
        if self.has_global_scope {
            units.push(format!("{}{}", name, SERVICE_SUFFIX));
        }
        if self.has_per_asic_scope {
            units.extend((0..num_asics).map(|asic| format!("{}@{}{}", name, asic, SERVICE_SUFFIX)));
        }
        units
    }
}

/// One parsed FEATURE row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub name: String,
    pub state: FeatureState,
    pub auto_restart: AutoRestart,
    pub scope: FeatureScope,
}

impl Feature {
    /// Parses a non-empty FEATURE row.
    ///
    /// # Errors
    ///
    /// A missing or unknown `state`, or an unknown `auto_restart`.
    pub fn from_row(name: &str, row: &Row) -> Result<Self, PolicyError> {
        let state = row
            .get_field(fields::STATE)
            .ok_or_else(|| PolicyError::new("missing field 'state'"))
            .and_then(FeatureState::parse)?;

        Ok(Self {
            name: name.to_string(),
            state,
            auto_restart: AutoRestart::from_row(row)?,
            scope: FeatureScope::from_row(row),
        })
    }

    pub fn units(&self, num_asics: usize) -> Vec<String> {
        self.scope.units(&self.name, num_asics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_reconcile_common::row;

    #[test]
    fn test_feature_state_parse() {
        assert_eq!(FeatureState::parse("enabled").unwrap(), FeatureState::Enabled);
        assert_eq!(
            FeatureState::parse("always_disabled").unwrap(),
            FeatureState::AlwaysDisabled
        );
        assert!(FeatureState::AlwaysEnabled.is_enabled());
        assert!(!FeatureState::AlwaysDisabled.is_enabled());
        assert_eq!(FeatureState::AlwaysEnabled.status_str(), "enabled");

        let err = FeatureState::parse("{% if not DEVICE_RUNTIME_METADATA %}enabled{% endif %}");
        assert!(err.is_err());
    }

    #[test]
    fn test_auto_restart() {
        assert_eq!(AutoRestart::parse("always_enabled").unwrap(), AutoRestart::Enabled);
        assert_eq!(AutoRestart::parse("disabled").unwrap(), AutoRestart::Disabled);
        assert!(AutoRestart::parse("sometimes").is_err());

        assert_eq!(AutoRestart::from_row(&row!()).unwrap(), AutoRestart::Disabled);
        assert_eq!(AutoRestart::Enabled.drop_in(), "[Service]\nRestart=always");
        assert_eq!(AutoRestart::Disabled.drop_in(), "[Service]\nRestart=no");
    }

    #[test]
    fn test_feature_from_row() {
        let swss = Feature::from_row(
            "swss",
            &row! {
                "state" => "enabled",
                "auto_restart" => "enabled",
                "has_global_scope" => "False",
                "has_per_asic_scope" => "True",
            },
        )
        .unwrap();
        assert_eq!(swss.state, FeatureState::Enabled);
        assert_eq!(swss.auto_restart, AutoRestart::Enabled);
        assert!(!swss.scope.has_global_scope);
        assert!(swss.scope.has_per_asic_scope);

        let ntp = Feature::from_row("ntp", &row! { "state" => "disabled" }).unwrap();
        assert_eq!(ntp.auto_restart, AutoRestart::Disabled);
        assert_eq!(ntp.scope, FeatureScope::default());

        assert!(Feature::from_row("lldp", &row! { "auto_restart" => "enabled" }).is_err());
    }

    #[test]
    fn test_units_single_asic() {
        let scope = FeatureScope {
            has_global_scope: false,
            has_per_asic_scope: true,
        };
        assert_eq!(scope.units("bgp", 1), vec!["bgp.service"]);
    }

    #[test]
    fn test_units_multi_asic() {
        let scope = FeatureScope {
            has_global_scope: true,
            has_per_asic_scope: true,
        };
        assert_eq!(
            scope.units("bgp", 2),
            vec!["bgp.service", "bgp@0.service", "bgp@1.service"]
        );

        let global_only = FeatureScope::default();
        assert_eq!(global_only.units("snmp", 3), vec!["snmp.service"]);
    }
}
