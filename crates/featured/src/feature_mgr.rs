//! FEATURE table policy.
//!
//! Turns FEATURE rows into systemd unit actions:
//!
//! - the first plan for a feature and every `auto_restart` change write
//!   `<unit>.d/auto_restart.conf` for every unit of the feature, followed
//!   by one `daemon-reload`
//! - an enabled feature is unmasked, enabled and started
//! - a disabled or deleted feature is stopped, disabled and masked

use std::path::{Path, PathBuf};

use tracing::debug;

use sonic_reconcile_common::{row, Action, Policy, PolicyError, Row, ServiceVerb};

use crate::constants::{AUTO_RESTART_CONF, STATE_FAILED};
use crate::fields;
use crate::types::{AutoRestart, Feature, FeatureScope};

const ENABLE_CHAIN: [ServiceVerb; 3] = [ServiceVerb::Unmask, ServiceVerb::Enable, ServiceVerb::Start];
const DISABLE_CHAIN: [ServiceVerb; 3] = [ServiceVerb::Stop, ServiceVerb::Disable, ServiceVerb::Mask];

/// Feature manager: the FEATURE table policy.
#[derive(Debug, Clone)]
pub struct FeatureMgr {
    systemd_dir: PathBuf,
    num_asics: usize,
}

impl FeatureMgr {
    pub fn new(systemd_dir: impl Into<PathBuf>, num_asics: usize) -> Self {
        Self {
            systemd_dir: systemd_dir.into(),
            num_asics,
        }
    }

    pub fn systemd_dir(&self) -> &Path {
        &self.systemd_dir
    }

    pub fn num_asics(&self) -> usize {
        self.num_asics
    }

    /// Path of a unit's `auto_restart.conf` drop-in.
    pub fn drop_in_path(&self, unit: &str) -> PathBuf {
        self.systemd_dir
            .join(format!("{}.d", unit))
            .join(AUTO_RESTART_CONF)
    }

    fn unit_chain(units: &[String], chain: &[ServiceVerb]) -> Vec<Action> {
        units
            .iter()
            .flat_map(|unit| chain.iter().map(|verb| Action::service(unit.clone(), *verb)))
            .collect()
    }

    fn plan_removed(&self, name: &str, old: &Row) -> Vec<Action> {
        if old.is_empty() {
            return Vec::new();
        }
        let units = FeatureScope::from_row(old).units(name, self.num_asics);
        Self::unit_chain(&units, &DISABLE_CHAIN)
    }

    fn plan_feature(&self, feature: &Feature, old: &Row) -> Vec<Action> {
        let units = feature.units(self.num_asics);
        let mut actions = Vec::new();

        // Nothing applied yet: the drop-in on disk is unknown, so write it.
        // An unparsable cached value cannot have been applied.
        let old_restart = AutoRestart::from_row(old).ok();
        if old.is_empty() || old_restart != Some(feature.auto_restart) {
            let content = feature.auto_restart.drop_in();
            actions.extend(
                units
                    .iter()
                    .map(|unit| Action::file(self.drop_in_path(unit), content.clone())),
            );
            actions.push(Action::DaemonReload);
        }

        let chain = if feature.state.is_enabled() {
            &ENABLE_CHAIN
        } else {
            &DISABLE_CHAIN
        };
        actions.extend(Self::unit_chain(&units, chain));
        actions
    }
}

impl Default for FeatureMgr {
    fn default() -> Self {
        Self::new(crate::constants::SYSTEMD_SYSTEM_DIR, 1)
    }
}

impl Policy for FeatureMgr {
    fn plan(
        &self,
        _table: &str,
        key: &str,
        old: &Row,
        new: &Row,
    ) -> Result<Vec<Action>, PolicyError> {
        if new.is_empty() {
            debug!(feature = %key, "Feature removed");
            return Ok(self.plan_removed(key, old));
        }

        let feature = Feature::from_row(key, new)?;
        debug!(feature = %key, state = %feature.state, "Planning feature");
        Ok(self.plan_feature(&feature, old))
    }

    fn status(&self, key: &str, new: &Row, applied: bool) -> Option<Row> {
        if !applied {
            return Some(row! { fields::STATE => STATE_FAILED });
        }
        let feature = Feature::from_row(key, new).ok()?;
        Some(row! { fields::STATE => feature.state.status_str() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mgr() -> FeatureMgr {
        FeatureMgr::new("/run/systemd", 1)
    }

    #[test]
    fn test_enable_new_feature() {
        let actions = mgr()
            .plan("FEATURE", "dhcp_relay", &Row::new(), &row! { "state" => "enabled" })
            .unwrap();
        assert_eq!(
            actions,
            vec![
                Action::file(
                    "/run/systemd/dhcp_relay.service.d/auto_restart.conf",
                    "[Service]\nRestart=no"
                ),
                Action::DaemonReload,
                Action::service("dhcp_relay.service", ServiceVerb::Unmask),
                Action::service("dhcp_relay.service", ServiceVerb::Enable),
                Action::service("dhcp_relay.service", ServiceVerb::Start),
            ]
        );
    }

    #[test]
    fn test_first_plan_writes_disabled_drop_in() {
        let actions = mgr()
            .plan(
                "FEATURE",
                "ntp",
                &Row::new(),
                &row! { "state" => "enabled", "auto_restart" => "disabled" },
            )
            .unwrap();
        assert_eq!(
            &actions[..2],
            &[
                Action::file(
                    "/run/systemd/ntp.service.d/auto_restart.conf",
                    "[Service]\nRestart=no"
                ),
                Action::DaemonReload,
            ]
        );
        assert_eq!(actions.len(), 5);
    }

    #[test]
    fn test_applied_feature_without_auto_restart_skips_drop_in() {
        let actions = mgr()
            .plan(
                "FEATURE",
                "dhcp_relay",
                &row! { "state" => "disabled" },
                &row! { "state" => "enabled" },
            )
            .unwrap();
        assert_eq!(
            actions,
            vec![
                Action::service("dhcp_relay.service", ServiceVerb::Unmask),
                Action::service("dhcp_relay.service", ServiceVerb::Enable),
                Action::service("dhcp_relay.service", ServiceVerb::Start),
            ]
        );
    }

    #[test]
    fn test_disable_feature() {
        let actions = mgr()
            .plan(
                "FEATURE",
                "dhcp_relay",
                &row! { "state" => "enabled" },
                &row! { "state" => "disabled" },
            )
            .unwrap();
        assert_eq!(
            actions,
            vec![
                Action::service("dhcp_relay.service", ServiceVerb::Stop),
                Action::service("dhcp_relay.service", ServiceVerb::Disable),
                Action::service("dhcp_relay.service", ServiceVerb::Mask),
            ]
        );
    }

    #[test]
    fn test_auto_restart_change_writes_drop_in() {
        let actions = mgr()
            .plan(
                "FEATURE",
                "telemetry",
                &row! { "state" => "enabled" },
                &row! { "state" => "enabled", "auto_restart" => "enabled" },
            )
            .unwrap();
        assert_eq!(
            actions[0],
            Action::file(
                "/run/systemd/telemetry.service.d/auto_restart.conf",
                "[Service]\nRestart=always"
            )
        );
        assert_eq!(actions[1], Action::DaemonReload);
        assert_eq!(actions.len(), 5);
    }

    #[test]
    fn test_auto_restart_unchanged_skips_drop_in() {
        let actions = mgr()
            .plan(
                "FEATURE",
                "telemetry",
                &row! { "state" => "disabled", "auto_restart" => "enabled" },
                &row! { "state" => "enabled", "auto_restart" => "always_enabled" },
            )
            .unwrap();
        assert!(actions
            .iter()
            .all(|a| matches!(a, Action::Service { .. })));
    }

    #[test]
    fn test_delete_feature_stops_units() {
        let mgr = FeatureMgr::new("/run/systemd", 2);
        let old = row! { "state" => "enabled", "has_per_asic_scope" => "True" };
        let actions = mgr.plan("FEATURE", "bgp", &old, &Row::new()).unwrap();
        assert_eq!(
            actions,
            vec![
                Action::service("bgp.service", ServiceVerb::Stop),
                Action::service("bgp.service", ServiceVerb::Disable),
                Action::service("bgp.service", ServiceVerb::Mask),
                Action::service("bgp@0.service", ServiceVerb::Stop),
                Action::service("bgp@0.service", ServiceVerb::Disable),
                Action::service("bgp@0.service", ServiceVerb::Mask),
                Action::service("bgp@1.service", ServiceVerb::Stop),
                Action::service("bgp@1.service", ServiceVerb::Disable),
                Action::service("bgp@1.service", ServiceVerb::Mask),
            ]
        );

        assert!(mgr.plan("FEATURE", "bgp", &Row::new(), &Row::new()).unwrap().is_empty());
    }

    #[test]
    fn test_multi_asic_drop_in_per_unit() {
        let mgr = FeatureMgr::new("/run/systemd", 2);
        let new = row! {
            "state" => "always_enabled",
            "auto_restart" => "enabled",
            "has_global_scope" => "False",
            "has_per_asic_scope" => "True",
        };
        let actions = mgr.plan("FEATURE", "swss", &Row::new(), &new).unwrap();
        assert_eq!(
            &actions[..3],
            &[
                Action::file(
                    "/run/systemd/swss@0.service.d/auto_restart.conf",
                    "[Service]\nRestart=always"
                ),
                Action::file(
                    "/run/systemd/swss@1.service.d/auto_restart.conf",
                    "[Service]\nRestart=always"
                ),
                Action::DaemonReload,
            ]
        );
        assert_eq!(actions.len(), 9);
    }

    #[test]
    fn test_invalid_state_rejected() {
        let err = mgr()
            .plan("FEATURE", "mux", &Row::new(), &row! { "state" => "{{ template }}" })
            .unwrap_err();
        assert!(err.message.contains("invalid feature state"));
    }

    #[test]
    fn test_status() {
        let mgr = mgr();
        assert_eq!(
            mgr.status("ntp", &row! { "state" => "always_enabled" }, true),
            Some(row! { "state" => "enabled" })
        );
        assert_eq!(
            mgr.status("ntp", &row! { "state" => "disabled" }, true),
            Some(row! { "state" => "disabled" })
        );
        assert_eq!(
            mgr.status("ntp", &row! { "state" => "enabled" }, false),
            Some(row! { "state" => "failed" })
        );
    }
}
