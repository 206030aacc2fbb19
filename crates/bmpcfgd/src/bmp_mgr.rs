//! BMP table policy.
//!
//! The BMP daemon reads its table selection only at startup, so any change
//! to `BMP|table` is applied by stopping and starting its unit.

use tracing::{debug, info};

use sonic_reconcile_common::{Action, Policy, PolicyError, Row, ServiceVerb};

use crate::constants::{BMP_TABLE_KEY, DEFAULT_BMP_UNIT};
use crate::types::BmpSelection;

/// BMP manager: the BMP table policy.
#[derive(Debug, Clone)]
pub struct BmpMgr {
    unit: String,
}

impl BmpMgr {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }
}

impl Default for BmpMgr {
    fn default() -> Self {
        Self::new(DEFAULT_BMP_UNIT)
    }
}

impl Policy for BmpMgr {
    fn plan(
        &self,
        _table: &str,
        key: &str,
        old: &Row,
        new: &Row,
    ) -> Result<Vec<Action>, PolicyError> {
        if key != BMP_TABLE_KEY {
            debug!(key = %key, "Ignoring BMP row");
            return Ok(Vec::new());
        }

        // A deleted row falls back to the all-false selection.
        let before = BmpSelection::from_row(old);
        let after = BmpSelection::from_row(new);
        if before == after {
            return Ok(Vec::new());
        }

        info!(unit = %self.unit, selection = %after, "BMP update, restarting bmp daemon");
        Ok(vec![
            Action::service(self.unit.clone(), ServiceVerb::Stop),
            Action::service(self.unit.clone(), ServiceVerb::Start),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_reconcile_common::row;

    fn all_false() -> Row {
        row! {
            "bgp_neighbor_table" => "false",
            "bgp_rib_in_table" => "false",
            "bgp_rib_out_table" => "false",
        }
    }

    fn restart() -> Vec<Action> {
        vec![
            Action::service("bmp.service", ServiceVerb::Stop),
            Action::service("bmp.service", ServiceVerb::Start),
        ]
    }

    #[test]
    fn test_neighbor_enable_restarts() {
        let mut new = all_false();
        new.insert("bgp_neighbor_table".to_string(), "true".to_string());
        let actions = BmpMgr::default().plan("BMP", "table", &all_false(), &new).unwrap();
        assert_eq!(actions, restart());
    }

    #[test]
    fn test_rib_in_and_rib_out_enable_restart() {
        let mgr = BmpMgr::default();
        for field in ["bgp_rib_in_table", "bgp_rib_out_table"] {
            let mut new = all_false();
            new.insert(field.to_string(), "true".to_string());
            assert_eq!(mgr.plan("BMP", "table", &all_false(), &new).unwrap(), restart());
        }
    }

    #[test]
    fn test_unchanged_selection_is_noop() {
        let mgr = BmpMgr::default();
        assert!(mgr
            .plan("BMP", "table", &all_false(), &all_false())
            .unwrap()
            .is_empty());
        // Same selection spelled differently.
        assert!(mgr
            .plan("BMP", "table", &Row::new(), &all_false())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_delete_restarts_with_defaults() {
        let old = row! { "bgp_rib_out_table" => "true" };
        let actions = BmpMgr::new("openbmpd.service")
            .plan("BMP", "table", &old, &Row::new())
            .unwrap();
        assert_eq!(
            actions,
            vec![
                Action::service("openbmpd.service", ServiceVerb::Stop),
                Action::service("openbmpd.service", ServiceVerb::Start),
            ]
        );
    }

    #[test]
    fn test_other_keys_ignored() {
        let new = row! { "bgp_neighbor_table" => "true" };
        assert!(BmpMgr::default()
            .plan("BMP", "global", &Row::new(), &new)
            .unwrap()
            .is_empty());
    }
}
