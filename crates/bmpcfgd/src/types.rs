//! Type definitions for bmpcfgd

use std::fmt;

use sonic_reconcile_common::{Row, RowExt};

use crate::fields;

/// Which BGP tables the BMP daemon exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BmpSelection {
    pub bgp_neighbor_table: bool,
    pub bgp_rib_in_table: bool,
    pub bgp_rib_out_table: bool,
}

impl BmpSelection {
    /// Reads the selection from a BMP row; missing fields are false.
    pub fn from_row(row: &Row) -> Self {
        Self {
            bgp_neighbor_table: row.get_bool(fields::BGP_NEIGHBOR_TABLE).unwrap_or(false),
            bgp_rib_in_table: row.get_bool(fields::BGP_RIB_IN_TABLE).unwrap_or(false),
            bgp_rib_out_table: row.get_bool(fields::BGP_RIB_OUT_TABLE).unwrap_or(false),
        }
    }

    pub fn any_enabled(&self) -> bool {
        self.bgp_neighbor_table || self.bgp_rib_in_table || self.bgp_rib_out_table
    }
}

impl fmt::Display for BmpSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "neighbor={}, rib_in={}, rib_out={}",
            self.bgp_neighbor_table, self.bgp_rib_in_table, self.bgp_rib_out_table
        )
    }
}
