//! Table name constants for bmpcfgd

/// CONFIG_DB BMP table
pub const CFG_BMP_TABLE_NAME: &str = "BMP";

/// Field names used in the BMP table
pub mod fields {
    pub const BGP_NEIGHBOR_TABLE: &str = "bgp_neighbor_table";
    pub const BGP_RIB_IN_TABLE: &str = "bgp_rib_in_table";
    pub const BGP_RIB_OUT_TABLE: &str = "bgp_rib_out_table";
}

/// Special constants
pub mod constants {
    /// The only BMP row key the daemon acts on
    pub const BMP_TABLE_KEY: &str = "table";

    /// Default BMP service unit
    pub const DEFAULT_BMP_UNIT: &str = "bmp.service";
}
