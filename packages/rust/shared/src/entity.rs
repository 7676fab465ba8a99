//! Normalized entity kinds and their relational shape.
//!
//! Each [`EntityKind`] maps to exactly one destination table with a declared
//! (possibly composite) primary key. The storage writer uses the key for
//! conflict resolution; the cache uses [`EntityKind::table`] as the name of
//! the staging sequence.

/// Every destination table of the normalized dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Region,
    Subregion,
    District,
    Estate,
    EstateSchoolNet,
    Facility,
    EstateFacility,
    EstateMtrLine,
    Phase,
    Building,
    EstateMonthlyMarket,
    Unit,
    UnitFeature,
    Transaction,
}

impl EntityKind {
    /// All kinds, parents before children. Flushes run in this order.
    pub const ALL: [EntityKind; 14] = [
        EntityKind::Region,
        EntityKind::Subregion,
        EntityKind::District,
        EntityKind::Estate,
        EntityKind::EstateSchoolNet,
        EntityKind::Facility,
        EntityKind::EstateFacility,
        EntityKind::EstateMtrLine,
        EntityKind::Phase,
        EntityKind::Building,
        EntityKind::EstateMonthlyMarket,
        EntityKind::Unit,
        EntityKind::UnitFeature,
        EntityKind::Transaction,
    ];

    /// Destination table name.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Region => "regions",
            EntityKind::Subregion => "subregions",
            EntityKind::District => "districts",
            EntityKind::Estate => "estates",
            EntityKind::EstateSchoolNet => "estate_school_nets",
            EntityKind::Facility => "facilities",
            EntityKind::EstateFacility => "estate_facilities",
            EntityKind::EstateMtrLine => "estate_mtr_lines",
            EntityKind::Phase => "phases",
            EntityKind::Building => "buildings",
            EntityKind::EstateMonthlyMarket => "estate_monthly_market_info",
            EntityKind::Unit => "units",
            EntityKind::UnitFeature => "unit_features",
            EntityKind::Transaction => "transactions",
        }
    }

    /// Declared primary key columns.
    pub fn primary_key(self) -> &'static [&'static str] {
        match self {
            EntityKind::Region => &["region_id"],
            EntityKind::Subregion => &["subregion_id"],
            EntityKind::District => &["district_id"],
            EntityKind::Estate => &["estate_id"],
            EntityKind::EstateSchoolNet => &["estate_id", "school_net_id"],
            EntityKind::Facility => &["facility_id"],
            EntityKind::EstateFacility => &["estate_id", "facility_id"],
            EntityKind::EstateMtrLine => &["estate_id", "mtr_line_name_en"],
            EntityKind::Phase => &["phase_id"],
            EntityKind::Building => &["building_id"],
            EntityKind::EstateMonthlyMarket => &["estate_id", "record_date"],
            EntityKind::Unit => &["unit_id"],
            EntityKind::UnitFeature => &["unit_id", "feature_id"],
            EntityKind::Transaction => &["tx_id"],
        }
    }

    /// All columns, in the order mapping functions emit them.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            EntityKind::Region => &["region_id", "region_name_zh", "region_name_en"],
            EntityKind::Subregion => &[
                "subregion_id",
                "subregion_name_zh",
                "subregion_name_en",
                "region_id",
            ],
            EntityKind::District => &[
                "district_id",
                "district_name_zh",
                "district_name_en",
                "subregion_id",
            ],
            EntityKind::Estate => &[
                "estate_id",
                "estate_name_zh",
                "estate_name_en",
                "region_id",
                "subregion_id",
                "district_id",
                "address_zh",
                "address_en",
                "first_op_date",
                "last_op_date",
                "latitude",
                "longitude",
            ],
            EntityKind::EstateSchoolNet => &[
                "estate_id",
                "school_net_id",
                "school_net_name_zh",
                "school_net_name_en",
            ],
            EntityKind::Facility => &["facility_id", "facility_name_zh", "facility_name_en"],
            EntityKind::EstateFacility => &["estate_id", "facility_id"],
            EntityKind::EstateMtrLine => &["estate_id", "mtr_line_name_zh", "mtr_line_name_en"],
            EntityKind::Phase => &["phase_id", "phase_name_zh", "phase_name_en", "estate_id"],
            EntityKind::Building => &[
                "building_id",
                "building_name_zh",
                "building_name_en",
                "estate_id",
                "phase_id",
            ],
            EntityKind::EstateMonthlyMarket => &[
                "estate_id",
                "record_date",
                "avg_net_ft_price",
                "avg_net_ft_rent",
                "total_tx_count",
                "total_rent_tx_count",
                "total_tx_amount",
                "total_rent_tx_amount",
            ],
            EntityKind::Unit => &[
                "unit_id",
                "floor",
                "flat",
                "area",
                "net_area",
                "bedroom",
                "sitting_room",
                "building_id",
            ],
            EntityKind::UnitFeature => &[
                "unit_id",
                "feature_id",
                "feature_name_zh",
                "feature_name_en",
            ],
            EntityKind::Transaction => &[
                "tx_id",
                "tx_date",
                "price",
                "last_tx_date",
                "gain",
                "net_ft_price",
                "unit_id",
            ],
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}
