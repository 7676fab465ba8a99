//! Response shapes of the agency API.
//!
//! The API omits or nulls fields freely, so nearly everything is optional
//! and collections default to empty. Mapping code decides what a missing
//! value means.

use serde::{Deserialize, Deserializer};

/// Accept `null` wherever a list is expected.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Shared fragments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IdRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IdName {
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NameOnly {
    #[serde(default)]
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Listing enumeration
// ---------------------------------------------------------------------------

/// One page of the estate listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingPage {
    pub count: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub result: Vec<Option<IdRef>>,
}

// ---------------------------------------------------------------------------
// Estate detail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EstateName {
    #[serde(default)]
    pub chi: Option<String>,
    #[serde(default)]
    pub en: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchoolNet {
    #[serde(default)]
    pub primary: Option<IdName>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhaseEntry {
    #[serde(default)]
    pub is_phase: bool,
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub buildings: Vec<IdName>,
}

/// Detail of one estate as returned for a single locale.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EstateDetail {
    pub id: String,
    #[serde(default)]
    pub name: EstateName,
    #[serde(default)]
    pub region: Option<IdName>,
    #[serde(default)]
    pub subregion: Option<IdName>,
    #[serde(default)]
    pub district: Option<IdName>,
    #[serde(default)]
    pub mtr_line: Option<Vec<NameOnly>>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub first_op_date: Option<String>,
    #[serde(default)]
    pub last_op_date: Option<String>,
    #[serde(default, rename = "facilityGroup")]
    pub facility_group: Option<Vec<IdName>>,
    #[serde(default)]
    pub school_net: Option<SchoolNet>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub phase: Option<Vec<PhaseEntry>>,
}

// ---------------------------------------------------------------------------
// Secondary aggregates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MonthlyMarketResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<MonthlyMarketPoint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonthlyMarketPoint {
    pub date: Option<String>,
    #[serde(default)]
    pub net_ft_price: Option<f64>,
    #[serde(default)]
    pub rent_net_ft_price: Option<f64>,
    #[serde(default)]
    pub tx_count: Option<i64>,
    #[serde(default)]
    pub rent_tx_count: Option<i64>,
    #[serde(default)]
    pub tx_amount: Option<f64>,
    #[serde(default)]
    pub rent_tx_amount: Option<f64>,
}

/// All units of one building with their transaction history.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildingTransactions {
    pub building: IdRef,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<UnitRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnitRecord {
    pub unit_id: Option<String>,
    #[serde(default)]
    pub floor: Option<String>,
    #[serde(default)]
    pub flat: Option<String>,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub net_area: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub transactions: Vec<TransactionRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionRecord {
    pub id: Option<String>,
    #[serde(default)]
    pub tx_date: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub last_tx_date: Option<String>,
    #[serde(default)]
    pub gain: Option<f64>,
    #[serde(default)]
    pub net_ft_price: Option<f64>,
    #[serde(default)]
    pub bedroom: Option<i64>,
    #[serde(default)]
    pub sitting_room: Option<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub feature: Vec<IdName>,
}
