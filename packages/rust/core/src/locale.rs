//! Mappers for locale-specific aggregates.
//!
//! These resources are fetched once, in the canonical locale, and carry no
//! per-language columns.

use housing_crawler::models::{BuildingTransactions, IdName, MonthlyMarketResponse, UnitRecord};
use housing_shared::{EntityKind, ListingId, Row, Rows};

/// Monthly market statistics of one estate. Points without a date are skipped.
pub fn map_monthly_market(estate_id: &ListingId, response: &MonthlyMarketResponse) -> Rows {
    response
        .data
        .iter()
        .filter_map(|point| {
            let date = point.date.as_deref()?;
            Some(
                Row::new()
                    .with("estate_id", estate_id.as_str())
                    .with("record_date", date)
                    .with("avg_net_ft_price", point.net_ft_price)
                    .with("avg_net_ft_rent", point.rent_net_ft_price)
                    .with("total_tx_count", point.tx_count)
                    .with("total_rent_tx_count", point.rent_tx_count)
                    .with("total_tx_amount", point.tx_amount)
                    .with("total_rent_tx_amount", point.rent_tx_amount),
            )
        })
        .collect::<Vec<_>>()
        .into()
}

/// Units, transactions, and unit features of one building.
///
/// Room counts are the last non-null values across the unit's transactions
/// (a later transaction reflects any renovation); features come from the
/// last transaction. Units and transactions without an id are skipped.
pub fn map_building_transactions(response: &BuildingTransactions) -> Vec<(EntityKind, Rows)> {
    let mut units = Vec::new();
    let mut transactions = Vec::new();
    let mut features = Vec::new();

    for unit in &response.data {
        let Some(unit_id) = unit.unit_id.as_deref() else {
            continue;
        };
        let summary = summarize(unit);

        for tx in &unit.transactions {
            let Some(tx_id) = tx.id.as_deref() else {
                continue;
            };
            transactions.push(
                Row::new()
                    .with("tx_id", tx_id)
                    .with("tx_date", tx.tx_date.as_ref())
                    .with("price", tx.price)
                    .with("last_tx_date", tx.last_tx_date.as_ref())
                    .with("gain", tx.gain)
                    .with("net_ft_price", tx.net_ft_price)
                    .with("unit_id", unit_id),
            );
        }

        units.push(
            Row::new()
                .with("unit_id", unit_id)
                .with("floor", unit.floor.as_ref())
                .with("flat", unit.flat.as_ref())
                .with("area", unit.area)
                .with("net_area", unit.net_area)
                .with("bedroom", summary.bedroom)
                .with("sitting_room", summary.sitting_room)
                .with("building_id", response.building.id.as_str()),
        );

        // Feature ids are the English names.
        for feature in summary.features {
            let Some(feature_id) = feature.id.as_deref() else {
                continue;
            };
            features.push(
                Row::new()
                    .with("unit_id", unit_id)
                    .with("feature_id", feature_id)
                    .with("feature_name_zh", feature.name.as_ref())
                    .with("feature_name_en", feature_id),
            );
        }
    }

    vec![
        (EntityKind::Unit, units.into()),
        (EntityKind::Transaction, transactions.into()),
        (EntityKind::UnitFeature, features.into()),
    ]
}

struct UnitSummary<'a> {
    bedroom: Option<i64>,
    sitting_room: Option<i64>,
    features: &'a [IdName],
}

fn summarize(unit: &UnitRecord) -> UnitSummary<'_> {
    let mut summary = UnitSummary {
        bedroom: None,
        sitting_room: None,
        features: &[],
    };
    for tx in unit.transactions.iter().filter(|tx| tx.id.is_some()) {
        summary.bedroom = tx.bedroom.or(summary.bedroom);
        summary.sitting_room = tx.sitting_room.or(summary.sitting_room);
        summary.features = tx.feature.as_slice();
    }
    summary
}
