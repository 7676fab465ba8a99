//! Bilingual record merging.
//!
//! One estate is fetched under both locales and folded into normalized rows
//! by a fixed registry of pure mapping functions ([`BILINGUAL_MAPPINGS`]).
//! Locale-neutral fields always come from the canonical (`zh-hk`) response;
//! names and addresses come from the response of their own language.
//!
//! Nested lists are correlated either by position (MTR lines, phases) or by
//! embedded id (facilities, buildings). A pair that does not line up is
//! skipped, never patched from the other side, and a structure absent from
//! either response produces no rows at all.

use housing_crawler::AgencyApi;
use housing_crawler::models::{EstateDetail, IdName, PhaseEntry};
use housing_shared::{DatahubError, EntityKind, ListingId, Locale, Result, Row, Rows};
use tracing::debug;

use crate::cache::{BUILDING_IDS, Cache};

/// The same estate as answered in each locale.
#[derive(Debug, Clone)]
pub struct BilingualRecord {
    pub zh: EstateDetail,
    pub en: EstateDetail,
}

/// Fetch `id` under both locales.
///
/// Fails if either fetch fails or the two responses describe different
/// estates; no partial record is ever produced.
pub async fn fetch_bilingual(api: &AgencyApi, id: &ListingId) -> Result<BilingualRecord> {
    let zh = api.estate_detail(id, Locale::ZhHk).await?;
    let en = api.estate_detail(id, Locale::En).await?;

    if zh.id != en.id {
        return Err(DatahubError::validation(format!(
            "locale responses disagree for {id}: zh-hk {:?}, en {:?}",
            zh.id, en.id
        )));
    }
    Ok(BilingualRecord { zh, en })
}

// ---------------------------------------------------------------------------
// Mapping registry
// ---------------------------------------------------------------------------

/// Pure `(canonical, english) -> rows` transform for one entity kind.
pub type MapFn = fn(&EstateDetail, &EstateDetail) -> Rows;

/// One registered mapping.
#[derive(Clone, Copy)]
pub struct EntityMapping {
    pub kind: EntityKind,
    pub map: MapFn,
}

impl std::fmt::Debug for EntityMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMapping")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Every bilingual entity derived from an estate detail pair.
pub static BILINGUAL_MAPPINGS: &[EntityMapping] = &[
    EntityMapping { kind: EntityKind::Region, map: map_region },
    EntityMapping { kind: EntityKind::Subregion, map: map_subregion },
    EntityMapping { kind: EntityKind::District, map: map_district },
    EntityMapping { kind: EntityKind::Estate, map: map_estate },
    EntityMapping { kind: EntityKind::EstateSchoolNet, map: map_school_net },
    EntityMapping { kind: EntityKind::Facility, map: map_facilities },
    EntityMapping { kind: EntityKind::EstateFacility, map: map_estate_facilities },
    EntityMapping { kind: EntityKind::EstateMtrLine, map: map_mtr_lines },
    EntityMapping { kind: EntityKind::Phase, map: map_phases },
    EntityMapping { kind: EntityKind::Building, map: map_buildings },
];

/// Apply every registered mapping to `record` and stage the rows, including
/// the harvested building ids. Returns the number of rows added.
pub fn merge_into(record: &BilingualRecord, cache: &mut Cache) -> usize {
    let mut added = 0;
    for mapping in BILINGUAL_MAPPINGS {
        added += cache.append_entity(mapping.kind, (mapping.map)(&record.zh, &record.en));
    }
    let buildings = cache.append(BUILDING_IDS, harvest_building_ids(&record.zh, &record.en));
    debug!(estate_id = %record.zh.id, added, buildings, "record merged");
    added
}

// ---------------------------------------------------------------------------
// Estate and location hierarchy
// ---------------------------------------------------------------------------

pub fn map_estate(zh: &EstateDetail, en: &EstateDetail) -> Rows {
    Rows::One(
        Row::new()
            .with("estate_id", &zh.id)
            .with("estate_name_zh", zh.name.chi.as_ref())
            .with("estate_name_en", en.name.en.as_ref())
            .with("region_id", id_of(zh.region.as_ref()))
            .with("subregion_id", id_of(zh.subregion.as_ref()))
            .with("district_id", id_of(zh.district.as_ref()))
            .with("address_zh", zh.address.as_ref())
            .with("address_en", en.address.as_ref())
            .with("first_op_date", zh.first_op_date.as_ref())
            .with("last_op_date", zh.last_op_date.as_ref())
            .with("latitude", zh.latitude)
            .with("longitude", zh.longitude),
    )
}

pub fn map_region(zh: &EstateDetail, en: &EstateDetail) -> Rows {
    let Some((id, name_zh, name_en)) = pair_by_id(zh.region.as_ref(), en.region.as_ref()) else {
        return Rows::Empty;
    };
    Rows::One(
        Row::new()
            .with("region_id", id)
            .with("region_name_zh", name_zh)
            .with("region_name_en", name_en),
    )
}

pub fn map_subregion(zh: &EstateDetail, en: &EstateDetail) -> Rows {
    let Some((id, name_zh, name_en)) = pair_by_id(zh.subregion.as_ref(), en.subregion.as_ref())
    else {
        return Rows::Empty;
    };
    Rows::One(
        Row::new()
            .with("subregion_id", id)
            .with("subregion_name_zh", name_zh)
            .with("subregion_name_en", name_en)
            .with("region_id", id_of(zh.region.as_ref())),
    )
}

pub fn map_district(zh: &EstateDetail, en: &EstateDetail) -> Rows {
    let Some((id, name_zh, name_en)) = pair_by_id(zh.district.as_ref(), en.district.as_ref())
    else {
        return Rows::Empty;
    };
    Rows::One(
        Row::new()
            .with("district_id", id)
            .with("district_name_zh", name_zh)
            .with("district_name_en", name_en)
            .with("subregion_id", id_of(zh.subregion.as_ref())),
    )
}

pub fn map_school_net(zh: &EstateDetail, en: &EstateDetail) -> Rows {
    let zh_net = zh.school_net.as_ref().and_then(|s| s.primary.as_ref());
    let en_net = en.school_net.as_ref().and_then(|s| s.primary.as_ref());
    let Some((id, name_zh, name_en)) = pair_by_id(zh_net, en_net) else {
        return Rows::Empty;
    };
    Rows::One(
        Row::new()
            .with("estate_id", &zh.id)
            .with("school_net_id", id)
            .with("school_net_name_zh", name_zh)
            .with("school_net_name_en", name_en),
    )
}

// ---------------------------------------------------------------------------
// Facilities (correlated by id)
// ---------------------------------------------------------------------------

/// Facilities present in both locales, as `(id, zh, en)`.
fn correlated_facilities<'a>(
    zh: &'a EstateDetail,
    en: &'a EstateDetail,
) -> Vec<(&'a str, &'a IdName, &'a IdName)> {
    let (Some(zh_list), Some(en_list)) = (zh.facility_group.as_ref(), en.facility_group.as_ref())
    else {
        return Vec::new();
    };
    zh_list
        .iter()
        .filter_map(|zh_fac| {
            let id = zh_fac.id.as_deref()?;
            let en_fac = en_list.iter().find(|f| f.id.as_deref() == Some(id))?;
            Some((id, zh_fac, en_fac))
        })
        .collect()
}

pub fn map_facilities(zh: &EstateDetail, en: &EstateDetail) -> Rows {
    correlated_facilities(zh, en)
        .into_iter()
        .map(|(id, zh_fac, en_fac)| {
            Row::new()
                .with("facility_id", id)
                .with("facility_name_zh", zh_fac.name.as_ref())
                .with("facility_name_en", en_fac.name.as_ref())
        })
        .collect::<Vec<_>>()
        .into()
}

pub fn map_estate_facilities(zh: &EstateDetail, en: &EstateDetail) -> Rows {
    correlated_facilities(zh, en)
        .into_iter()
        .map(|(id, _, _)| Row::new().with("estate_id", &zh.id).with("facility_id", id))
        .collect::<Vec<_>>()
        .into()
}

// ---------------------------------------------------------------------------
// MTR lines and phases (correlated by position)
// ---------------------------------------------------------------------------

pub fn map_mtr_lines(zh: &EstateDetail, en: &EstateDetail) -> Rows {
    let (Some(zh_lines), Some(en_lines)) = (zh.mtr_line.as_ref(), en.mtr_line.as_ref()) else {
        return Rows::Empty;
    };
    zh_lines
        .iter()
        .zip(en_lines)
        .filter_map(|(zh_line, en_line)| {
            let name_zh = zh_line.name.as_deref()?;
            let name_en = en_line.name.as_deref()?;
            Some(
                Row::new()
                    .with("estate_id", &zh.id)
                    .with("mtr_line_name_zh", name_zh)
                    .with("mtr_line_name_en", name_en),
            )
        })
        .collect::<Vec<_>>()
        .into()
}

/// Phase entries at the same position that agree on id and kind.
fn correlated_phases<'a>(
    zh: &'a EstateDetail,
    en: &'a EstateDetail,
) -> Vec<(&'a PhaseEntry, &'a PhaseEntry)> {
    let (Some(zh_phases), Some(en_phases)) = (zh.phase.as_ref(), en.phase.as_ref()) else {
        return Vec::new();
    };
    zh_phases
        .iter()
        .zip(en_phases)
        .filter(|(z, e)| z.id == e.id && z.is_phase == e.is_phase)
        .collect()
}

pub fn map_phases(zh: &EstateDetail, en: &EstateDetail) -> Rows {
    correlated_phases(zh, en)
        .into_iter()
        .filter(|(z, _)| z.is_phase)
        .filter_map(|(z, e)| {
            let id = z.id.as_deref()?;
            Some(
                Row::new()
                    .with("phase_id", id)
                    .with("phase_name_zh", z.name.as_ref())
                    .with("phase_name_en", e.name.as_ref())
                    .with("estate_id", &zh.id),
            )
        })
        .collect::<Vec<_>>()
        .into()
}

// ---------------------------------------------------------------------------
// Buildings (phase by position, building by id)
// ---------------------------------------------------------------------------

struct BuildingPair<'a> {
    id: &'a str,
    phase: &'a PhaseEntry,
    zh: &'a IdName,
    en: &'a IdName,
}

fn correlated_buildings<'a>(zh: &'a EstateDetail, en: &'a EstateDetail) -> Vec<BuildingPair<'a>> {
    let mut pairs = Vec::new();
    for (zh_phase, en_phase) in correlated_phases(zh, en) {
        for zh_building in &zh_phase.buildings {
            let Some(id) = zh_building.id.as_deref() else {
                continue;
            };
            if let Some(en_building) = en_phase
                .buildings
                .iter()
                .find(|b| b.id.as_deref() == Some(id))
            {
                pairs.push(BuildingPair {
                    id,
                    phase: zh_phase,
                    zh: zh_building,
                    en: en_building,
                });
            }
        }
    }
    pairs
}

pub fn map_buildings(zh: &EstateDetail, en: &EstateDetail) -> Rows {
    correlated_buildings(zh, en)
        .into_iter()
        .map(|pair| {
            let phase_id = pair.phase.is_phase.then_some(pair.phase.id.as_ref()).flatten();
            Row::new()
                .with("building_id", pair.id)
                .with("building_name_zh", pair.zh.name.as_ref())
                .with("building_name_en", pair.en.name.as_ref())
                .with("estate_id", &zh.id)
                .with("phase_id", phase_id)
        })
        .collect::<Vec<_>>()
        .into()
}

/// Building ids for the secondary transaction stage.
pub fn harvest_building_ids(zh: &EstateDetail, en: &EstateDetail) -> Rows {
    correlated_buildings(zh, en)
        .into_iter()
        .map(|pair| Row::new().with("building_id", pair.id))
        .collect::<Vec<_>>()
        .into()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn id_of(item: Option<&IdName>) -> Option<&String> {
    item.and_then(|i| i.id.as_ref())
}

/// `(id, zh name, en name)` when both sides exist and carry the same id.
fn pair_by_id<'a>(
    zh: Option<&'a IdName>,
    en: Option<&'a IdName>,
) -> Option<(&'a str, Option<&'a String>, Option<&'a String>)> {
    let (zh, en) = (zh?, en?);
    let id = zh.id.as_deref()?;
    if en.id.as_deref() != Some(id) {
        return None;
    }
    Some((id, zh.name.as_ref(), en.name.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use housing_shared::FieldValue;

    fn detail(json: &str) -> EstateDetail {
        serde_json::from_str(json).expect("valid estate detail")
    }

    fn zh_detail() -> EstateDetail {
        detail(
            r#"{
            "id": "E1",
            "name": {"chi": "太古城", "en": "Taikoo Shing"},
            "region": {"id": "R1", "name": "港島"},
            "subregion": {"id": "S1", "name": "東區"},
            "district": {"id": "D1", "name": "太古"},
            "address": "太古城道",
            "first_op_date": "1977-01-01",
            "latitude": 22.2866,
            "longitude": 114.2166,
            "mtr_line": [{"name": "港島綫"}, {"name": "將軍澳綫"}],
            "facilityGroup": [{"id": "F1", "name": "泳池"}, {"id": "F2", "name": "會所"}],
            "school_net": {"primary": {"id": "14", "name": "14校網"}},
            "phase": [
                {"is_phase": true, "id": "P1", "name": "一期",
                 "buildings": [{"id": "B1", "name": "第1座"}, {"id": "B2", "name": "第2座"}]},
                {"is_phase": false, "id": null, "name": null,
                 "buildings": [{"id": "B9", "name": "商場"}]}
            ]
        }"#,
        )
    }

    fn en_detail() -> EstateDetail {
        detail(
            r#"{
            "id": "E1",
            "name": {"chi": "太古城", "en": "Taikoo Shing"},
            "region": {"id": "R1", "name": "HK Island"},
            "subregion": {"id": "S1", "name": "Eastern"},
            "district": {"id": "D1", "name": "Tai Koo"},
            "address": "Taikoo Shing Road",
            "first_op_date": "1977-02-02",
            "latitude": 0.0,
            "mtr_line": [{"name": "Island Line"}, {"name": null}],
            "facilityGroup": [{"id": "F2", "name": "Clubhouse"}],
            "school_net": {"primary": {"id": "14", "name": "School Net 14"}},
            "phase": [
                {"is_phase": true, "id": "P1", "name": "Phase 1",
                 "buildings": [{"id": "B2", "name": "Block 2"}, {"id": "B1", "name": "Block 1"}]},
                {"is_phase": false, "id": null, "name": null,
                 "buildings": [{"id": "B9", "name": "Mall"}]}
            ]
        }"#,
        )
    }

    fn text<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
        row.get(column).and_then(FieldValue::as_text)
    }

    #[test]
    fn estate_takes_neutral_fields_from_canonical_locale() {
        let rows = map_estate(&zh_detail(), &en_detail()).into_vec();
        let row = &rows[0];
        assert_eq!(text(row, "estate_name_zh"), Some("太古城"));
        assert_eq!(text(row, "estate_name_en"), Some("Taikoo Shing"));
        assert_eq!(text(row, "address_en"), Some("Taikoo Shing Road"));
        assert_eq!(text(row, "first_op_date"), Some("1977-01-01"));
        assert_eq!(row.get("latitude"), Some(&FieldValue::Real(22.2866)));
        assert!(row.get("last_op_date").is_some_and(FieldValue::is_null));
        assert_eq!(
            row.columns().collect::<Vec<_>>(),
            EntityKind::Estate.columns()
        );
    }

    #[test]
    fn hierarchy_rows_are_bilingual() {
        let region = map_region(&zh_detail(), &en_detail()).into_vec();
        assert_eq!(text(&region[0], "region_name_zh"), Some("港島"));
        assert_eq!(text(&region[0], "region_name_en"), Some("HK Island"));

        let district = map_district(&zh_detail(), &en_detail()).into_vec();
        assert_eq!(text(&district[0], "subregion_id"), Some("S1"));
    }

    #[test]
    fn mismatched_ids_yield_nothing() {
        let mut en = en_detail();
        en.region = Some(IdName { id: Some("R2".into()), name: Some("Kowloon".into()) });
        assert_eq!(map_region(&zh_detail(), &en), Rows::Empty);
    }

    #[test]
    fn structure_missing_in_one_locale_yields_nothing() {
        let mut en = en_detail();
        en.school_net = None;
        en.mtr_line = None;
        en.phase = None;
        assert_eq!(map_school_net(&zh_detail(), &en), Rows::Empty);
        assert_eq!(map_mtr_lines(&zh_detail(), &en), Rows::Empty);
        assert_eq!(map_buildings(&zh_detail(), &en), Rows::Empty);
        assert_eq!(harvest_building_ids(&zh_detail(), &en), Rows::Empty);
    }

    #[test]
    fn facilities_correlate_by_id() {
        let rows = map_facilities(&zh_detail(), &en_detail()).into_vec();
        assert_eq!(rows.len(), 1);
        assert_eq!(text(&rows[0], "facility_id"), Some("F2"));
        assert_eq!(text(&rows[0], "facility_name_zh"), Some("會所"));
        assert_eq!(text(&rows[0], "facility_name_en"), Some("Clubhouse"));

        let links = map_estate_facilities(&zh_detail(), &en_detail());
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn mtr_lines_pair_by_position_and_skip_gaps() {
        let rows = map_mtr_lines(&zh_detail(), &en_detail()).into_vec();
        assert_eq!(rows.len(), 1);
        assert_eq!(text(&rows[0], "mtr_line_name_zh"), Some("港島綫"));
        assert_eq!(text(&rows[0], "mtr_line_name_en"), Some("Island Line"));
    }

    #[test]
    fn phases_only_for_real_phases() {
        let rows = map_phases(&zh_detail(), &en_detail()).into_vec();
        assert_eq!(rows.len(), 1);
        assert_eq!(text(&rows[0], "phase_name_en"), Some("Phase 1"));
    }

    #[test]
    fn buildings_pair_by_id_within_phase() {
        let rows = map_buildings(&zh_detail(), &en_detail()).into_vec();
        assert_eq!(rows.len(), 3);
        assert_eq!(text(&rows[0], "building_id"), Some("B1"));
        assert_eq!(text(&rows[0], "building_name_en"), Some("Block 1"));
        assert_eq!(text(&rows[0], "phase_id"), Some("P1"));
        let mall = &rows[2];
        assert_eq!(text(mall, "building_name_en"), Some("Mall"));
        assert!(mall.get("phase_id").is_some_and(FieldValue::is_null));
    }

    #[test]
    fn misaligned_phase_skips_its_buildings() {
        let mut en = en_detail();
        if let Some(phases) = en.phase.as_mut() {
            phases[0].id = Some("P9".into());
        }
        let ids: Vec<_> = harvest_building_ids(&zh_detail(), &en)
            .into_iter()
            .filter_map(|r| r.get("building_id").and_then(FieldValue::as_text).map(str::to_string))
            .collect();
        assert_eq!(ids, ["B9"]);
    }

    #[test]
    fn every_mapping_emits_its_declared_columns() {
        let (zh, en) = (zh_detail(), en_detail());
        for mapping in BILINGUAL_MAPPINGS {
            for row in (mapping.map)(&zh, &en) {
                assert_eq!(
                    row.columns().collect::<Vec<_>>(),
                    mapping.kind.columns(),
                    "{}",
                    mapping.kind
                );
            }
        }
    }

    #[test]
    fn merging_twice_adds_nothing_new() {
        let record = BilingualRecord { zh: zh_detail(), en: en_detail() };
        let mut cache = Cache::new();
        let first = merge_into(&record, &mut cache);
        assert!(first > 0);
        assert_eq!(merge_into(&record, &mut cache), 0);
        assert_eq!(cache.len(BUILDING_IDS), 3);
    }
}
