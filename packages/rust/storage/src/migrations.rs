//! SQL migration definitions for the housing datahub database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements. Entity tables keep every
//! non-key column nullable; the API omits fields freely.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: location hierarchy, estates, buildings, units, transactions",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Location hierarchy
CREATE TABLE IF NOT EXISTS regions (
    region_id      TEXT NOT NULL,
    region_name_zh TEXT,
    region_name_en TEXT,
    PRIMARY KEY (region_id)
);

CREATE TABLE IF NOT EXISTS subregions (
    subregion_id      TEXT NOT NULL,
    subregion_name_zh TEXT,
    subregion_name_en TEXT,
    region_id         TEXT,
    PRIMARY KEY (subregion_id)
);

CREATE TABLE IF NOT EXISTS districts (
    district_id      TEXT NOT NULL,
    district_name_zh TEXT,
    district_name_en TEXT,
    subregion_id     TEXT,
    PRIMARY KEY (district_id)
);

-- Estates and their bilingual satellites
CREATE TABLE IF NOT EXISTS estates (
    estate_id      TEXT NOT NULL,
    estate_name_zh TEXT,
    estate_name_en TEXT,
    region_id      TEXT,
    subregion_id   TEXT,
    district_id    TEXT,
    address_zh     TEXT,
    address_en     TEXT,
    first_op_date  TEXT,
    last_op_date   TEXT,
    latitude       REAL,
    longitude      REAL,
    PRIMARY KEY (estate_id)
);

CREATE TABLE IF NOT EXISTS estate_school_nets (
    estate_id          TEXT NOT NULL,
    school_net_id      TEXT NOT NULL,
    school_net_name_zh TEXT,
    school_net_name_en TEXT,
    PRIMARY KEY (estate_id, school_net_id)
);

CREATE TABLE IF NOT EXISTS facilities (
    facility_id      TEXT NOT NULL,
    facility_name_zh TEXT,
    facility_name_en TEXT,
    PRIMARY KEY (facility_id)
);

CREATE TABLE IF NOT EXISTS estate_facilities (
    estate_id   TEXT NOT NULL,
    facility_id TEXT NOT NULL,
    PRIMARY KEY (estate_id, facility_id)
);

CREATE TABLE IF NOT EXISTS estate_mtr_lines (
    estate_id        TEXT NOT NULL,
    mtr_line_name_zh TEXT,
    mtr_line_name_en TEXT NOT NULL,
    PRIMARY KEY (estate_id, mtr_line_name_en)
);

CREATE TABLE IF NOT EXISTS phases (
    phase_id      TEXT NOT NULL,
    phase_name_zh TEXT,
    phase_name_en TEXT,
    estate_id     TEXT,
    PRIMARY KEY (phase_id)
);

CREATE TABLE IF NOT EXISTS buildings (
    building_id      TEXT NOT NULL,
    building_name_zh TEXT,
    building_name_en TEXT,
    estate_id        TEXT,
    phase_id         TEXT,
    PRIMARY KEY (building_id)
);

-- Locale-specific aggregates
CREATE TABLE IF NOT EXISTS estate_monthly_market_info (
    estate_id            TEXT NOT NULL,
    record_date          TEXT NOT NULL,
    avg_net_ft_price     REAL,
    avg_net_ft_rent      REAL,
    total_tx_count       INTEGER,
    total_rent_tx_count  INTEGER,
    total_tx_amount      REAL,
    total_rent_tx_amount REAL,
    PRIMARY KEY (estate_id, record_date)
);

CREATE TABLE IF NOT EXISTS units (
    unit_id      TEXT NOT NULL,
    floor        TEXT,
    flat         TEXT,
    area         REAL,
    net_area     REAL,
    bedroom      INTEGER,
    sitting_room INTEGER,
    building_id  TEXT,
    PRIMARY KEY (unit_id)
);

CREATE TABLE IF NOT EXISTS unit_features (
    unit_id         TEXT NOT NULL,
    feature_id      TEXT NOT NULL,
    feature_name_zh TEXT,
    feature_name_en TEXT,
    PRIMARY KEY (unit_id, feature_id)
);

CREATE TABLE IF NOT EXISTS transactions (
    tx_id        TEXT NOT NULL,
    tx_date      TEXT,
    price        REAL,
    last_tx_date TEXT,
    gain         REAL,
    net_ft_price REAL,
    unit_id      TEXT,
    PRIMARY KEY (tx_id)
);

CREATE INDEX IF NOT EXISTS idx_buildings_estate ON buildings(estate_id);
CREATE INDEX IF NOT EXISTS idx_units_building ON units(building_id);
CREATE INDEX IF NOT EXISTS idx_transactions_unit ON transactions(unit_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Pipeline run ledger",
            sql: r#"
CREATE TABLE IF NOT EXISTS pipeline_runs (
    id           TEXT PRIMARY KEY,
    pipeline     TEXT NOT NULL,
    started_at   TEXT NOT NULL,
    finished_at  TEXT NOT NULL,
    partitions   INTEGER NOT NULL DEFAULT 0,
    rows_written INTEGER NOT NULL DEFAULT 0
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
