//! Per-partition staging area for rows awaiting a flush.
//!
//! Sequences are named (entity sequences by table name, plus carry-over
//! sequences such as [`BUILDING_IDS`]). Within one sequence no two rows are
//! value-identical; key uniqueness is left to storage.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use housing_shared::{EntityKind, FieldValue, Row, Rows};

/// Building ids harvested during the estate stage, consumed by the building
/// stage of the same partition.
pub const BUILDING_IDS: &str = "building_ids";

/// Named, ordered row sequences.
#[derive(Debug, Default)]
pub struct Cache {
    sequences: BTreeMap<String, Sequence>,
}

/// Rows in insertion order, indexed by fingerprint for dedup.
#[derive(Debug, Default)]
struct Sequence {
    rows: Vec<Row>,
    /// Fingerprint → positions in `rows` sharing it.
    index: HashMap<u64, Vec<usize>>,
}

impl Sequence {
    fn insert(&mut self, row: Row) -> bool {
        let positions = self.index.entry(fingerprint(&row)).or_default();
        if positions.iter().any(|&i| self.rows[i] == row) {
            return false;
        }
        positions.push(self.rows.len());
        self.rows.push(row);
        true
    }
}

/// Hash of column names and values. Equal rows hash equally; collisions
/// are resolved by comparing the rows themselves.
fn fingerprint(row: &Row) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (column, value) in row.columns().zip(row.values()) {
        column.hash(&mut hasher);
        match value {
            FieldValue::Null => 0u8.hash(&mut hasher),
            FieldValue::Integer(v) => {
                1u8.hash(&mut hasher);
                v.hash(&mut hasher);
            }
            FieldValue::Real(v) => {
                2u8.hash(&mut hasher);
                // 0.0 and -0.0 compare equal.
                let v = if *v == 0.0 { 0.0f64 } else { *v };
                v.to_bits().hash(&mut hasher);
            }
            FieldValue::Text(v) => {
                3u8.hash(&mut hasher);
                v.hash(&mut hasher);
            }
        }
    }
    hasher.finish()
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows not already present in `name`. Returns how many were added.
    pub fn append(&mut self, name: &str, rows: Rows) -> usize {
        if rows.is_empty() {
            return 0;
        }
        let sequence = self.sequences.entry(name.to_string()).or_default();
        let mut added = 0;
        for row in rows {
            if sequence.insert(row) {
                added += 1;
            }
        }
        added
    }

    /// Append rows to the sequence of an entity kind.
    pub fn append_entity(&mut self, kind: EntityKind, rows: Rows) -> usize {
        self.append(kind.table(), rows)
    }

    /// Rows staged under `name`, in insertion order.
    pub fn sequence(&self, name: &str) -> &[Row] {
        self.sequences
            .get(name)
            .map(|s| s.rows.as_slice())
            .unwrap_or(&[])
    }

    /// Number of rows staged under `name`.
    pub fn len(&self, name: &str) -> usize {
        self.sequence(name).len()
    }

    /// Whether no sequence holds any row.
    pub fn is_empty(&self) -> bool {
        self.sequences.values().all(|s| s.rows.is_empty())
    }

    /// Total rows across every sequence.
    pub fn total_rows(&self) -> usize {
        self.sequences.values().map(|s| s.rows.len()).sum()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sequences.keys().map(String::as_str)
    }

    /// Drop every sequence except those named in `exclude`.
    pub fn clear(&mut self, exclude: &[&str]) {
        self.sequences
            .retain(|name, _| exclude.iter().any(|keep| *keep == name.as_str()));
    }
}
