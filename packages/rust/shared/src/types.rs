//! Core domain types: listing identifiers, locales, and normalized rows.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ListingId
// ---------------------------------------------------------------------------

/// Opaque identifier of one listing (estate), as issued by the agency API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub String);

impl ListingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ListingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Locale
// ---------------------------------------------------------------------------

/// Languages the agency API can answer in.
///
/// [`Locale::CANONICAL`] is the single source of locale-neutral fields
/// (ids, coordinates, dates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locale {
    #[serde(rename = "zh-hk")]
    ZhHk,
    #[serde(rename = "en")]
    En,
}

impl Locale {
    /// Locale whose response supplies every neutral field.
    pub const CANONICAL: Locale = Locale::ZhHk;

    /// Both locales, canonical first.
    pub const BOTH: [Locale; 2] = [Locale::ZhHk, Locale::En];

    /// Value of the API's `lang` query parameter.
    pub fn wire_code(self) -> &'static str {
        match self {
            Locale::ZhHk => "zh-hk",
            Locale::En => "en",
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_code())
    }
}

// ---------------------------------------------------------------------------
// FieldValue / Row
// ---------------------------------------------------------------------------

/// A single scalar cell of a normalized row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&String> for FieldValue {
    fn from(s: &String) -> Self {
        FieldValue::Text(s.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Real(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// One normalized entity row: an ordered column → scalar mapping.
///
/// Two rows are value-identical when they carry the same columns in the
/// same order with equal values. Mapping functions always emit columns in
/// a fixed order, so derived `PartialEq` is exactly that comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, FieldValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column (builder style).
    pub fn with(mut self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.columns.push((column.to_string(), value.into()));
        self
    }

    /// Look up a column by name.
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Column names, in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Values, in column order.
    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.columns.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Output of one entity mapping: nothing, a single row, or several rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Rows {
    #[default]
    Empty,
    One(Row),
    Many(Vec<Row>),
}

impl Rows {
    pub fn len(&self) -> usize {
        match self {
            Rows::Empty => 0,
            Rows::One(_) => 1,
            Rows::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<Row> {
        match self {
            Rows::Empty => Vec::new(),
            Rows::One(row) => vec![row],
            Rows::Many(rows) => rows,
        }
    }
}

impl From<Vec<Row>> for Rows {
    fn from(mut rows: Vec<Row>) -> Self {
        match rows.len() {
            0 => Rows::Empty,
            1 => Rows::One(rows.remove(0)),
            _ => Rows::Many(rows),
        }
    }
}

impl From<Option<Row>> for Rows {
    fn from(row: Option<Row>) -> Self {
        row.map_or(Rows::Empty, Rows::One)
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}
