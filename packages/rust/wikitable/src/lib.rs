//! Table extraction and dense-grid reconstruction for wiki markup.
//!
//! Tables are parsed into [`TableNode`]s of span-bearing [`GridCell`]s, then
//! rebuilt into rectangular grids with [`reconstruct`] and serialized as CSV.
//! [`plain_text`] turns the rest of a section into readable text.

mod cleanup;
mod grid;
mod parser;

use tracing::{debug, instrument};

pub use grid::{max_cols, reconstruct, to_csv};
pub use parser::{GridCell, TableNode, parse_tables, strip_tables};

/// Every table in `markup`, each serialized as CSV (header row first).
///
/// Tables that reconstruct to an empty grid are skipped. Never fails:
/// malformed markup degrades to fewer or emptier tables.
#[instrument(skip_all, fields(len = markup.len()))]
pub fn tables_to_csv(markup: &str) -> Vec<String> {
    let csv: Vec<String> = parse_tables(markup)
        .iter()
        .map(reconstruct)
        .filter(|grid| !grid.is_empty())
        .map(|grid| to_csv(&grid))
        .collect();
    debug!(tables = csv.len(), "tables reconstructed");
    csv
}

/// Readable text of a section: tables removed, markup stripped.
pub fn plain_text(wikitext: &str) -> String {
    cleanup::run_pipeline(&strip_tables(wikitext))
}
