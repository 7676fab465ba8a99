//! Dense grid reconstruction and CSV serialization.

use crate::parser::{GridCell, TableNode};

/// Text still owed to the rows below a cell with `rowspan > 1`.
#[derive(Debug, Clone)]
struct PendingFill {
    remaining: usize,
    text: String,
}

/// Width of the dense grid: the widest row, counting colspans.
pub fn max_cols(table: &TableNode) -> usize {
    table
        .rows
        .iter()
        .map(|row| row.iter().map(|cell| cell.colspan).sum::<usize>())
        .max()
        .unwrap_or(0)
}

/// Rebuild a rectangular grid in which every spanned cell is duplicated
/// into each position it covers.
///
/// Every returned row has exactly [`max_cols`] entries. Positions left over
/// when a row runs out of source cells are empty strings; source cells that
/// do not fit are dropped. A span stops early at a column still occupied by
/// a rowspan from above.
pub fn reconstruct(table: &TableNode) -> Vec<Vec<String>> {
    let width = max_cols(table);
    if width == 0 {
        return Vec::new();
    }

    let mut pending: Vec<Option<PendingFill>> = vec![None; width];
    let mut grid = Vec::with_capacity(table.rows.len());

    for row in &table.rows {
        let mut dense = vec![String::new(); width];
        let mut cells = row.iter();
        let mut col = 0;

        while col < width {
            if let Some(fill) = pending[col].take() {
                dense[col] = fill.text.clone();
                if fill.remaining > 1 {
                    pending[col] = Some(PendingFill {
                        remaining: fill.remaining - 1,
                        text: fill.text,
                    });
                }
                col += 1;
                continue;
            }

            let Some(cell) = cells.next() else {
                col += 1;
                continue;
            };
            col = place(cell, col, width, &mut dense, &mut pending);
        }

        grid.push(dense);
    }

    grid
}

/// Write `cell` from `col` onward; returns the next free column.
fn place(
    cell: &GridCell,
    col: usize,
    width: usize,
    dense: &mut [String],
    pending: &mut [Option<PendingFill>],
) -> usize {
    let mut next = col;
    while next < width && next - col < cell.colspan {
        if next > col && pending[next].is_some() {
            break;
        }
        dense[next] = cell.text.clone();
        if cell.rowspan > 1 {
            pending[next] = Some(PendingFill {
                remaining: cell.rowspan - 1,
                text: cell.text.clone(),
            });
        }
        next += 1;
    }
    next
}

/// Serialize a dense grid as CSV: first row is the header, `\n` line ends,
/// fields quoted only when they contain a comma, quote, or line break.
pub fn to_csv(grid: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in grid {
        let line = row
            .iter()
            .map(|field| quote_field(field))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: Vec<Vec<GridCell>>) -> TableNode {
        TableNode { rows }
    }

    #[test]
    fn colspan_duplicates_across_columns() {
        let t = table(vec![
            vec![GridCell::new("A").with_colspan(2)],
            vec![GridCell::new("B"), GridCell::new("C")],
        ]);
        assert_eq!(reconstruct(&t), vec![vec!["A", "A"], vec!["B", "C"]]);
    }

    #[test]
    fn rowspan_duplicates_down_rows() {
        let t = table(vec![
            vec![GridCell::new("X").with_rowspan(2), GridCell::new("Y")],
            vec![GridCell::new("Z")],
        ]);
        assert_eq!(reconstruct(&t), vec![vec!["X", "Y"], vec!["X", "Z"]]);
    }

    #[test]
    fn three_row_span_in_middle_column() {
        let t = table(vec![
            vec![GridCell::new("a"), GridCell::new("M").with_rowspan(3), GridCell::new("b")],
            vec![GridCell::new("c"), GridCell::new("d")],
            vec![GridCell::new("e"), GridCell::new("f")],
            vec![GridCell::new("g"), GridCell::new("h"), GridCell::new("i")],
        ]);
        assert_eq!(
            reconstruct(&t),
            vec![
                vec!["a", "M", "b"],
                vec!["c", "M", "d"],
                vec!["e", "M", "f"],
                vec!["g", "h", "i"],
            ]
        );
    }

    #[test]
    fn combined_row_and_col_span() {
        let t = table(vec![
            vec![GridCell::new("H").with_colspan(2).with_rowspan(2), GridCell::new("1")],
            vec![GridCell::new("2")],
        ]);
        assert_eq!(reconstruct(&t), vec![vec!["H", "H", "1"], vec!["H", "H", "2"]]);
    }

    #[test]
    fn rows_are_always_rectangular() {
        let t = table(vec![
            vec![GridCell::new("a"), GridCell::new("b"), GridCell::new("c")],
            vec![GridCell::new("short")],
            vec![],
            vec![GridCell::new("w").with_colspan(5)],
        ]);
        let grid = reconstruct(&t);
        assert_eq!(max_cols(&t), 5);
        assert!(grid.iter().all(|row| row.len() == 5));
        assert_eq!(grid[1], vec!["short", "", "", "", ""]);
    }

    #[test]
    fn dangling_rowspan_is_ignored() {
        let t = table(vec![vec![GridCell::new("X").with_rowspan(4), GridCell::new("Y")]]);
        assert_eq!(reconstruct(&t), vec![vec!["X", "Y"]]);
    }

    #[test]
    fn empty_table_has_no_rows() {
        assert!(reconstruct(&TableNode::default()).is_empty());
    }

    #[test]
    fn csv_quotes_when_needed() {
        let grid = vec![
            vec!["名稱".to_string(), "備註".to_string()],
            vec!["A, B".to_string(), "say \"hi\"".to_string()],
        ];
        assert_eq!(to_csv(&grid), "名稱,備註\n\"A, B\",\"say \"\"hi\"\"\"\n");
    }
}
