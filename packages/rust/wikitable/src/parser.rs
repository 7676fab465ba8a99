//! Table extraction from wiki markup.
//!
//! Two table syntaxes are recognized: wikitext (`{|`, `|-`, `|`/`||`,
//! `!`/`!!`, `|}`) and HTML (`<table>`, `<tr>`, `<td>`, `<th>`). Tables nested
//! inside a cell are returned as separate tables and contribute no text to
//! the enclosing cell.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::cleanup;

/// Upper bounds on span attributes, as in HTML.
const MAX_COLSPAN: usize = 1000;
const MAX_ROWSPAN: usize = 65534;

/// One source cell of a table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCell {
    pub text: String,
    /// Always at least 1.
    pub colspan: usize,
    /// Always at least 1.
    pub rowspan: usize,
}

impl GridCell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            colspan: 1,
            rowspan: 1,
        }
    }

    pub fn with_colspan(mut self, colspan: usize) -> Self {
        self.colspan = colspan.clamp(1, MAX_COLSPAN);
        self
    }

    pub fn with_rowspan(mut self, rowspan: usize) -> Self {
        self.rowspan = rowspan.clamp(1, MAX_ROWSPAN);
        self
    }
}

/// One table: its rows of source cells, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableNode {
    pub rows: Vec<Vec<GridCell>>,
}

/// Collect every table in `markup`.
///
/// Wikitext tables come first, ordered by where they open; HTML tables
/// follow in document order. Tables without any cell are dropped.
pub fn parse_tables(markup: &str) -> Vec<TableNode> {
    let mut tables = parse_wikitext_tables(markup);
    if contains_html_table(markup) {
        tables.extend(parse_html_tables(markup));
    }
    tables
}

/// Remove every table from `markup`, leaving the surrounding text.
pub fn strip_tables(markup: &str) -> String {
    let mut kept = Vec::new();
    let mut depth = 0usize;
    for line in markup.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("{|") {
            depth += 1;
            continue;
        }
        if depth > 0 {
            if trimmed.starts_with("|}") {
                depth -= 1;
            }
            continue;
        }
        kept.push(line);
    }
    let text = kept.join("\n");
    if contains_html_table(&text) {
        strip_html_tables(&text)
    } else {
        text
    }
}

// ---------------------------------------------------------------------------
// Wikitext tables
// ---------------------------------------------------------------------------

struct OpenTable {
    order: usize,
    rows: Vec<Vec<GridCell>>,
    row: Vec<GridCell>,
    /// Raw text of the cell continuation lines attach to.
    open_cell: Option<(String, String)>,
}

impl OpenTable {
    fn new(order: usize) -> Self {
        Self {
            order,
            rows: Vec::new(),
            row: Vec::new(),
            open_cell: None,
        }
    }

    fn close_cell(&mut self) {
        if let Some((attrs, text)) = self.open_cell.take() {
            self.row.push(build_cell(&attrs, &text));
        }
    }

    fn close_row(&mut self) {
        self.close_cell();
        if !self.row.is_empty() {
            self.rows.push(std::mem::take(&mut self.row));
        }
    }

    fn push_cells(&mut self, content: &str, separators: &[&str]) {
        self.close_cell();
        let pieces = split_top_level(content, separators);
        let last = pieces.len().saturating_sub(1);
        for (i, piece) in pieces.into_iter().enumerate() {
            let (attrs, text) = split_attributes(piece);
            if i == last {
                self.open_cell = Some((attrs.to_string(), text.to_string()));
            } else {
                self.row.push(build_cell(attrs, text));
            }
        }
    }
}

fn parse_wikitext_tables(markup: &str) -> Vec<TableNode> {
    let mut stack: Vec<OpenTable> = Vec::new();
    let mut finished: Vec<(usize, TableNode)> = Vec::new();
    let mut opened = 0usize;

    for line in markup.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("{|") {
            stack.push(OpenTable::new(opened));
            opened += 1;
            continue;
        }

        let Some(table) = stack.last_mut() else {
            continue;
        };

        if trimmed.starts_with("|}") {
            table.close_row();
            if let Some(done) = stack.pop() {
                if !done.rows.is_empty() {
                    finished.push((done.order, TableNode { rows: done.rows }));
                }
            }
        } else if trimmed.starts_with("|+") {
            table.close_cell();
        } else if trimmed.starts_with("|-") {
            table.close_row();
        } else if let Some(content) = trimmed.strip_prefix('!') {
            table.push_cells(content, &["!!", "||"]);
        } else if let Some(content) = trimmed.strip_prefix('|') {
            table.push_cells(content, &["||"]);
        } else if let Some((_, text)) = table.open_cell.as_mut() {
            text.push('\n');
            text.push_str(trimmed);
        }
    }

    // Unterminated tables still yield what they collected.
    while let Some(mut table) = stack.pop() {
        table.close_row();
        if !table.rows.is_empty() {
            finished.push((table.order, TableNode { rows: table.rows }));
        }
    }

    finished.sort_by_key(|(order, _)| *order);
    finished.into_iter().map(|(_, table)| table).collect()
}

/// Split `s` on any of `separators`, ignoring separators inside `[[ ]]` and
/// `{{ }}`.
fn split_top_level<'a>(s: &'a str, separators: &[&str]) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < s.len() {
        let rest = &s[i..];
        if rest.starts_with("[[") || rest.starts_with("{{") {
            depth += 1;
            i += 2;
            continue;
        }
        if rest.starts_with("]]") || rest.starts_with("}}") {
            depth = depth.saturating_sub(1);
            i += 2;
            continue;
        }
        if depth == 0 {
            if let Some(sep) = separators.iter().find(|sep| rest.starts_with(*sep)) {
                pieces.push(&s[start..i]);
                i += sep.len();
                start = i;
                continue;
            }
        }
        i += rest.chars().next().map_or(1, char::len_utf8);
    }
    pieces.push(&s[start..]);
    pieces
}

/// Separate `attrs | text` when the part before the first top-level `|`
/// looks like an attribute list.
fn split_attributes(piece: &str) -> (&str, &str) {
    let mut parts = split_top_level(piece, &["|"]).into_iter();
    match (parts.next(), parts.next()) {
        (Some(attrs), Some(_)) if attrs.contains('=') => {
            let text = &piece[attrs.len() + 1..];
            (attrs, text)
        }
        _ => ("", piece),
    }
}

fn build_cell(attrs: &str, text: &str) -> GridCell {
    GridCell::new(cleanup::inline_text(text))
        .with_colspan(span_attribute(attrs, &COLSPAN_RE))
        .with_rowspan(span_attribute(attrs, &ROWSPAN_RE))
}

static COLSPAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)colspan\s*=\s*["']?\s*(\d+)"#).expect("valid regex")
});

static ROWSPAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)rowspan\s*=\s*["']?\s*(\d+)"#).expect("valid regex")
});

fn span_attribute(attrs: &str, re: &Regex) -> usize {
    re.captures(attrs)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(1)
}

// ---------------------------------------------------------------------------
// HTML tables
// ---------------------------------------------------------------------------

static HTML_TABLE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(/?)table\b[^>]*>").expect("valid regex")
});

fn contains_html_table(markup: &str) -> bool {
    HTML_TABLE_TAG_RE.is_match(markup)
}

fn parse_html_tables(markup: &str) -> Vec<TableNode> {
    let fragment = Html::parse_fragment(markup);
    let Ok(table_sel) = Selector::parse("table") else {
        return Vec::new();
    };
    let Ok(tr_sel) = Selector::parse("tr") else {
        return Vec::new();
    };

    let mut tables = Vec::new();
    for table in fragment.select(&table_sel) {
        let mut rows = Vec::new();
        for tr in table.select(&tr_sel) {
            if nearest_table(tr).map(|t| t.id()) != Some(table.id()) {
                continue;
            }
            let cells: Vec<GridCell> = tr
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|el| matches!(el.value().name(), "td" | "th"))
                .map(html_cell)
                .collect();
            if !cells.is_empty() {
                rows.push(cells);
            }
        }
        if !rows.is_empty() {
            tables.push(TableNode { rows });
        }
    }
    tables
}

fn nearest_table(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
}

fn html_cell(el: ElementRef<'_>) -> GridCell {
    let mut text = String::new();
    collect_text(el, &mut text);

    let span = |name: &str| {
        el.value()
            .attr(name)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(1)
    };

    GridCell::new(cleanup::inline_text(&text))
        .with_colspan(span("colspan"))
        .with_rowspan(span("rowspan"))
}

/// Text content of `el`, skipping nested tables.
fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(inner) if inner.name() == "table" => {}
            Node::Element(inner) if inner.name() == "br" => out.push('\n'),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn strip_html_tables(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut depth = 0usize;
    let mut last = 0;

    for caps in HTML_TABLE_TAG_RE.captures_iter(markup) {
        let Some(tag) = caps.get(0) else { continue };
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        if closing {
            if depth == 1 {
                last = tag.end();
            }
            depth = depth.saturating_sub(1);
        } else {
            if depth == 0 {
                out.push_str(&markup[last..tag.start()]);
            }
            depth += 1;
        }
    }
    if depth == 0 {
        out.push_str(&markup[last..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(table: &TableNode) -> Vec<Vec<&str>> {
        table
            .rows
            .iter()
            .map(|row| row.iter().map(|c| c.text.as_str()).collect())
            .collect()
    }

    #[test]
    fn wikitext_rows_and_inline_cells() {
        let markup = "\
{| class=\"wikitable\"
|+ 屋苑資料
! 座數 !! 單位
|-
| 61 || 12,698
|-
| colspan=\"2\" | 合計
|}";
        let tables = parse_tables(markup);
        assert_eq!(tables.len(), 1);
        assert_eq!(texts(&tables[0]), vec![vec!["座數", "單位"], vec!["61", "12,698"], vec!["合計"]]);
        assert_eq!(tables[0].rows[2][0].colspan, 2);
    }

    #[test]
    fn cells_on_separate_lines_with_continuations() {
        let markup = "{|\n|-\n| rowspan=3 | 一期\n| 第1座\n繼續\n|}";
        let tables = parse_tables(markup);
        let row = &tables[0].rows[0];
        assert_eq!(row[0].rowspan, 3);
        assert_eq!(row[0].text, "一期");
        assert_eq!(row[1].text, "第1座 繼續");
    }

    #[test]
    fn pipes_inside_links_do_not_split_cells() {
        let markup = "{|\n| [[港鐵|MTR]] || [[太古站]]\n|}";
        let tables = parse_tables(markup);
        assert_eq!(texts(&tables[0]), vec![vec!["MTR", "太古站"]]);
    }

    #[test]
    fn nested_wikitext_table_is_separate() {
        let markup = "\
{|
| outer
{|
| inner
|}
| after
|}";
        let tables = parse_tables(markup);
        assert_eq!(tables.len(), 2);
        assert_eq!(texts(&tables[0]), vec![vec!["outer", "after"]]);
        assert_eq!(texts(&tables[1]), vec![vec!["inner"]]);
    }

    #[test]
    fn html_tables_with_spans() {
        let markup = r#"<table>
<tr><th colspan="2">名稱</th></tr>
<tr><td rowspan="2">A<table><tr><td>nested</td></tr></table></td><td>B</td></tr>
</table>"#;
        let tables = parse_tables(markup);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].rows[0][0].colspan, 2);
        assert_eq!(tables[0].rows[1][0].rowspan, 2);
        assert_eq!(tables[0].rows[1][0].text, "A");
        assert_eq!(texts(&tables[1]), vec![vec!["nested"]]);
    }

    #[test]
    fn zero_and_garbage_spans_become_one() {
        let markup = "{|\n| colspan=0 rowspan=x | A\n|}";
        let cell = &parse_tables(markup)[0].rows[0][0];
        assert_eq!((cell.colspan, cell.rowspan), (1, 1));
    }

    #[test]
    fn strip_tables_keeps_surrounding_text() {
        let markup = "前言\n{|\n| a\n{|\n| b\n|}\n|}\n後記 <table><tr><td>x</td></tr></table>完";
        assert_eq!(strip_tables(markup), "前言\n後記 完");
    }

    #[test]
    fn markup_without_tables() {
        assert!(parse_tables("== 歷史 ==\n沒有表格").is_empty());
    }
}
