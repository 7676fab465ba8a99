//! Wiki markup to plain text.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! The pipeline drops comments, references, templates and file links,
//! unwraps wiki and external links, and removes emphasis quotes and
//! leftover HTML tags.

use std::sync::LazyLock;

use regex::Regex;

/// Plain text of a section's wikitext. Tables must already be removed.
pub(crate) fn run_pipeline(wikitext: &str) -> String {
    let mut result = strip_markup(wikitext);

    result = unwrap_headings(&result);
    result = normalize_whitespace(&result);

    result
}

/// Plain text of one table cell, collapsed onto a single line.
pub(crate) fn inline_text(raw: &str) -> String {
    strip_markup(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_markup(text: &str) -> String {
    let mut result = strip_comments(text);

    result = strip_references(&result);
    result = strip_templates(&result);
    result = resolve_links(&result);
    result = strip_emphasis(&result);
    result = strip_html_tags(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Comments and references
// ---------------------------------------------------------------------------

fn strip_comments(text: &str) -> String {
    static COMMENT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

    COMMENT_RE.replace_all(text, "").to_string()
}

/// Drop `<ref>` footnotes, both self-closing and with a body.
fn strip_references(text: &str) -> String {
    static REF_SELF_CLOSING_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<ref\b[^>]*/>").expect("valid regex"));
    static REF_BODY_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<ref\b[^>]*>.*?</ref\s*>").expect("valid regex"));

    let result = REF_SELF_CLOSING_RE.replace_all(text, "");
    REF_BODY_RE.replace_all(&result, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Templates
// ---------------------------------------------------------------------------

/// Remove `{{...}}` templates, innermost first so nesting unwinds.
fn strip_templates(text: &str) -> String {
    static TEMPLATE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\{\{[^{}]*\}\}").expect("valid regex"));

    let mut result = text.to_string();
    // Bounded so unbalanced braces cannot loop forever.
    for _ in 0..16 {
        let next = TEMPLATE_RE.replace_all(&result, "").to_string();
        if next == result {
            break;
        }
        result = next;
    }
    result
}

// ---------------------------------------------------------------------------
// Pass 3: Links
// ---------------------------------------------------------------------------

fn resolve_links(text: &str) -> String {
    static FILE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\[\[(?:file|image|檔案|文件|图像|圖像):[^\[\]]*(?:\[\[[^\]]*\]\][^\[\]]*)*\]\]")
            .expect("valid regex")
    });
    static PIPED_LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[\[[^\[\]|]*\|([^\[\]]*)\]\]").expect("valid regex"));
    static PLAIN_LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[\[([^\[\]|]*)\]\]").expect("valid regex"));
    static EXTERNAL_LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[https?://[^\s\]]+(?:\s+([^\]]*))?\]").expect("valid regex"));

    let result = FILE_LINK_RE.replace_all(text, "");
    let result = PIPED_LINK_RE.replace_all(&result, "$1");
    let result = PLAIN_LINK_RE.replace_all(&result, "$1");
    EXTERNAL_LINK_RE.replace_all(&result, "$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Emphasis and HTML
// ---------------------------------------------------------------------------

fn strip_emphasis(text: &str) -> String {
    static EMPHASIS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"'{2,5}").expect("valid regex"));

    EMPHASIS_RE.replace_all(text, "").to_string()
}

/// Strip HTML tags, preserving inner text. `<br>` becomes a line break.
fn strip_html_tags(text: &str) -> String {
    static BR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
    static HTML_TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("valid regex"));

    let result = BR_RE.replace_all(text, "\n");
    HTML_TAG_RE.replace_all(&result, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Layout
// ---------------------------------------------------------------------------

/// `== Title ==` becomes `Title`.
fn unwrap_headings(text: &str) -> String {
    static HEADING_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^[ \t]*=+[ \t]*(.*?)[ \t]*=+[ \t]*$").expect("valid regex"));

    HEADING_RE.replace_all(text, "$1").to_string()
}

/// Trim line ends, collapse blank runs to one empty line, trim the whole.
fn normalize_whitespace(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let trimmed: Vec<&str> = text.lines().map(str::trim_end).collect();
    let joined = trimmed.join("\n");
    MULTI_BLANK_RE.replace_all(&joined, "\n\n").trim().to_string()
}
