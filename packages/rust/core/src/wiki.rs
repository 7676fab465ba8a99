//! Wiki page pipeline: estate names → wiki sections → text and CSV tables.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use housing_crawler::{SectionInfo, WikiApi};
use housing_shared::{DatahubError, Locale, Result};
use housing_storage::Storage;
use housing_wikitable::{plain_text, tables_to_csv};

/// One top-level section of a wiki page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WikiSection {
    pub title: String,
    /// Plain text of the section and its direct subsections.
    pub text: String,
    /// Every table of the section as CSV, header row first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WikiPage {
    pub title: String,
    pub sections: Vec<WikiSection>,
}

/// Assemble a page from its table of contents and the wikitext of each
/// section (`wikitexts[i]` belongs to `sections[i]`).
///
/// Only top-level sections are emitted. A section's text is its own text
/// followed by the text of its direct subsections; deeper levels and
/// heading titles are left out. Tables are taken from the whole section.
/// A section with no text of its own is dropped.
pub fn build_wiki_page(title: &str, sections: &[SectionInfo], wikitexts: &[String]) -> WikiPage {
    let sections = sections
        .iter()
        .zip(wikitexts)
        .filter(|(section, _)| section.level == 1)
        .filter_map(|(section, wikitext)| {
            let text = section_text(wikitext)?;
            Some(WikiSection {
                title: section.title.clone(),
                text,
                tables: tables_to_csv(wikitext),
            })
        })
        .collect();

    WikiPage {
        title: title.to_string(),
        sections,
    }
}

/// Depth of a `== heading ==` line.
fn heading_level(line: &str) -> Option<usize> {
    let trimmed = line.trim();
    let leading = trimmed.chars().take_while(|c| *c == '=').count();
    let trailing = trimmed.chars().rev().take_while(|c| *c == '=').count();
    (leading > 0 && trailing > 0 && trimmed.chars().count() > leading).then(|| leading.min(trailing))
}

/// Own text plus direct-subsection text. `None` when the section has no
/// text of its own.
fn section_text(wikitext: &str) -> Option<String> {
    let mut child_level = None;
    let mut own: Vec<&str> = Vec::new();
    let mut children: Vec<Vec<&str>> = Vec::new();
    // Index into `children`, or `None` while collecting own text; `skip`
    // marks lines under a deeper heading.
    let mut current: Option<usize> = None;
    let mut skip = false;

    for line in wikitext.lines() {
        let Some(depth) = heading_level(line) else {
            if skip {
                continue;
            }
            match current {
                Some(i) => children[i].push(line),
                None => own.push(line),
            }
            continue;
        };

        // The section's own heading.
        if child_level.is_none() && own.iter().all(|l| l.trim().is_empty()) {
            child_level = Some(depth + 1);
            continue;
        }

        let child = *child_level.get_or_insert(depth);
        if depth <= child {
            children.push(Vec::new());
            current = Some(children.len() - 1);
            skip = false;
        } else {
            skip = true;
        }
    }

    let own = plain_text(&own.join("\n"));
    if own.is_empty() {
        return None;
    }
    let mut parts = vec![own];
    parts.extend(
        children
            .iter()
            .map(|lines| plain_text(&lines.join("\n")))
            .filter(|text| !text.is_empty()),
    );
    Some(parts.join("\n"))
}

/// Fetch the wiki page of every stored estate and write them as one JSON
/// object keyed by estate name. Returns the number of pages written.
///
/// A page that is missing or fails to load is logged and skipped.
#[instrument(skip_all, fields(out = %out_path.display()))]
pub async fn run_wiki_pipeline(storage: &Storage, api: &WikiApi, out_path: &Path) -> Result<usize> {
    let started_at = Utc::now();
    let names = storage.estate_names(Locale::ZhHk).await?;
    info!(estates = names.len(), "starting wiki pipeline");

    let mut pages = BTreeMap::new();
    for name in &names {
        let sections = match api.page_sections(name).await {
            Ok(Some(sections)) => sections,
            Ok(None) => {
                debug!(estate = %name, "no wiki page");
                continue;
            }
            Err(e) => {
                warn!(estate = %name, error = %e, "wiki page fetch failed, skipping");
                continue;
            }
        };

        let top_level: Vec<SectionInfo> = sections.into_iter().filter(|s| s.level == 1).collect();
        let wikitexts = api.fetch_section_wikitexts(name, &top_level).await;
        let page = build_wiki_page(name, &top_level, &wikitexts);
        if page.sections.is_empty() {
            warn!(estate = %name, "wiki page has no usable sections");
            continue;
        }
        pages.insert(name.clone(), page);
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DatahubError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(&pages)
        .map_err(|e| DatahubError::parse(format!("failed to serialize wiki pages: {e}")))?;
    std::fs::write(out_path, json).map_err(|e| DatahubError::io(out_path, e))?;

    storage.record_run("wiki", started_at, 0, pages.len() as u64).await?;
    info!(pages = pages.len(), estates = names.len(), "wiki pipeline complete");
    Ok(pages.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use housing_crawler::FetchClient;
    use housing_shared::{EntityKind, FetchConfig, Row};
    use uuid::Uuid;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn section(index: u32, title: &str, level: u32) -> SectionInfo {
        SectionInfo {
            index,
            title: title.to_string(),
            level,
        }
    }

    #[test]
    fn builds_top_level_sections_with_tables() {
        let sections = [
            section(1, "歷史", 1),
            section(2, "發展", 2),
            section(3, "屋苑資料", 1),
            section(4, "參考", 1),
        ];
        let wikitexts = [
            "== 歷史 ==\n'''太古城'''於1970年代興建。\n=== 發展 ===\n分十期落成。".to_string(),
            "=== 發展 ===\n分十期落成。".to_string(),
            "== 屋苑資料 ==\n概覽如下。\n{|\n! 期數 !! 座數\n|-\n| 第一期 || 4\n|}".to_string(),
            "== 參考 ==\n".to_string(),
        ];

        let page = build_wiki_page("太古城", &sections, &wikitexts);
        assert_eq!(page.sections.len(), 2);

        let history = &page.sections[0];
        assert_eq!(history.title, "歷史");
        assert!(history.text.starts_with("太古城於1970年代興建。"));
        assert!(history.text.contains("分十期落成。"));
        assert!(history.tables.is_empty());

        let info = &page.sections[1];
        assert_eq!(info.tables, ["期數,座數\n第一期,4\n"]);
        assert!(!info.text.contains("第一期"));
    }

    #[test]
    fn text_keeps_one_level_of_subsections() {
        let sections = [section(1, "歷史", 1)];
        let wikitexts = [
            "== 歷史 ==\n甲。\n=== 發展 ===\n乙。\n==== 細節 ====\n丙。\n=== 重建 ===\n丁。"
                .to_string(),
        ];
        let page = build_wiki_page("太古城", &sections, &wikitexts);
        assert_eq!(page.sections[0].text, "甲。\n乙。\n丁。");
    }

    #[test]
    fn heading_levels() {
        assert_eq!(heading_level("== 歷史 =="), Some(2));
        assert_eq!(heading_level("  ==== 細節 ====  "), Some(4));
        assert_eq!(heading_level("a == b"), None);
        assert_eq!(heading_level("===="), None);
    }

    #[test]
    fn section_without_own_text_is_dropped() {
        let sections = [section(1, "車站", 1)];
        let wikitexts = ["== 車站 ==\n=== 港鐵 ===\n太古站".to_string()];
        let page = build_wiki_page("太古城", &sections, &wikitexts);
        assert!(page.sections.is_empty());
    }

    #[test]
    fn empty_tables_are_not_serialized() {
        let page = WikiPage {
            title: "t".into(),
            sections: vec![WikiSection {
                title: "s".into(),
                text: "x".into(),
                tables: Vec::new(),
            }],
        };
        let json = serde_json::to_value(&page).unwrap();
        assert!(json["sections"][0].get("tables").is_none());
    }

    #[tokio::test]
    async fn writes_pages_for_stored_estates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("page", "太古城"))
            .and(query_param("prop", "sections"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"parse": {"sections": [{"toclevel": 1, "line": "歷史", "index": "1"}]}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("page", "太古城"))
            .and(query_param("prop", "wikitext"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"parse": {"wikitext": {"*": "== 歷史 ==\n於1970年代興建。"}}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("page", "無名苑"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"error": {"code": "missingtitle", "info": "The page you specified doesn't exist."}}"#,
            ))
            .mount(&server)
            .await;

        let dir = std::env::temp_dir().join(format!("housing_wiki_{}", Uuid::now_v7()));
        let storage = Storage::open(&dir.join("agency.db")).await.unwrap();
        let estates = ["E1", "E2"]
            .iter()
            .zip(["太古城", "無名苑"])
            .map(|(id, name)| {
                EntityKind::Estate
                    .columns()
                    .iter()
                    .fold(Row::new(), |row, column| match *column {
                        "estate_id" => row.with(column, *id),
                        "estate_name_zh" => row.with(column, name),
                        _ => row.with(column, None::<String>),
                    })
            })
            .collect::<Vec<_>>();
        storage.upsert(EntityKind::Estate, &estates).await.unwrap();

        let client = FetchClient::new(FetchConfig {
            max_attempts: 1,
            retry_delay_ms: 0,
            request_delay_ms: 0,
            ..FetchConfig::default()
        })
        .unwrap();
        let api = WikiApi::new(client, format!("{}/w/api.php", server.uri()));
        let out = dir.join("wiki").join("estate_wiki.json");

        let written = run_wiki_pipeline(&storage, &api, &out).await.unwrap();
        assert_eq!(written, 1);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json["太古城"]["sections"][0]["text"], "於1970年代興建。");
        assert!(json.get("無名苑").is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
