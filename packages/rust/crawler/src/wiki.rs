//! MediaWiki `action=parse` client for per-section wikitext.

use serde::Deserialize;
use tracing::{debug, warn};

use housing_shared::{DatahubError, Result};

use crate::client::FetchClient;

/// One entry of a page's table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    /// Value of the API's `section` parameter.
    pub index: u32,
    pub title: String,
    /// Nesting depth; 1 for top-level sections.
    pub level: u32,
}

#[derive(Debug, Deserialize)]
struct ParseEnvelope<T> {
    parse: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct SectionsBody {
    #[serde(default)]
    sections: Vec<RawSection>,
}

#[derive(Debug, Deserialize)]
struct RawSection {
    toclevel: u32,
    line: String,
    index: String,
}

#[derive(Debug, Deserialize)]
struct WikitextBody {
    wikitext: WikitextStar,
}

#[derive(Debug, Deserialize)]
struct WikitextStar {
    #[serde(rename = "*")]
    text: String,
}

/// Wiki API bound to one fetch session and endpoint.
#[derive(Debug, Clone)]
pub struct WikiApi {
    client: FetchClient,
    endpoint: String,
}

impl WikiApi {
    pub fn new(client: FetchClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Table of contents of `title`. `None` when the page does not exist.
    pub async fn page_sections(&self, title: &str) -> Result<Option<Vec<SectionInfo>>> {
        let params = [
            ("action", "parse".to_string()),
            ("page", title.to_string()),
            ("prop", "sections".to_string()),
            ("format", "json".to_string()),
        ];
        let envelope: ParseEnvelope<SectionsBody> =
            self.client.get_json(&self.endpoint, &params).await?;

        if let Some(error) = envelope.error {
            if error.code == "missingtitle" {
                return Ok(None);
            }
            return Err(DatahubError::parse(format!(
                "wiki API error for {title:?}: {} ({})",
                error.code, error.info
            )));
        }

        let body = envelope
            .parse
            .ok_or_else(|| DatahubError::parse(format!("wiki API returned no parse body for {title:?}")))?;

        let sections = body
            .sections
            .into_iter()
            // Sections transcluded from templates have indices like "T-1".
            .filter_map(|raw| {
                let index = raw.index.parse().ok()?;
                Some(SectionInfo {
                    index,
                    title: raw.line,
                    level: raw.toclevel,
                })
            })
            .collect();
        Ok(Some(sections))
    }

    /// Raw wikitext of one section, subsections included.
    pub async fn section_wikitext(&self, title: &str, index: u32) -> Result<String> {
        let params = [
            ("action", "parse".to_string()),
            ("page", title.to_string()),
            ("prop", "wikitext".to_string()),
            ("section", index.to_string()),
            ("format", "json".to_string()),
        ];
        let envelope: ParseEnvelope<WikitextBody> =
            self.client.get_json(&self.endpoint, &params).await?;

        match (envelope.parse, envelope.error) {
            (Some(body), _) => Ok(body.wikitext.text),
            (None, Some(error)) => Err(DatahubError::parse(format!(
                "wiki API error for {title:?} section {index}: {}",
                error.code
            ))),
            (None, None) => Err(DatahubError::parse(format!(
                "wiki API returned no wikitext for {title:?} section {index}"
            ))),
        }
    }

    /// Fetch every section's wikitext concurrently, in input order.
    ///
    /// A failed section yields an empty string; siblings are unaffected.
    pub async fn fetch_section_wikitexts(&self, title: &str, sections: &[SectionInfo]) -> Vec<String> {
        let handles: Vec<_> = sections
            .iter()
            .map(|section| {
                let api = self.clone();
                let title = title.to_string();
                let index = section.index;
                tokio::spawn(async move { api.section_wikitext(&title, index).await })
            })
            .collect();

        let mut texts = Vec::with_capacity(handles.len());
        for (handle, section) in handles.into_iter().zip(sections) {
            let text = match handle.await {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!(page = title, section = %section.title, error = %e, "section fetch failed");
                    String::new()
                }
                Err(e) => {
                    warn!(page = title, section = %section.title, error = %e, "section task panicked");
                    String::new()
                }
            };
            texts.push(text);
        }
        debug!(page = title, sections = texts.len(), "fetched section wikitext");
        texts
    }
}
