//! Pipeline orchestration and record merging for the housing datahub.
//!
//! This crate ties discovery, fetching, bilingual merging, and storage into
//! the partitioned agency pipeline, and wiki fetching plus table
//! reconstruction into the wiki pipeline.

pub mod cache;
pub mod locale;
pub mod merge;
pub mod pipeline;
pub mod wiki;

pub use cache::{BUILDING_IDS, Cache};
pub use merge::{BILINGUAL_MAPPINGS, BilingualRecord, EntityMapping, fetch_bilingual, merge_into};
pub use pipeline::{
    PipelineOptions, PipelineStage, PipelineSummary, ProgressReporter, SilentProgress,
    run_agency_pipeline,
};
pub use wiki::{WikiPage, WikiSection, build_wiki_page, run_wiki_pipeline};
