//! Shared types, error model, and configuration for the housing datahub.
//!
//! This crate is the foundation depended on by all other datahub crates.
//! It provides:
//! - [`DatahubError`]: the unified error type
//! - Domain types ([`ListingId`], [`Locale`], [`Row`], [`Rows`], [`EntityKind`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], config loading)

pub mod config;
pub mod entity;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AgencyApiConfig, AppConfig, ConflictPolicy, FetchConfig, FetchSettings, PipelineSettings,
    StorageConfig, WikiApiConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_agency_config,
};
pub use entity::EntityKind;
pub use error::{DatahubError, Result};
pub use types::{FieldValue, ListingId, Locale, Row, Rows};
