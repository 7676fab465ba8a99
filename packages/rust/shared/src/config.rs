//! Application configuration for the housing datahub.
//!
//! User config lives at `~/.housing-datahub/housing-datahub.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DatahubError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "housing-datahub.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".housing-datahub";

// ---------------------------------------------------------------------------
// Config structs (matching housing-datahub.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agency listings API endpoints and session headers.
    #[serde(default)]
    pub agency_api: AgencyApiConfig,

    /// Wiki (MediaWiki) API settings.
    #[serde(default)]
    pub wiki_api: WikiApiConfig,

    /// HTTP retry and pacing policy.
    #[serde(default)]
    pub fetch: FetchSettings,

    /// On-disk locations and write policy.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Partitioned pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// `[agency_api]` section.
///
/// URL templates may contain `{estate_id}` or `{building_id}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgencyApiConfig {
    /// Homepage hit once per run to obtain session cookies.
    #[serde(default)]
    pub homepage: String,

    /// Paginated listing (discovery) endpoint.
    #[serde(default)]
    pub all_estate_info: String,

    /// Per-estate detail endpoint (`{estate_id}`).
    #[serde(default)]
    pub single_estate_info: String,

    /// Per-estate monthly market aggregate endpoint (`{estate_id}`).
    #[serde(default)]
    pub estate_monthly_market_info: String,

    /// Per-building unit/transaction endpoint (`{building_id}`).
    #[serde(default)]
    pub building_transactions: String,

    /// Listing page size (the API caps it at 1000).
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for AgencyApiConfig {
    fn default() -> Self {
        Self {
            homepage: String::new(),
            all_estate_info: String::new(),
            single_estate_info: String::new(),
            estate_monthly_market_info: String::new(),
            building_transactions: String::new(),
            page_size: default_page_size(),
            headers: BTreeMap::new(),
        }
    }
}

fn default_page_size() -> u32 {
    1000
}

/// `[wiki_api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiApiConfig {
    /// Wiki language subdomain.
    #[serde(default = "default_wiki_language")]
    pub language: String,

    /// Override for the `api.php` URL (defaults to `https://{language}.wikipedia.org/w/api.php`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// User-Agent for wiki requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WikiApiConfig {
    fn default() -> Self {
        Self {
            language: default_wiki_language(),
            api_url: None,
            user_agent: default_user_agent(),
        }
    }
}

impl WikiApiConfig {
    /// Resolved `api.php` endpoint.
    pub fn endpoint(&self) -> String {
        self.api_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.wikipedia.org/w/api.php", self.language))
    }
}

fn default_wiki_language() -> String {
    "zh".into()
}
fn default_user_agent() -> String {
    "HK_Housing_Datahub_Crawler".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Total attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Flat delay between attempts, in ms.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Fixed delay before every request, in ms.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            request_delay_ms: default_request_delay(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    2000
}
fn default_request_delay() -> u64 {
    100
}
fn default_timeout() -> u64 {
    30
}

/// How the storage writer treats a row whose primary key already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep the stored row; drop the incoming one (immutable snapshot).
    #[default]
    Ignore,
    /// Replace non-key columns with the incoming values.
    Overwrite,
}

/// `[storage]` section. Relative file paths resolve against `root_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_root_path")]
    pub root_path: String,

    #[serde(default = "default_db_file")]
    pub db_file: String,

    /// Flat replay list of discovered listing ids.
    #[serde(default = "default_listing_ids_file")]
    pub listing_ids_file: String,

    /// Index of the last fully persisted partition.
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: String,

    #[serde(default = "default_wiki_output_file")]
    pub wiki_output_file: String,

    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            db_file: default_db_file(),
            listing_ids_file: default_listing_ids_file(),
            checkpoint_file: default_checkpoint_file(),
            wiki_output_file: default_wiki_output_file(),
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl StorageConfig {
    /// Resolve a configured file against `root_path` (absolute paths pass through).
    pub fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.root_path).join(path)
        }
    }
}

fn default_root_path() -> String {
    "data".into()
}
fn default_db_file() -> String {
    "agency/agency_data.db".into()
}
fn default_listing_ids_file() -> String {
    "agency/estate_ids.txt".into()
}
fn default_checkpoint_file() -> String {
    "agency/partition_checkpoint.txt".into()
}
fn default_wiki_output_file() -> String {
    "wiki/estate_wiki.json".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Listing ids per partition.
    #[serde(default = "default_partition_size")]
    pub partition_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            partition_size: default_partition_size(),
        }
    }
}

fn default_partition_size() -> usize {
    50
}

// ---------------------------------------------------------------------------
// Fetch config (runtime, merged from config + per-API settings)
// ---------------------------------------------------------------------------

/// Runtime HTTP client configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Headers applied to every request of the session.
    pub headers: BTreeMap<String, String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.fetch.max_attempts,
            retry_delay_ms: config.fetch.retry_delay_ms,
            request_delay_ms: config.fetch.request_delay_ms,
            timeout_secs: config.fetch.timeout_secs,
            user_agent: concat!("housing-datahub/", env!("CARGO_PKG_VERSION")).into(),
            headers: config.agency_api.headers.clone(),
        }
    }
}

impl FetchConfig {
    /// Client settings for the wiki API (own user agent, no agency headers).
    pub fn for_wiki(config: &AppConfig) -> Self {
        Self {
            user_agent: config.wiki_api.user_agent.clone(),
            headers: BTreeMap::new(),
            ..Self::from(config)
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.housing-datahub/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DatahubError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.housing-datahub/housing-datahub.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DatahubError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DatahubError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DatahubError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DatahubError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DatahubError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that every agency endpoint the pipeline needs is configured.
pub fn validate_agency_config(config: &AppConfig) -> Result<()> {
    let api = &config.agency_api;
    let required = [
        ("all_estate_info", &api.all_estate_info),
        ("single_estate_info", &api.single_estate_info),
        ("estate_monthly_market_info", &api.estate_monthly_market_info),
        ("building_transactions", &api.building_transactions),
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, url)| url.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

    if !missing.is_empty() {
        return Err(DatahubError::config(format!(
            "agency_api endpoints not configured: {}",
            missing.join(", ")
        )));
    }
    for (name, value) in required {
        url::Url::parse(value).map_err(|e| {
            DatahubError::config(format!("agency_api.{name} is not a valid URL ({value:?}): {e}"))
        })?;
    }
    if api.page_size == 0 || api.page_size > 1000 {
        return Err(DatahubError::config(format!(
            "agency_api.page_size must be within 1..=1000, got {}",
            api.page_size
        )));
    }
    Ok(())
}
