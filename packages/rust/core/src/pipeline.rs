//! Partitioned agency pipeline: discover → (merge → persist)* → complete.
//!
//! The listing id list is split into fixed-size partitions processed
//! strictly in order. Each partition runs an estate stage (bilingual merge
//! plus monthly market data) and a building stage (units and transactions
//! of every building harvested by the estate stage), then writes its index
//! to the checkpoint file. A rerun resumes after the last checkpoint.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use housing_crawler::AgencyApi;
use housing_discovery::{DiscoveryOptions, discover_listing_ids, id_list};
use housing_shared::{AppConfig, DatahubError, EntityKind, FieldValue, ListingId, Result};
use housing_storage::Storage;

use crate::cache::{BUILDING_IDS, Cache};
use crate::locale::{map_building_transactions, map_monthly_market};
use crate::merge::{fetch_bilingual, merge_into};

// ---------------------------------------------------------------------------
// Options / summary
// ---------------------------------------------------------------------------

/// Configuration for [`run_agency_pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Listing ids per partition.
    pub partition_size: usize,
    /// Re-run discovery even when an id list exists.
    pub refresh_ids: bool,
    /// First partition to run; overrides the checkpoint.
    pub start_partition: Option<usize>,
    /// Stop after this many partitions.
    pub max_partitions: Option<usize>,
    pub listing_ids_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub discovery: DiscoveryOptions,
}

impl From<&AppConfig> for PipelineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            partition_size: config.pipeline.partition_size,
            refresh_ids: false,
            start_partition: None,
            max_partitions: None,
            listing_ids_path: config.storage.resolve(&config.storage.listing_ids_file),
            checkpoint_path: config.storage.resolve(&config.storage.checkpoint_file),
            discovery: DiscoveryOptions {
                page_size: config.agency_api.page_size,
                ..DiscoveryOptions::default()
            },
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub listing_count: usize,
    pub partitions_run: usize,
    pub records_merged: usize,
    pub records_skipped: usize,
    pub rows_written: u64,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Pipeline states, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    Discover,
    MergePartition { index: usize, total: usize },
    PersistPartition { index: usize, total: usize },
    Complete,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Init => f.write_str("Initializing"),
            PipelineStage::Discover => f.write_str("Discovering listing ids"),
            PipelineStage::MergePartition { index, total } => {
                write!(f, "Merging partition {}/{total}", index + 1)
            }
            PipelineStage::PersistPartition { index, total } => {
                write!(f, "Persisting partition {}/{total}", index + 1)
            }
            PipelineStage::Complete => f.write_str("Complete"),
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn stage(&self, stage: &PipelineStage);
    /// Called after each listing of a partition is merged (or skipped).
    fn record_merged(&self, id: &ListingId, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, summary: &PipelineSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: &PipelineStage) {}
    fn record_merged(&self, _id: &ListingId, _current: usize, _total: usize) {}
    fn done(&self, _summary: &PipelineSummary) {}
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Run the agency pipeline over every pending partition.
///
/// A failed record is logged and skipped. A failed flush aborts the run with
/// a `Storage` error naming the partition; that partition is not
/// checkpointed, so the next run starts there again.
#[instrument(skip_all, fields(partition_size = opts.partition_size))]
pub async fn run_agency_pipeline(
    api: &AgencyApi,
    storage: &Storage,
    opts: &PipelineOptions,
    progress: &dyn ProgressReporter,
) -> Result<PipelineSummary> {
    let start = Instant::now();
    let started_at = Utc::now();

    progress.stage(&PipelineStage::Init);
    if !api.config().homepage.is_empty() {
        if let Err(e) = api.refresh_session().await {
            warn!(error = %e, "session refresh failed, continuing without cookies");
        }
    }

    let ids = load_or_discover(api, opts, progress).await?;
    let partitions: Vec<&[ListingId]> = ids.chunks(opts.partition_size.max(1)).collect();
    let total = partitions.len();

    let first = match opts.start_partition {
        Some(index) => index,
        None => read_checkpoint(&opts.checkpoint_path)?.map_or(0, |last| last + 1),
    };
    info!(listings = ids.len(), partitions = total, first, "starting agency pipeline");

    let mut summary = PipelineSummary {
        listing_count: ids.len(),
        ..PipelineSummary::default()
    };
    let mut cache = Cache::new();

    for (index, slice) in partitions
        .iter()
        .enumerate()
        .skip(first)
        .take(opts.max_partitions.unwrap_or(usize::MAX))
    {
        progress.stage(&PipelineStage::MergePartition { index, total });
        merge_partition(api, slice, &mut cache, &mut summary, progress).await;

        progress.stage(&PipelineStage::PersistPartition { index, total });
        let estate_rows = flush(storage, &mut cache, &[BUILDING_IDS])
            .await
            .map_err(|e| partition_error(index, e))?;

        collect_buildings(api, &mut cache).await;
        let building_rows = flush(storage, &mut cache, &[])
            .await
            .map_err(|e| partition_error(index, e))?;

        write_checkpoint(&opts.checkpoint_path, index)?;
        summary.partitions_run += 1;
        summary.rows_written += estate_rows + building_rows;
        info!(
            partition = index,
            listings = slice.len(),
            rows = estate_rows + building_rows,
            "partition persisted"
        );
    }

    summary.elapsed = start.elapsed();
    storage
        .record_run(
            "agency",
            started_at,
            summary.partitions_run as u64,
            summary.rows_written,
        )
        .await?;

    progress.stage(&PipelineStage::Complete);
    progress.done(&summary);
    info!(
        partitions = summary.partitions_run,
        merged = summary.records_merged,
        skipped = summary.records_skipped,
        rows = summary.rows_written,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "agency pipeline complete"
    );
    Ok(summary)
}

/// Reuse the stored id list, or run discovery and replace it.
///
/// A fresh list invalidates the checkpoint: partition indices refer to the
/// old list.
async fn load_or_discover(
    api: &AgencyApi,
    opts: &PipelineOptions,
    progress: &dyn ProgressReporter,
) -> Result<Vec<ListingId>> {
    if !opts.refresh_ids {
        if let Some(ids) = id_list::load(&opts.listing_ids_path)? {
            debug!(count = ids.len(), path = %opts.listing_ids_path.display(), "reusing listing ids");
            return Ok(ids);
        }
    }

    progress.stage(&PipelineStage::Discover);
    let ids = discover_listing_ids(api, &opts.discovery).await?;
    id_list::save(&opts.listing_ids_path, &ids)?;
    remove_checkpoint(&opts.checkpoint_path)?;
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Estate stage: merge every listing of the slice into the cache.
async fn merge_partition(
    api: &AgencyApi,
    slice: &[ListingId],
    cache: &mut Cache,
    summary: &mut PipelineSummary,
    progress: &dyn ProgressReporter,
) {
    for (i, id) in slice.iter().enumerate() {
        match fetch_bilingual(api, id).await {
            Ok(record) => {
                merge_into(&record, cache);
                summary.records_merged += 1;
            }
            Err(e) => {
                warn!(listing = %id, error = %e, "bilingual fetch failed, skipping listing");
                summary.records_skipped += 1;
                progress.record_merged(id, i + 1, slice.len());
                continue;
            }
        }

        match api.estate_monthly_market(id).await {
            Ok(response) => {
                cache.append_entity(
                    EntityKind::EstateMonthlyMarket,
                    map_monthly_market(id, &response),
                );
            }
            Err(e) => warn!(listing = %id, error = %e, "monthly market fetch failed"),
        }
        progress.record_merged(id, i + 1, slice.len());
    }
}

/// Building stage: fetch and map every harvested building id.
async fn collect_buildings(api: &AgencyApi, cache: &mut Cache) {
    let building_ids: Vec<String> = cache
        .sequence(BUILDING_IDS)
        .iter()
        .filter_map(|row| row.get("building_id").and_then(FieldValue::as_text))
        .map(str::to_string)
        .collect();

    for building_id in &building_ids {
        match api.building_transactions(building_id).await {
            Ok(response) => {
                for (kind, rows) in map_building_transactions(&response) {
                    cache.append_entity(kind, rows);
                }
            }
            Err(e) => warn!(building = %building_id, error = %e, "building transactions fetch failed"),
        }
    }
    debug!(buildings = building_ids.len(), "building stage collected");
}

/// Upsert every entity sequence, parents first, then clear the cache except
/// for `exclude`. On error the cache is left untouched.
pub async fn flush(storage: &Storage, cache: &mut Cache, exclude: &[&str]) -> Result<u64> {
    let mut written = 0;
    for kind in EntityKind::ALL {
        let rows = cache.sequence(kind.table());
        if rows.is_empty() {
            continue;
        }
        written += storage.upsert(kind, rows).await?;
    }
    cache.clear(exclude);
    Ok(written)
}

fn partition_error(index: usize, e: DatahubError) -> DatahubError {
    DatahubError::Storage(format!("partition {index}: {e}"))
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Index of the last fully persisted partition, if any.
pub fn read_checkpoint(path: &Path) -> Result<Option<usize>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| DatahubError::io(path, e))?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse().map(Some).map_err(|e| {
        DatahubError::parse(format!(
            "invalid checkpoint {trimmed:?} in {}: {e}",
            path.display()
        ))
    })
}

/// Record `index` as the last persisted partition. The value is written to
/// a sibling temp file and renamed over `path`, so a crash never leaves a
/// truncated checkpoint behind.
pub fn write_checkpoint(path: &Path, index: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DatahubError::io(parent, e))?;
    }
    let tmp = checkpoint_tmp(path);
    std::fs::write(&tmp, format!("{index}\n")).map_err(|e| DatahubError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| DatahubError::io(path, e))
}

fn checkpoint_tmp(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn remove_checkpoint(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DatahubError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use housing_crawler::FetchClient;
    use housing_shared::{AgencyApiConfig, FetchConfig, Row, Rows};
    use uuid::Uuid;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("housing_pipeline_{}", Uuid::now_v7()))
    }

    fn api_for(server: &MockServer) -> AgencyApi {
        let base = server.uri();
        let config = AgencyApiConfig {
            all_estate_info: format!("{base}/estates"),
            single_estate_info: format!("{base}/estates/{{estate_id}}"),
            estate_monthly_market_info: format!("{base}/estates/{{estate_id}}/monthly"),
            building_transactions: format!("{base}/buildings/{{building_id}}/transactions"),
            ..AgencyApiConfig::default()
        };
        let client = FetchClient::new(FetchConfig {
            max_attempts: 1,
            retry_delay_ms: 0,
            request_delay_ms: 0,
            ..FetchConfig::default()
        })
        .unwrap();
        AgencyApi::new(client, config)
    }

    fn options(dir: &Path, partition_size: usize) -> PipelineOptions {
        PipelineOptions {
            partition_size,
            refresh_ids: false,
            start_partition: None,
            max_partitions: None,
            listing_ids_path: dir.join("estate_ids.txt"),
            checkpoint_path: dir.join("checkpoint.txt"),
            discovery: DiscoveryOptions::default(),
        }
    }

    fn detail(id: &str, locale: &str) -> String {
        let (name, region) = if locale == "en" {
            (format!("Estate {id}"), "Kowloon")
        } else {
            (format!("屋苑{id}"), "九龍")
        };
        format!(
            r#"{{
                "id": "{id}",
                "name": {{"chi": "{name}", "en": "{name}"}},
                "region": {{"id": "R1", "name": "{region}"}},
                "phase": [{{"is_phase": true, "id": "P-{id}", "name": "{name}",
                            "buildings": [{{"id": "B-{id}", "name": "{name}"}}]}}]
            }}"#
        )
    }

    async fn mount_listing(server: &MockServer, id: &str) {
        for locale in ["zh-hk", "en"] {
            Mock::given(method("GET"))
                .and(path(format!("/estates/{id}")))
                .and(query_param("lang", locale))
                .respond_with(ResponseTemplate::new(200).set_body_string(detail(id, locale)))
                .mount(server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(format!("/estates/{id}/monthly")))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data": [{"date": "2024-01", "net_ft_price": 12000.0, "tx_count": 4}]}"#,
            ))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/buildings/B-{id}/transactions")))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"building": {{"id": "B-{id}"}}, "data": [
                    {{"unit_id": "U-{id}", "floor": "3", "flat": "A",
                      "transactions": [{{"id": "T-{id}", "price": 5000000.0, "bedroom": 2}}]}}
                ]}}"#
            )))
            .mount(server)
            .await;
    }

    fn write_ids(opts: &PipelineOptions, ids: &[&str]) {
        let ids: Vec<ListingId> = ids.iter().map(|id| ListingId::new(*id)).collect();
        id_list::save(&opts.listing_ids_path, &ids).unwrap();
    }

    #[test]
    fn checkpoint_roundtrip_and_missing() {
        let dir = scratch_dir();
        let path = dir.join("checkpoint.txt");
        assert_eq!(read_checkpoint(&path).unwrap(), None);
        write_checkpoint(&path, 7).unwrap();
        assert_eq!(read_checkpoint(&path).unwrap(), Some(7));
        write_checkpoint(&path, 12).unwrap();
        assert_eq!(read_checkpoint(&path).unwrap(), Some(12));
        assert!(!checkpoint_tmp(&path).exists());
        assert_eq!(checkpoint_tmp(&path), dir.join("checkpoint.txt.tmp"));
        remove_checkpoint(&path).unwrap();
        remove_checkpoint(&path).unwrap();
        assert_eq!(read_checkpoint(&path).unwrap(), None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stage_labels_are_one_based() {
        let stage = PipelineStage::MergePartition { index: 0, total: 3 };
        assert_eq!(stage.to_string(), "Merging partition 1/3");
    }

    #[tokio::test]
    async fn end_to_end_partitions_and_rerun() {
        let server = MockServer::start().await;
        for id in ["E1", "E2", "E3"] {
            mount_listing(&server, id).await;
        }
        let dir = scratch_dir();
        let storage = Storage::open(&dir.join("agency.db")).await.unwrap();
        let opts = options(&dir, 2);
        write_ids(&opts, &["E1", "E2", "E3"]);
        let api = api_for(&server);

        let summary = run_agency_pipeline(&api, &storage, &opts, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.listing_count, 3);
        assert_eq!(summary.partitions_run, 2);
        assert_eq!(summary.records_merged, 3);
        assert_eq!(summary.records_skipped, 0);
        assert_eq!(read_checkpoint(&opts.checkpoint_path).unwrap(), Some(1));

        assert_eq!(storage.count_rows(EntityKind::Estate).await.unwrap(), 3);
        assert_eq!(storage.count_rows(EntityKind::Region).await.unwrap(), 1);
        assert_eq!(storage.count_rows(EntityKind::Building).await.unwrap(), 3);
        assert_eq!(storage.count_rows(EntityKind::Unit).await.unwrap(), 3);
        assert_eq!(storage.count_rows(EntityKind::Transaction).await.unwrap(), 3);
        assert_eq!(storage.count_rows(EntityKind::EstateMonthlyMarket).await.unwrap(), 3);

        // Forced rerun from the start writes nothing new.
        let rerun = PipelineOptions {
            start_partition: Some(0),
            ..opts.clone()
        };
        let again = run_agency_pipeline(&api, &storage, &rerun, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(again.partitions_run, 2);
        assert_eq!(again.rows_written, 0);
        assert_eq!(storage.count_rows(EntityKind::Estate).await.unwrap(), 3);

        // Resuming after the final checkpoint has nothing left to do.
        let resumed = run_agency_pipeline(&api, &storage, &opts, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(resumed.partitions_run, 0);

        assert_eq!(storage.recent_runs(10).await.unwrap().len(), 3);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn max_partitions_bounds_the_run() {
        let server = MockServer::start().await;
        for id in ["E1", "E2", "E3"] {
            mount_listing(&server, id).await;
        }
        let dir = scratch_dir();
        let storage = Storage::open(&dir.join("agency.db")).await.unwrap();
        let opts = PipelineOptions {
            max_partitions: Some(1),
            ..options(&dir, 1)
        };
        write_ids(&opts, &["E1", "E2", "E3"]);

        let summary = run_agency_pipeline(&api_for(&server), &storage, &opts, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.partitions_run, 1);
        assert_eq!(read_checkpoint(&opts.checkpoint_path).unwrap(), Some(0));
        assert!(
            storage
                .contains_key(EntityKind::Estate, &[FieldValue::from("E1")])
                .await
                .unwrap()
        );
        assert!(
            !storage
                .contains_key(EntityKind::Estate, &[FieldValue::from("E2")])
                .await
                .unwrap()
        );

        // The next run picks up at partition 1.
        let next = run_agency_pipeline(&api_for(&server), &storage, &opts, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(next.partitions_run, 1);
        assert_eq!(read_checkpoint(&opts.checkpoint_path).unwrap(), Some(1));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn listing_failing_in_one_locale_is_skipped() {
        let server = MockServer::start().await;
        mount_listing(&server, "E1").await;
        Mock::given(method("GET"))
            .and(path("/estates/E2"))
            .and(query_param("lang", "zh-hk"))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail("E2", "zh-hk")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/estates/E2"))
            .and(query_param("lang", "en"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = scratch_dir();
        let storage = Storage::open(&dir.join("agency.db")).await.unwrap();
        let opts = options(&dir, 10);
        write_ids(&opts, &["E1", "E2"]);

        let summary = run_agency_pipeline(&api_for(&server), &storage, &opts, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.records_merged, 1);
        assert_eq!(summary.records_skipped, 1);
        assert_eq!(storage.count_rows(EntityKind::Estate).await.unwrap(), 1);
        assert!(
            !storage
                .contains_key(EntityKind::Estate, &[FieldValue::from("E2")])
                .await
                .unwrap()
        );
        assert!(
            !storage
                .contains_key(EntityKind::Phase, &[FieldValue::from("P-E2")])
                .await
                .unwrap()
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn discovers_when_no_id_list_exists() {
        let server = MockServer::start().await;
        mount_listing(&server, "E1").await;
        Mock::given(method("GET"))
            .and(path("/estates"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"count": 1, "result": [{"id": "E1"}]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = scratch_dir();
        let storage = Storage::open(&dir.join("agency.db")).await.unwrap();
        let opts = options(&dir, 5);
        write_checkpoint(&opts.checkpoint_path, 4).unwrap();

        let summary = run_agency_pipeline(&api_for(&server), &storage, &opts, &SilentProgress)
            .await
            .unwrap();
        // Stale checkpoint from a previous list was discarded.
        assert_eq!(summary.partitions_run, 1);
        let saved = id_list::load(&opts.listing_ids_path).unwrap().unwrap();
        assert_eq!(saved, vec![ListingId::new("E1")]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_flush_keeps_the_cache() {
        let dir = scratch_dir();
        let db = dir.join("agency.db");
        drop(Storage::open(&db).await.unwrap());
        let storage = Storage::open_readonly(&db).await.unwrap();

        let mut cache = Cache::new();
        let region = Row::new()
            .with("region_id", "R1")
            .with("region_name_zh", "九龍")
            .with("region_name_en", "Kowloon");
        cache.append_entity(EntityKind::Region, Rows::One(region));

        assert!(flush(&storage, &mut cache, &[]).await.is_err());
        assert_eq!(cache.len(EntityKind::Region.table()), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_persist_aborts_without_checkpoint() {
        let server = MockServer::start().await;
        mount_listing(&server, "E1").await;
        let dir = scratch_dir();
        let db = dir.join("agency.db");
        drop(Storage::open(&db).await.unwrap());
        let storage = Storage::open_readonly(&db).await.unwrap();
        let opts = options(&dir, 1);
        write_ids(&opts, &["E1"]);

        let err = run_agency_pipeline(&api_for(&server), &storage, &opts, &SilentProgress)
            .await
            .unwrap_err();
        assert!(
            matches!(&err, DatahubError::Storage(msg) if msg.starts_with("partition 0:")),
            "unexpected error: {err}"
        );
        assert_eq!(read_checkpoint(&opts.checkpoint_path).unwrap(), None);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
