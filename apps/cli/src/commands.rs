//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use housing_core::pipeline::{
    PipelineOptions, PipelineStage, PipelineSummary, ProgressReporter, run_agency_pipeline,
};
use housing_core::run_wiki_pipeline;
use housing_crawler::{AgencyApi, FetchClient, WikiApi};
use housing_shared::{
    AppConfig, EntityKind, FetchConfig, ListingId, init_config, load_config, load_config_from,
    validate_agency_config,
};
use housing_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Housing datahub: normalized estate data from the agency API and wiki.
#[derive(Parser)]
#[command(
    name = "housing-datahub",
    version,
    about = "Crawl bilingual estate data into a local database and extract wiki tables.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.housing-datahub/housing-datahub.toml).
    #[arg(long, global = true, env = "HOUSING_DATAHUB_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the partitioned agency pipeline.
    Agency {
        /// Re-run discovery even if a listing id list exists.
        #[arg(long)]
        refresh_ids: bool,

        /// Partition to start from (overrides the checkpoint).
        #[arg(long)]
        start_partition: Option<usize>,

        /// Stop after this many partitions.
        #[arg(long)]
        max_partitions: Option<usize>,
    },

    /// Fetch wiki pages for every stored estate.
    Wiki,

    /// Print the tables of a local markup file as CSV.
    Tables {
        /// Wikitext or HTML file.
        file: PathBuf,
    },

    /// Show row counts and recent pipeline runs.
    Status,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "housing=info",
        1 => "housing=debug",
        _ => "housing=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Agency {
            refresh_ids,
            start_partition,
            max_partitions,
        } => cmd_agency(config_path, refresh_ids, start_partition, max_partitions).await,
        Command::Wiki => cmd_wiki(config_path).await,
        Command::Tables { file } => cmd_tables(&file),
        Command::Status => cmd_status(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

fn db_path(config: &AppConfig) -> PathBuf {
    config.storage.resolve(&config.storage.db_file)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_agency(
    config_path: Option<&Path>,
    refresh_ids: bool,
    start_partition: Option<usize>,
    max_partitions: Option<usize>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    validate_agency_config(&config)?;

    let client = FetchClient::new(FetchConfig::from(&config))?;
    let api = AgencyApi::new(client, config.agency_api.clone());
    let storage = Storage::open(&db_path(&config))
        .await?
        .with_policy(config.storage.conflict_policy);

    let opts = PipelineOptions {
        refresh_ids,
        start_partition,
        max_partitions,
        ..PipelineOptions::from(&config)
    };
    info!(
        db = %db_path(&config).display(),
        partition_size = opts.partition_size,
        policy = ?storage.policy(),
        refresh_ids,
        "running agency pipeline"
    );

    let reporter = CliProgress::new();
    let summary = run_agency_pipeline(&api, &storage, &opts, &reporter).await?;

    println!();
    println!("  Agency pipeline finished");
    println!("  Listings:   {}", summary.listing_count);
    println!("  Partitions: {}", summary.partitions_run);
    println!("  Merged:     {}", summary.records_merged);
    println!("  Skipped:    {}", summary.records_skipped);
    println!("  Rows:       {}", summary.rows_written);
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_wiki(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let client = FetchClient::new(FetchConfig::for_wiki(&config))?;
    let api = WikiApi::new(client, config.wiki_api.endpoint());
    let storage = Storage::open(&db_path(&config)).await?;
    let out = config.storage.resolve(&config.storage.wiki_output_file);

    let spinner = spinner();
    spinner.set_message("Fetching wiki pages");
    let written = run_wiki_pipeline(&storage, &api, &out).await;
    spinner.finish_and_clear();
    let written = written?;

    println!("Wrote {written} wiki pages to {}", out.display());
    Ok(())
}

fn cmd_tables(file: &Path) -> Result<()> {
    let markup = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;

    let tables = housing_wikitable::tables_to_csv(&markup);
    if tables.is_empty() {
        println!("no tables found in {}", file.display());
        return Ok(());
    }
    for (i, csv) in tables.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print!("{csv}");
    }
    Ok(())
}

async fn cmd_status(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = Storage::open_readonly(&db_path(&config)).await?;

    println!("Rows:");
    for kind in EntityKind::ALL {
        let count = storage.count_rows(kind).await?;
        println!("  {:<28} {count}", kind.table());
    }

    let runs = storage.recent_runs(5).await?;
    println!();
    if runs.is_empty() {
        println!("No recorded runs.");
        return Ok(());
    }
    println!("Recent runs:");
    for run in runs {
        let seconds = (run.finished_at - run.started_at).num_seconds();
        println!(
            "  {}  {:<7} partitions={:<4} rows={:<8} {seconds}s",
            run.finished_at.format("%Y-%m-%d %H:%M:%S"),
            run.pipeline,
            run.partitions,
            run.rows_written,
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    spinner.set_style(style);
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self { spinner: spinner() }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: &PipelineStage) {
        self.spinner.set_message(stage.to_string());
    }

    fn record_merged(&self, id: &ListingId, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Merging [{current}/{total}] {id}"));
    }

    fn done(&self, _summary: &PipelineSummary) {
        self.spinner.finish_and_clear();
    }
}
