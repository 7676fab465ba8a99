//! Housing datahub CLI: bilingual estate ingestion and wiki table extraction.
//!
//! Crawls the agency API into a normalized local database and enriches
//! estates with text and tables from their wiki pages.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
