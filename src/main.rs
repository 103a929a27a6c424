//! harvest CLI
//!
//! Replays a captured browser session against an identifier list and turns
//! the responses into flat datasets.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use course_harvest::aggregate::{run_aggregate, AggregateArgs};
use course_harvest::crawl::{run_fetch, FetchArgs};
use course_harvest::identifiers::{run_ids, IdsArgs};
use course_harvest::init::{run_init, InitArgs};
use course_harvest::session::{run_inspect, InspectArgs};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(version)]
#[command(about = "Replay captured sessions to harvest course, degree and rating data")]
#[command(long_about = "One request in flight at a time, paced, resumable.\n\nCommands:\n  init       Write a harvest.yaml template\n  inspect    Show the request reconstructed from a transcript\n  ids        Build identifier lists\n  fetch      Crawl every identifier, skipping finished ones\n  aggregate  Merge shards into one dataset")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a harvest.yaml template
    Init(InitArgs),
    /// Parse a transcript and print the reconstructed request
    Inspect(InspectArgs),
    /// Build identifier lists (subject codes, degree IDs)
    Ids(IdsArgs),
    /// Fetch one artifact per identifier, resuming where a previous run stopped
    Fetch(FetchArgs),
    /// Merge per-identifier shards into a single CSV or JSON dataset
    Aggregate(AggregateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init(args) => run_init(args).await,
        Commands::Inspect(args) => run_inspect(args).await,
        Commands::Ids(args) => run_ids(args).await,
        Commands::Fetch(args) => run_fetch(args).await,
        Commands::Aggregate(args) => run_aggregate(args).await,
    }
}
