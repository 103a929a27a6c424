//! Identifier enumeration: the ordered tokens that drive a crawl

use crate::aggregate::{aggregate, ShardFormat};
use crate::error::HarvestError;
use crate::schema::ExtractedRecord;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args)]
pub struct IdsArgs {
    #[command(subcommand)]
    pub command: IdsCommand,
}

#[derive(Subcommand)]
pub enum IdsCommand {
    /// Option values of a <select> element in a saved page (e.g. subject codes)
    Select {
        /// Saved HTML page
        #[arg(value_name = "FILE")]
        html: PathBuf,

        /// CSS selector of the <select> element
        #[arg(long, default_value = "select")]
        selector: String,

        /// Write identifiers here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Degree IDs found in fetched degree list pages
    Degrees {
        /// Directory of degree list shards
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Shard file name prefix
        #[arg(long, default_value = "degrees")]
        prefix: String,

        #[arg(long, default_value = "html")]
        extension: String,

        /// Write identifiers here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Run the ids command
pub async fn run_ids(args: IdsArgs) -> Result<()> {
    let (ids, output) = match args.command {
        IdsCommand::Select {
            html,
            selector,
            output,
        } => {
            let content = tokio::fs::read_to_string(&html)
                .await
                .with_context(|| format!("Failed to read file: {}", html.display()))?;
            (from_select_options(&content, &selector)?, output)
        }
        IdsCommand::Degrees {
            dir,
            prefix,
            extension,
            output,
        } => (degree_ids(&dir, &prefix, &extension)?, output),
    };

    let listing: String = ids.iter().map(|id| format!("{}\n", id)).collect();
    match output {
        Some(path) => {
            tokio::fs::write(&path, listing)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(count = ids.len(), file = %path.display(), "identifiers written");
        }
        None => print!("{}", listing),
    }
    Ok(())
}

/// One token per line, trimmed, blank lines dropped. No dedup, no validation.
pub fn enumerate(source: &str) -> Vec<String> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Read an identifier list file
pub fn load(path: &Path) -> Result<Vec<String>, HarvestError> {
    let content = std::fs::read_to_string(path).map_err(|source| HarvestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(enumerate(&content))
}

/// Collect the `value` of every `<option>` inside the first element matching `selector`
pub fn from_select_options(html: &str, selector: &str) -> Result<Vec<String>, HarvestError> {
    let select_sel = Selector::parse(selector)
        .map_err(|e| HarvestError::InvalidConfig(format!("bad selector {:?}: {}", selector, e)))?;
    let option_sel = Selector::parse("option").expect("static selector");

    let doc = Html::parse_document(html);
    let Some(select) = doc.select(&select_sel).next() else {
        return Ok(Vec::new());
    };

    Ok(select
        .select(&option_sel)
        .filter_map(|opt| opt.value().attr("value"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect())
}

/// Unique degree IDs across degree list shards, in first-seen order
pub fn degree_ids(dir: &Path, prefix: &str, extension: &str) -> Result<Vec<String>, HarvestError> {
    let aggregation = aggregate(dir, prefix, extension, ShardFormat::Degrees)?;
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for sourced in aggregation.records {
        if let ExtractedRecord::Degree(degree) = sourced.record {
            if seen.insert(degree.id.clone()) {
                ids.push(degree.id);
            }
        }
    }
    Ok(ids)
}
