//! Shard aggregation: merge per-identifier artifacts into one dataset
//!
//! Each shard contributes records that depend only on its own content. A shard
//! that cannot be read or parsed is excluded and reported; it never stops the
//! remaining shards from being merged.
//!
//! Order follows directory listing and is not guaranteed across platforms.

use crate::config::Source;
use crate::error::{HarvestError, ShardParseError};
use crate::extract::{audit_schema, degree_schema, extract};
use crate::schema::{ExtractedRecord, TeacherRecord};
use crate::sink::{write_csv, write_json_document, OutputFormat};
use crate::store::shard_key;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Args)]
pub struct AggregateArgs {
    /// Directory of shards written by `fetch`
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Which endpoint produced the shards
    #[arg(long, short, value_enum)]
    pub source: Source,

    /// Output file (default: combined_<source>.<format>)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Shard file name prefix, as given to `fetch --prefix` (default: source name)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Shard file extension (default depends on source)
    #[arg(long)]
    pub extension: Option<String>,
}

/// Summary printed on stdout
#[derive(Debug, Serialize)]
pub struct AggregateOutput {
    pub source: Source,
    pub aggregated: usize,
    pub records: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<ShardParseError>,
    pub outputs: Vec<String>,
}

/// Run the aggregate command
pub async fn run_aggregate(args: AggregateArgs) -> Result<()> {
    let format = ShardFormat::for_source(args.source);
    let extension = args
        .extension
        .clone()
        .unwrap_or_else(|| args.source.extension().to_string());
    let output = args.output.clone().unwrap_or_else(|| {
        let ext = match args.format {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        };
        PathBuf::from(format!("combined_{}.{}", args.source, ext))
    });

    let prefix = args
        .prefix
        .clone()
        .unwrap_or_else(|| args.source.prefix().to_string());

    let aggregation = aggregate(&args.dir, &prefix, &extension, format)?;

    let written = match args.format {
        OutputFormat::Json => write_json_document(&output, format, &aggregation.records)?,
        OutputFormat::Csv => write_csv(&output, format, &aggregation.records)?,
    };

    let summary = AggregateOutput {
        source: args.source,
        aggregated: aggregation.aggregated,
        records: aggregation.records.len(),
        excluded: aggregation.excluded,
        outputs: written.iter().map(|p| p.display().to_string()).collect(),
    };
    println!("{}", serde_json::to_string(&summary)?);

    Ok(())
}

/// How shard contents are turned into records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardFormat {
    /// JSON with a `courseOfferings` array, passed through
    Courses,
    /// Ratings search JSON, `data.search.teachers.edges[].node`
    Teachers,
    /// Degree list HTML
    Degrees,
    /// Degree audit HTML
    Audit,
}

impl ShardFormat {
    pub fn for_source(source: Source) -> Self {
        match source {
            Source::Courses => ShardFormat::Courses,
            Source::Teachers => ShardFormat::Teachers,
            Source::Degrees => ShardFormat::Degrees,
            Source::Audit => ShardFormat::Audit,
        }
    }

    /// Name of the array field in a JSON dataset document
    pub fn record_field(self) -> &'static str {
        match self {
            ShardFormat::Courses => "courseOfferings",
            ShardFormat::Teachers => "teachers",
            ShardFormat::Degrees => "degrees",
            ShardFormat::Audit => "requirements",
        }
    }
}

/// A record together with the shard key it came from
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedRecord {
    pub shard: String,
    pub record: ExtractedRecord,
}

#[derive(Debug, Default)]
pub struct Aggregation {
    pub records: Vec<SourcedRecord>,
    /// Shards that contributed (possibly zero records)
    pub aggregated: usize,
    pub excluded: Vec<ShardParseError>,
}

/// Merge every `<prefix>_*.<extension>` shard in `dir`
pub fn aggregate(
    dir: &Path,
    prefix: &str,
    extension: &str,
    format: ShardFormat,
) -> Result<Aggregation, HarvestError> {
    let shards = list_shards(dir, prefix, extension)?;
    let mut aggregation = Aggregation::default();

    for entry in shards {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "unreadable directory entry");
                aggregation.excluded.push(ShardParseError {
                    shard: e.path().display().to_string(),
                    reason: e.error().to_string(),
                });
                continue;
            }
        };
        let Some(key) = shard_key(&path, prefix) else {
            debug!(file = %path.display(), "not a shard of this prefix");
            continue;
        };

        match parse_shard(&path, format) {
            Ok(records) => {
                debug!(shard = %key, records = records.len(), "shard merged");
                aggregation.aggregated += 1;
                aggregation
                    .records
                    .extend(records.into_iter().map(|record| SourcedRecord {
                        shard: key.clone(),
                        record,
                    }));
            }
            Err(reason) => {
                warn!(shard = %path.display(), reason = %reason, "shard excluded");
                aggregation.excluded.push(ShardParseError {
                    shard: path.display().to_string(),
                    reason,
                });
            }
        }
    }

    info!(
        shards = aggregation.aggregated,
        excluded = aggregation.excluded.len(),
        records = aggregation.records.len(),
        "aggregation complete"
    );
    Ok(aggregation)
}

fn list_shards(dir: &Path, prefix: &str, extension: &str) -> Result<glob::Paths, HarvestError> {
    if !dir.is_dir() {
        return Err(HarvestError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }
    let dir_str = dir.to_str().ok_or_else(|| {
        HarvestError::InvalidConfig(format!("non UTF-8 directory {}", dir.display()))
    })?;
    let pattern = PathBuf::from(glob::Pattern::escape(dir_str))
        .join(format!(
            "{}_*.{}",
            glob::Pattern::escape(prefix),
            extension.trim_start_matches('.')
        ));
    let pattern = pattern.to_string_lossy().into_owned();
    glob::glob(&pattern)
        .map_err(|e| HarvestError::InvalidConfig(format!("bad shard pattern {:?}: {}", pattern, e)))
}

fn parse_shard(path: &Path, format: ShardFormat) -> Result<Vec<ExtractedRecord>, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    match format {
        ShardFormat::Courses => {
            let doc: Value = serde_json::from_str(&content).map_err(|e| e.to_string())?;
            Ok(courses_from_json(&doc))
        }
        ShardFormat::Teachers => {
            let doc: Value = serde_json::from_str(&content).map_err(|e| e.to_string())?;
            Ok(teachers_from_json(&doc))
        }
        ShardFormat::Degrees => Ok(extract(&content, &degree_schema())),
        ShardFormat::Audit => Ok(extract(&content, &audit_schema())),
    }
}

/// Course offerings pass through; a missing key yields nothing
pub fn courses_from_json(doc: &Value) -> Vec<ExtractedRecord> {
    doc.get("courseOfferings")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .cloned()
                .map(ExtractedRecord::CourseOffering)
                .collect()
        })
        .unwrap_or_default()
}

/// Teacher nodes of a ratings search response; rows with unusable numbers are skipped
pub fn teachers_from_json(doc: &Value) -> Vec<ExtractedRecord> {
    let Some(edges) = doc
        .pointer("/data/search/teachers/edges")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    edges
        .iter()
        .filter_map(|edge| {
            let node = edge.get("node")?;
            let teacher = TeacherRecord::from_node(node);
            if teacher.is_none() {
                warn!(node = %node, "could not convert numeric fields, skipping teacher");
            }
            teacher
        })
        .map(ExtractedRecord::Teacher)
        .collect()
}
