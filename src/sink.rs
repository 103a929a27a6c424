//! Output sinks for aggregated datasets

use crate::aggregate::{ShardFormat, SourcedRecord};
use crate::error::HarvestError;
use crate::schema::{ExtractedRecord, Section};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// One document with a single named array field
    #[default]
    Json,
    /// Fixed-header CSV
    Csv,
}

const DEGREE_HEADER: [&str; 4] = ["Degree Code", "Name", "ID", "Start Term"];
const TEACHER_HEADER: [&str; 8] = [
    "id",
    "firstName",
    "lastName",
    "avgDifficulty",
    "avgRating",
    "department",
    "numRatings",
    "wouldTakeAgainPercent",
];
const REQUIREMENT_HEADER: [&str; 3] = ["Degree ID", "Title", "Link"];

/// Write `{ "<field>": [...] }`
pub fn write_json_document(
    path: &Path,
    format: ShardFormat,
    records: &[SourcedRecord],
) -> Result<Vec<PathBuf>, HarvestError> {
    let items: Vec<Value> = records.iter().map(record_json).collect();
    let mut doc = serde_json::Map::new();
    doc.insert(format.record_field().to_string(), Value::Array(items));

    let content = serde_json::to_string_pretty(&Value::Object(doc))
        .map_err(|e| io_error(path, e.into()))?;
    std::fs::write(path, content).map_err(|e| io_error(path, e))?;
    Ok(vec![path.to_path_buf()])
}

/// Audit requirements keep the degree they were extracted for
fn record_json(sourced: &SourcedRecord) -> Value {
    let mut value = serde_json::to_value(&sourced.record).unwrap_or(Value::Null);
    if let (ExtractedRecord::Requirement(_), Value::Object(map)) = (&sourced.record, &mut value) {
        map.insert("degreeId".to_string(), Value::String(sourced.shard.clone()));
    }
    value
}

/// Write fixed-header CSV. Audit data produces one file per section.
pub fn write_csv(
    path: &Path,
    format: ShardFormat,
    records: &[SourcedRecord],
) -> Result<Vec<PathBuf>, HarvestError> {
    match format {
        ShardFormat::Courses => Err(HarvestError::InvalidConfig(
            "course offerings have no fixed columns; use --format json".to_string(),
        )),
        ShardFormat::Degrees => {
            let rows = records.iter().filter_map(|r| match &r.record {
                ExtractedRecord::Degree(d) => Some(vec![
                    d.code.clone(),
                    d.name.clone(),
                    d.id.clone(),
                    d.start_term.clone(),
                ]),
                _ => None,
            });
            write_rows(path, &DEGREE_HEADER, rows)?;
            Ok(vec![path.to_path_buf()])
        }
        ShardFormat::Teachers => {
            let rows = records.iter().filter_map(|r| match &r.record {
                ExtractedRecord::Teacher(t) => Some(vec![
                    t.id.clone(),
                    t.first_name.clone(),
                    t.last_name.clone(),
                    t.avg_difficulty.to_string(),
                    t.avg_rating.to_string(),
                    t.department.clone(),
                    t.num_ratings.to_string(),
                    t.would_take_again_percent.to_string(),
                ]),
                _ => None,
            });
            write_rows(path, &TEACHER_HEADER, rows)?;
            Ok(vec![path.to_path_buf()])
        }
        ShardFormat::Audit => {
            let mut written = Vec::with_capacity(Section::ALL.len());
            for section in Section::ALL {
                let section_path = section_path(path, section);
                let rows = records.iter().filter_map(|r| match &r.record {
                    ExtractedRecord::Requirement(req) if req.section == section => Some(vec![
                        r.shard.clone(),
                        req.title.clone(),
                        req.link.clone().unwrap_or_default(),
                    ]),
                    _ => None,
                });
                write_rows(&section_path, &REQUIREMENT_HEADER, rows)?;
                written.push(section_path);
            }
            Ok(written)
        }
    }
}

/// `out/audit.csv` -> `out/audit_conditions.csv`
pub fn section_path(path: &Path, section: Section) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "requirements".to_string());
    path.with_file_name(format!("{}_{}.csv", stem, section.slug()))
}

fn write_rows(
    path: &Path,
    header: &[&str],
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<(), HarvestError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| io_error(path, e.into()))?;
    writer
        .write_record(header)
        .map_err(|e| io_error(path, e.into()))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| io_error(path, e.into()))?;
    }
    writer.flush().map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, source: std::io::Error) -> HarvestError {
    HarvestError::Io {
        path: path.to_path_buf(),
        source,
    }
}
