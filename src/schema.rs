//! Normalized record shapes
//!
//! Every record is independent and append-only; nothing mutates a record once
//! it has been extracted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One normalized record, shape depends on the source
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractedRecord {
    /// Passed through unchanged; the origin owns this format
    CourseOffering(Value),
    Degree(DegreeRecord),
    Requirement(RequirementRecord),
    Teacher(TeacherRecord),
}

/// A row of the degree list table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DegreeRecord {
    pub code: String,
    pub name: String,
    pub id: String,
    pub start_term: String,
}

/// Sub-region of a degree audit document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    Requirements,
    Conditions,
    Reuse,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Requirements, Section::Conditions, Section::Reuse];

    pub fn slug(self) -> &'static str {
        match self {
            Section::Requirements => "requirements",
            Section::Conditions => "conditions",
            Section::Reuse => "reuse",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Requirements => write!(f, "Requirements"),
            Section::Conditions => write!(f, "Conditions"),
            Section::Reuse => write!(f, "Reuse"),
        }
    }
}

/// A heading found in one audit section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementRecord {
    pub section: Section,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Instructor rating summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub avg_difficulty: f64,
    pub avg_rating: f64,
    pub department: String,
    pub num_ratings: i64,
    pub would_take_again_percent: f64,
}

impl TeacherRecord {
    /// Build from a ratings search `node`, coercing numeric fields.
    ///
    /// Missing, null or empty numeric fields become 0. Returns `None` when a
    /// numeric field holds something that is not a number.
    pub fn from_node(node: &Value) -> Option<Self> {
        Some(Self {
            id: text_field(node, "id"),
            first_name: text_field(node, "firstName"),
            last_name: text_field(node, "lastName"),
            avg_difficulty: float_field(node, "avgDifficulty")?,
            avg_rating: float_field(node, "avgRating")?,
            department: text_field(node, "department"),
            num_ratings: int_field(node, "numRatings")?,
            would_take_again_percent: float_field(node, "wouldTakeAgainPercent")?,
        })
    }
}

fn text_field(node: &Value, key: &str) -> String {
    match node.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn float_field(node: &Value, key: &str) -> Option<f64> {
    match node.get(key) {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => Some(0.0),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    }
}

fn int_field(node: &Value, key: &str) -> Option<i64> {
    match node.get(key) {
        None | Some(Value::Null) => Some(0),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(Value::String(s)) if s.trim().is_empty() => Some(0),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    }
}
