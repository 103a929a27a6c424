//! course-harvest: replay captured sessions to crawl academic data
//!
//! Commands:
//! - init: write a run configuration template
//! - inspect: show the request reconstructed from a transcript
//! - ids: build identifier lists from saved pages or degree shards
//! - fetch: resumable, paced crawl over an identifier list
//! - aggregate: merge shards into one CSV or JSON dataset

pub mod aggregate;
pub mod config;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod identifiers;
pub mod init;
pub mod schema;
pub mod session;
pub mod sink;
pub mod store;

pub use aggregate::{aggregate, Aggregation, ShardFormat, SourcedRecord};
pub use config::{RunConfig, Source, SubstitutionStrategy};
pub use crawl::{run, FetchPlan, FetchTask, RunSummary, Substitution};
pub use error::{FetchFailure, HarvestError, ShardParseError};
pub use extract::{audit_schema, degree_schema, extract, ExtractionSchema};
pub use schema::{DegreeRecord, ExtractedRecord, RequirementRecord, Section, TeacherRecord};
pub use session::{parse, Body, RequestTemplate};
pub use store::{ArtifactStore, DirStore};
