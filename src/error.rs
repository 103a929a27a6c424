//! Error taxonomy
//!
//! Only `HarvestError` is ever returned as `Err`. Per-identifier and per-shard
//! problems are plain values collected into summaries so one bad unit never
//! aborts a batch.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// No method + URL could be recovered from the transcript
    #[error("malformed transcript: {0}")]
    MalformedTranscript(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact store could not persist a checkpoint
    #[error("failed to persist artifact for {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single identifier that could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub identifier: String,
    /// HTTP status when the origin answered, `None` on transport errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A shard excluded from aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardParseError {
    pub shard: String,
    pub reason: String,
}
