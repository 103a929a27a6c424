//! Run configuration
//!
//! One explicit `RunConfig` replaces the working-directory-relative paths the
//! harvesting steps used to agree on implicitly. Loaded from YAML, then
//! overridden by CLI flags.

use crate::crawl::Substitution;
use crate::error::HarvestError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default politeness delay between requests, in seconds
pub const DEFAULT_DELAY_SECS: f64 = 15.0;

/// Which origin endpoint a run targets; fixes storage and substitution defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Course offerings JSON, one shard per subject code
    Courses,
    /// Degree list HTML pages
    Degrees,
    /// Degree-audit HTML, one shard per degree ID
    Audit,
    /// Instructor ratings GraphQL JSON
    Teachers,
}

impl Source {
    pub fn prefix(self) -> &'static str {
        match self {
            Source::Courses => "courses",
            Source::Degrees => "degrees",
            Source::Audit => "audit",
            Source::Teachers => "teachers",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Source::Courses | Source::Teachers => "json",
            Source::Degrees | Source::Audit => "html",
        }
    }

    pub fn strategy(self) -> SubstitutionStrategy {
        match self {
            Source::Audit => SubstitutionStrategy::Query,
            _ => SubstitutionStrategy::Replace,
        }
    }

    /// Placeholder token, or query parameter name for the query strategy
    pub fn placeholder(self) -> &'static str {
        match self {
            Source::Audit => "degreeID",
            _ => "{id}",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// How the identifier enters the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionStrategy {
    /// Replace the placeholder token in the URL and body
    Replace,
    /// Set the identifier as a query parameter named by the placeholder
    Query,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub source: Source,
    /// Captured curl or raw HTTP request
    pub transcript: PathBuf,
    /// One identifier per line
    pub identifiers: PathBuf,
    pub artifact_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SubstitutionStrategy>,
    /// Scheme and host for transcripts that only carry a path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub delay_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source: Source::Courses,
            transcript: PathBuf::from("curl.txt"),
            identifiers: PathBuf::from("identifiers.txt"),
            artifact_dir: PathBuf::from("data"),
            placeholder: None,
            strategy: None,
            origin: None,
            delay_secs: DEFAULT_DELAY_SECS,
            prefix: None,
            extension: None,
        }
    }
}

impl RunConfig {
    /// Load a YAML config file
    pub fn load(path: &Path) -> Result<Self, HarvestError> {
        let content = std::fs::read_to_string(path).map_err(|source| HarvestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
            .map_err(|e| HarvestError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(content: &str) -> Result<Self, HarvestError> {
        serde_yaml::from_str(content).map_err(|e| HarvestError::InvalidConfig(e.to_string()))
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or(self.source.prefix())
    }

    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or(self.source.extension())
    }

    pub fn strategy(&self) -> SubstitutionStrategy {
        self.strategy.unwrap_or(self.source.strategy())
    }

    pub fn placeholder(&self) -> &str {
        self.placeholder.as_deref().unwrap_or(self.source.placeholder())
    }

    pub fn substitution(&self) -> Substitution {
        let token = self.placeholder().to_string();
        match self.strategy() {
            SubstitutionStrategy::Replace => Substitution::Replace { placeholder: token },
            SubstitutionStrategy::Query => Substitution::QueryParam { name: token },
        }
    }

    pub fn delay(&self) -> Result<Duration, HarvestError> {
        Duration::try_from_secs_f64(self.delay_secs).map_err(|_| {
            HarvestError::InvalidConfig(format!(
                "delay_secs must be a non-negative number, got {}",
                self.delay_secs
            ))
        })
    }

    pub fn origin(&self) -> Result<Option<Url>, HarvestError> {
        self.origin
            .as_deref()
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| HarvestError::InvalidConfig(format!("origin {:?}: {}", raw, e)))
            })
            .transpose()
    }
}
