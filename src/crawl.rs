//! Resumable fetch loop
//!
//! Replays one request per identifier, strictly sequentially, persisting each
//! raw response before moving on. An identifier whose artifact already exists
//! is skipped, so an interrupted run resumes where it stopped and a rerun after
//! a fix retries exactly the identifiers that failed.

use crate::config::{RunConfig, Source, SubstitutionStrategy};
use crate::error::{FetchFailure, HarvestError};
use crate::identifiers;
use crate::session::{self, Body, RequestTemplate};
use crate::store::{ArtifactStore, DirStore};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use reqwest::{Client, Method};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Headers the HTTP client manages itself; never replayed from a transcript
const TRANSPORT_HEADERS: &[&str] = &["host", "content-length", "accept-encoding", "connection"];

#[derive(Args)]
pub struct FetchArgs {
    /// YAML run configuration (flags below override it)
    #[arg(long, short, env = "HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Endpoint being crawled; sets prefix, extension and substitution defaults
    #[arg(long, value_enum)]
    pub source: Option<Source>,

    /// Captured curl command or raw HTTP request
    #[arg(long, env = "HARVEST_TRANSCRIPT")]
    pub transcript: Option<PathBuf>,

    /// Identifier list, one per line
    #[arg(long = "ids", value_name = "FILE")]
    pub identifiers: Option<PathBuf>,

    /// Artifact directory
    #[arg(long, short)]
    pub out_dir: Option<PathBuf>,

    /// Token replaced by the identifier (query parameter name with --strategy query)
    #[arg(long)]
    pub placeholder: Option<String>,

    #[arg(long, value_enum)]
    pub strategy: Option<SubstitutionStrategy>,

    /// Scheme and host for transcripts that only carry a path
    #[arg(long, env = "HARVEST_ORIGIN")]
    pub origin: Option<String>,

    /// Seconds to wait between requests
    #[arg(long)]
    pub delay: Option<f64>,

    /// Artifact file name prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Artifact file extension
    #[arg(long)]
    pub extension: Option<String>,
}

impl FetchArgs {
    /// Config file (if any) with flag overrides applied
    pub fn resolve_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(path) = &self.transcript {
            config.transcript = path.clone();
        }
        if let Some(path) = &self.identifiers {
            config.identifiers = path.clone();
        }
        if let Some(dir) = &self.out_dir {
            config.artifact_dir = dir.clone();
        }
        if let Some(placeholder) = &self.placeholder {
            config.placeholder = Some(placeholder.clone());
        }
        if let Some(strategy) = self.strategy {
            config.strategy = Some(strategy);
        }
        if let Some(origin) = &self.origin {
            config.origin = Some(origin.clone());
        }
        if let Some(delay) = self.delay {
            config.delay_secs = delay;
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = Some(prefix.clone());
        }
        if let Some(extension) = &self.extension {
            config.extension = Some(extension.clone());
        }
        Ok(config)
    }
}

/// JSON printed on stdout after a run
#[derive(Debug, Serialize)]
pub struct FetchOutput {
    pub source: Source,
    pub artifact_dir: String,
    #[serde(flatten)]
    pub summary: RunSummary,
    pub started: String,
    pub finished: String,
}

/// Run the fetch command
pub async fn run_fetch(args: FetchArgs) -> Result<()> {
    let config = args.resolve_config()?;

    let transcript = tokio::fs::read_to_string(&config.transcript)
        .await
        .with_context(|| format!("Failed to read transcript: {}", config.transcript.display()))?;
    let template = session::parse(&transcript)?;

    let identifiers = identifiers::load(&config.identifiers)?;
    if identifiers.is_empty() {
        bail!("No identifiers found in {}", config.identifiers.display());
    }

    let plan = FetchPlan::new(
        template,
        config.substitution(),
        config.origin()?,
        config.delay()?,
    )?;
    let store = DirStore::open(&config.artifact_dir, config.prefix(), config.extension())?;
    let client = build_client().context("Failed to build HTTP client")?;

    info!(
        source = %config.source,
        identifiers = identifiers.len(),
        dir = %config.artifact_dir.display(),
        delay_secs = config.delay_secs,
        "starting crawl"
    );

    let started = Utc::now();
    let summary = run(&client, &plan, &identifiers, &store).await?;

    info!(
        fetched = summary.fetched,
        skipped = summary.skipped,
        failed = summary.failed,
        "crawl finished"
    );

    let output = FetchOutput {
        source: config.source,
        artifact_dir: config.artifact_dir.display().to_string(),
        summary,
        started: started.to_rfc3339(),
        finished: Utc::now().to_rfc3339(),
    };
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}

/// How an identifier is injected into the template, fixed per source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    /// Replace every occurrence of `placeholder` in URL, header values and body
    Replace { placeholder: String },
    /// Set query parameter `name` to the identifier
    QueryParam { name: String },
}

/// One concrete request, derived from the template for a single identifier
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTask {
    pub identifier: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Body>,
}

/// Run-wide request settings, validated once before the first request
#[derive(Debug, Clone)]
pub struct FetchPlan {
    template: RequestTemplate,
    method: Method,
    cookie_header: Option<String>,
    substitution: Substitution,
    origin: Option<Url>,
    delay: Duration,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FetchFailure>,
}

impl FetchPlan {
    pub fn new(
        template: RequestTemplate,
        substitution: Substitution,
        origin: Option<Url>,
        delay: Duration,
    ) -> Result<Self, HarvestError> {
        let method = Method::from_bytes(template.method.as_bytes()).map_err(|_| {
            HarvestError::MalformedTranscript(format!("invalid HTTP method {:?}", template.method))
        })?;
        let cookie_header = template.cookie_header();
        let plan = Self {
            template,
            method,
            cookie_header,
            substitution,
            origin,
            delay,
        };
        // Fail before any request if the URL can never resolve
        plan.resolve_url(&plan.template.base_url)?;
        Ok(plan)
    }

    /// Derive the concrete request for `identifier`
    pub fn task(&self, identifier: &str) -> Result<FetchTask, HarvestError> {
        let template = &self.template;
        match &self.substitution {
            Substitution::Replace { placeholder } => {
                let url = self.resolve_url(&template.base_url.replace(placeholder, identifier))?;
                let headers = template
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.replace(placeholder, identifier)))
                    .collect();
                let body = template
                    .body
                    .as_ref()
                    .map(|b| substitute_body(b, placeholder, identifier));
                Ok(FetchTask {
                    identifier: identifier.to_string(),
                    url,
                    headers,
                    body,
                })
            }
            Substitution::QueryParam { name } => {
                let mut url = self.resolve_url(&template.base_url)?;
                set_query_param(&mut url, name, identifier);
                Ok(FetchTask {
                    identifier: identifier.to_string(),
                    url,
                    headers: template.headers.clone(),
                    body: template.body.clone(),
                })
            }
        }
    }

    fn resolve_url(&self, raw: &str) -> Result<Url, HarvestError> {
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.origin {
                Some(origin) => origin.join(raw).map_err(|e| {
                    HarvestError::InvalidConfig(format!("cannot join {:?} onto {}: {}", raw, origin, e))
                }),
                None => Err(HarvestError::InvalidConfig(format!(
                    "template URL {:?} is relative and no origin is configured",
                    raw
                ))),
            },
            Err(e) => Err(HarvestError::InvalidConfig(format!(
                "invalid template URL {:?}: {}",
                raw, e
            ))),
        }
    }
}

/// HTTP client for replay; transport defaults, no timeouts beyond them
pub fn build_client() -> reqwest::Result<Client> {
    Client::builder().build()
}

/// Fetch every identifier not yet present in `store`
///
/// Per-identifier failures are recorded and the run continues. Only a failing
/// store write aborts, since the checkpoint could no longer be trusted.
pub async fn run<S: ArtifactStore>(
    client: &Client,
    plan: &FetchPlan,
    identifiers: &[String],
    store: &S,
) -> Result<RunSummary, HarvestError> {
    let total = identifiers.len();
    let mut summary = RunSummary::default();
    let mut requested = false;

    for (index, identifier) in identifiers.iter().enumerate() {
        let n = index + 1;

        if store.exists(identifier) {
            debug!(identifier = %identifier, n, total, "artifact present, skipping");
            summary.skipped += 1;
            continue;
        }

        let task = match plan.task(identifier) {
            Ok(task) => task,
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "cannot build request");
                record_failure(
                    &mut summary,
                    FetchFailure {
                        identifier: identifier.clone(),
                        status: None,
                        error: Some(e.to_string()),
                    },
                );
                continue;
            }
        };

        // Pace between consecutive requests, never before the first
        if requested && !plan.delay.is_zero() {
            tokio::time::sleep(plan.delay).await;
        }
        requested = true;

        info!(identifier = %identifier, n, total, url = %task.url, "fetching");
        match fetch_one(client, plan, &task).await {
            Ok(body) => {
                let path = store.write(identifier, &body)?;
                info!(
                    identifier = %identifier,
                    bytes = body.len(),
                    path = %path.display(),
                    "saved"
                );
                summary.fetched += 1;
            }
            Err(failure) => {
                warn!(
                    identifier = %identifier,
                    status = ?failure.status,
                    error = ?failure.error,
                    "fetch failed"
                );
                record_failure(&mut summary, failure);
            }
        }
    }

    Ok(summary)
}

fn record_failure(summary: &mut RunSummary, failure: FetchFailure) {
    summary.failed += 1;
    summary.failures.push(failure);
}

async fn fetch_one(client: &Client, plan: &FetchPlan, task: &FetchTask) -> Result<Vec<u8>, FetchFailure> {
    let transport_failure = |e: reqwest::Error| FetchFailure {
        identifier: task.identifier.clone(),
        status: None,
        error: Some(e.to_string()),
    };

    let mut request = client.request(plan.method.clone(), task.url.clone());
    for (key, value) in &task.headers {
        if TRANSPORT_HEADERS.contains(&key.to_ascii_lowercase().as_str()) {
            continue;
        }
        request = request.header(key.as_str(), value.as_str());
    }
    if let Some(cookie) = &plan.cookie_header {
        request = request.header(reqwest::header::COOKIE, cookie.as_str());
    }
    match &task.body {
        Some(Body::Json(value)) => request = request.json(value),
        Some(Body::Raw(text)) => request = request.body(text.clone()),
        None => {}
    }

    let response = request.send().await.map_err(transport_failure)?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchFailure {
            identifier: task.identifier.clone(),
            status: Some(status.as_u16()),
            error: status.canonical_reason().map(String::from),
        });
    }

    // Full body is buffered before the store sees it
    let bytes = response.bytes().await.map_err(transport_failure)?;
    Ok(bytes.to_vec())
}

fn substitute_body(body: &Body, placeholder: &str, identifier: &str) -> Body {
    match body {
        Body::Json(value) => Body::Json(substitute_json(value, placeholder, identifier)),
        Body::Raw(text) => Body::Raw(text.replace(placeholder, identifier)),
    }
}

fn substitute_json(value: &serde_json::Value, placeholder: &str, identifier: &str) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::String(s) => Value::String(s.replace(placeholder, identifier)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| substitute_json(v, placeholder, identifier))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_json(v, placeholder, identifier)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Set `name=value`, replacing any existing occurrence of `name`
fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(name, value);
}
