//! Session descriptor: turn a captured request transcript into a replayable template
//!
//! Two capture dialects are accepted:
//! - a `curl` command line (bash or Windows cmd flavour, possibly split across lines)
//! - a raw HTTP request (`METHOD PATH` line followed by `Name: value` headers)

use crate::error::HarvestError;
use anyhow::{Context, Result};
use clap::Args;
use regex::Regex;
use serde::Serialize;
use std::iter::Peekable;
use std::path::PathBuf;
use std::str::Chars;
use std::sync::LazyLock;

static POSIX_CONTINUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\r?\n").expect("static regex"));
static CMD_CONTINUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\^\r?\n").expect("static regex"));

/// curl flags whose argument must be consumed but is otherwise irrelevant
const VALUE_FLAGS: &[&str] = &[
    "-o",
    "--output",
    "-u",
    "--user",
    "-m",
    "--max-time",
    "--connect-timeout",
    "-x",
    "--proxy",
    "-w",
    "--write-out",
    "--retry",
    "-F",
    "--form",
];

#[derive(Args)]
pub struct InspectArgs {
    /// Captured curl command or raw HTTP request
    #[arg(value_name = "FILE")]
    pub transcript: PathBuf,
}

/// Print the parsed template as JSON
pub async fn run_inspect(args: InspectArgs) -> Result<()> {
    let content = tokio::fs::read_to_string(&args.transcript)
        .await
        .with_context(|| format!("Failed to read file: {}", args.transcript.display()))?;
    let template = parse(&content)?;
    println!("{}", serde_json::to_string_pretty(&template)?);
    Ok(())
}

/// Request payload carried verbatim from the transcript
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Body {
    Json(serde_json::Value),
    Raw(String),
}

impl Body {
    /// Parse as JSON when possible, keep the literal text otherwise
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => Body::Json(value),
            Err(_) => Body::Raw(text.to_string()),
        }
    }
}

/// Immutable request template shared by every identifier of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestTemplate {
    pub method: String,
    pub base_url: String,
    /// Insertion order is preserved for wire fidelity
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,
}

impl RequestTemplate {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Rebuild the `Cookie` header value, `None` when no cookies were captured
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        Some(pairs.join("; "))
    }
}

/// Parse a transcript in either dialect
pub fn parse(transcript: &str) -> Result<RequestTemplate, HarvestError> {
    let cleaned = strip_continuations(transcript);
    let is_curl = cleaned
        .split_whitespace()
        .next()
        .is_some_and(|first| first.eq_ignore_ascii_case("curl"));

    if is_curl {
        let tokens = tokenize(&cleaned);
        parse_curl(&tokens[1..])
    } else {
        parse_raw(transcript)
    }
}

/// Split a `k1=v1; k2=v2` cookie string, dropping pairs without `=`
pub fn parse_cookies(cookie_string: &str) -> Vec<(String, String)> {
    let mut cookies = Vec::new();
    merge_cookies(&mut cookies, cookie_string);
    cookies
}

/// Split a `Name: value` header line on the first separator only
pub fn split_header(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(": ").or_else(|| line.split_once(':'))?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

/// Shell-style tokenizer covering the quoting used by browser "copy as cURL"
pub fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                in_token = true;
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                    current.push(c);
                }
            }
            '"' => {
                in_token = true;
                read_double_quoted(&mut chars, &mut current);
            }
            '$' if chars.peek() == Some(&'\'') => {
                chars.next();
                in_token = true;
                read_ansi_c(&mut chars, &mut current);
            }
            '\\' => {
                in_token = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            _ => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    tokens
}

fn read_double_quoted(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    while let Some(c) = chars.next() {
        match c {
            '"' => return,
            '\\' => match chars.peek() {
                Some(&next) if matches!(next, '"' | '\\' | '$' | '`') => {
                    out.push(next);
                    chars.next();
                }
                _ => out.push('\\'),
            },
            _ => out.push(c),
        }
    }
}

fn read_ansi_c(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    while let Some(c) = chars.next() {
        match c {
            '\'' => return,
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            _ => out.push(c),
        }
    }
}

/// Remove line-continuation markers; cmd captures also get their `^` escapes undone
fn strip_continuations(text: &str) -> String {
    if CMD_CONTINUATION.is_match(text) {
        let joined = CMD_CONTINUATION.replace_all(text, "");
        unescape_cmd(&joined)
    } else {
        POSIX_CONTINUATION.replace_all(text, "").into_owned()
    }
}

fn unescape_cmd(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '^' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_curl(args: &[String]) -> Result<RequestTemplate, HarvestError> {
    let mut method: Option<String> = None;
    let mut url: Option<String> = None;
    let mut headers = Vec::new();
    let mut cookies = Vec::new();
    let mut data: Vec<&str> = Vec::new();

    let mut iter = args.iter();
    while let Some(token) = iter.next() {
        match token.as_str() {
            "-H" | "--header" => {
                if let Some(line) = iter.next() {
                    push_header(&mut headers, &mut cookies, line);
                }
            }
            "-b" | "--cookie" => {
                if let Some(value) = iter.next() {
                    merge_cookies(&mut cookies, value);
                }
            }
            "-X" | "--request" => method = iter.next().cloned(),
            "-d" | "--data" | "--data-raw" | "--data-binary" | "--data-ascii" => {
                if let Some(part) = iter.next() {
                    data.push(part);
                }
            }
            "-A" | "--user-agent" => {
                if let Some(value) = iter.next() {
                    upsert(&mut headers, "User-Agent", value);
                }
            }
            "-e" | "--referer" => {
                if let Some(value) = iter.next() {
                    upsert(&mut headers, "Referer", value);
                }
            }
            "--url" => url = iter.next().cloned(),
            flag if VALUE_FLAGS.contains(&flag) => {
                iter.next();
            }
            flag if flag.starts_with('-') => {}
            positional => {
                if url.is_none() {
                    url = Some(positional.to_string());
                }
            }
        }
    }

    let base_url = url
        .ok_or_else(|| HarvestError::MalformedTranscript("curl command has no URL".to_string()))?;
    // Repeated data flags are sent as one body joined with `&`, as curl does
    let body = (!data.is_empty()).then(|| Body::parse(&data.join("&")));
    let default_method = if body.is_some() { "POST" } else { "GET" };
    let method = normalize_method(method.as_deref().unwrap_or(default_method))?;

    Ok(RequestTemplate {
        method,
        base_url,
        headers,
        cookies,
        body,
    })
}

fn parse_raw(transcript: &str) -> Result<RequestTemplate, HarvestError> {
    // Byte offset just past the last consumed line; the body is the untouched remainder
    let mut consumed = 0;
    let mut lines = transcript.split_inclusive('\n').map(|line| {
        consumed += line.len();
        line.trim_end_matches(['\r', '\n'])
    });

    let request_line = lines
        .by_ref()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| HarvestError::MalformedTranscript("transcript is empty".to_string()))?;
    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(m), Some(t)) if t.starts_with('/') || t.contains("://") => (m, t),
        _ => {
            return Err(HarvestError::MalformedTranscript(format!(
                "expected `METHOD PATH` request line, found {:?}",
                request_line
            )))
        }
    };
    let method = normalize_method(method)?;

    let mut headers = Vec::new();
    let mut cookies = Vec::new();
    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        if split_header(line).is_some_and(|(k, _)| k.eq_ignore_ascii_case("host")) {
            continue;
        }
        push_header(&mut headers, &mut cookies, line);
    }

    let body_text = &transcript[consumed..];
    let body = (!body_text.trim().is_empty()).then(|| Body::parse(body_text));

    Ok(RequestTemplate {
        method,
        base_url: target.to_string(),
        headers,
        cookies,
        body,
    })
}

/// Route a header line: cookies are folded into the cookie map, pseudo-headers dropped
fn push_header(
    headers: &mut Vec<(String, String)>,
    cookies: &mut Vec<(String, String)>,
    line: &str,
) {
    match split_header(line) {
        Some((key, _)) if key.starts_with(':') => {}
        Some((key, value)) if key.eq_ignore_ascii_case("cookie") => merge_cookies(cookies, &value),
        Some((key, value)) => upsert(headers, &key, &value),
        None => {}
    }
}

fn merge_cookies(cookies: &mut Vec<(String, String)>, cookie_string: &str) {
    let cookie_string = cookie_string.trim().trim_end_matches(';');
    for pair in cookie_string.split("; ") {
        if let Some((key, value)) = pair.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                upsert(cookies, key, value);
            }
        }
    }
}

/// Later values win but keep the position of the first occurrence
fn upsert(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    match pairs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
        Some(slot) => slot.1 = value.to_string(),
        None => pairs.push((key.to_string(), value.to_string())),
    }
}

fn normalize_method(token: &str) -> Result<String, HarvestError> {
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(token.to_ascii_uppercase())
    } else {
        Err(HarvestError::MalformedTranscript(format!(
            "invalid HTTP method {:?}",
            token
        )))
    }
}
