//! init command: Create a harvest.yaml template
//!
//! Writes a run configuration pre-filled with the defaults of one source.

use crate::config::{RunConfig, Source};
use anyhow::{bail, Result};
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

const HEADER: &str = "\
# harvest run configuration
#
# transcript:  captured request (curl command or raw HTTP), with the placeholder
#              token where the identifier goes
# identifiers: one identifier per line
# strategy:    replace (placeholder in URL/body) or query (placeholder names a
#              query parameter)
# origin:      scheme + host, only needed when the transcript carries a bare path
";

#[derive(Args)]
pub struct InitArgs {
    /// Output file path (default: harvest.yaml)
    #[arg(short, long, default_value = "harvest.yaml")]
    pub output: PathBuf,

    /// Source whose defaults pre-fill the template
    #[arg(long, short, value_enum, default_value = "courses")]
    pub source: Source,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub created: String,
    pub file: String,
}

/// Template config for `source`, with its implicit defaults spelled out
pub fn template_config(source: Source) -> RunConfig {
    RunConfig {
        source,
        artifact_dir: PathBuf::from(format!("data/{}", source.prefix())),
        placeholder: Some(source.placeholder().to_string()),
        strategy: Some(source.strategy()),
        ..RunConfig::default()
    }
}

pub async fn run_init(args: InitArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        let error = serde_json::json!({
            "error": "file_exists",
            "message": format!("{} already exists. Use --force to overwrite.", args.output.display()),
            "file": args.output.display().to_string()
        });
        println!("{}", serde_json::to_string(&error)?);
        bail!("File exists");
    }

    let yaml = serde_yaml::to_string(&template_config(args.source))?;
    tokio::fs::write(&args.output, format!("{}{}", HEADER, yaml)).await?;

    let output = InitOutput {
        created: Utc::now().to_rfc3339(),
        file: args.output.display().to_string(),
    };
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubstitutionStrategy;

    #[test]
    fn test_template_roundtrips_through_yaml() {
        let config = template_config(Source::Audit);
        let yaml = format!("{}{}", HEADER, serde_yaml::to_string(&config).unwrap());
        let parsed = RunConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.strategy(), SubstitutionStrategy::Query);
        assert_eq!(parsed.artifact_dir, PathBuf::from("data/audit"));
    }
}
