// Command-line runner: load a schema, scrape every target URL with a local
// Chrome, and write the results as JSON.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use schemascrape::{AutomationContext, CdpContext, JobOutput, Schema, run_job};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Schema-driven web extraction
#[derive(Parser, Debug)]
#[command(name = "schemascrape")]
#[command(version)]
struct Cli {
    /// Schema document (JSON)
    schema: PathBuf,

    /// Where to write the extraction results
    #[arg(default_value = "output.json")]
    output: PathBuf,

    /// YAML config file; defaults to config.yaml beside the manifest
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => schemascrape::load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => schemascrape::load_yaml_config()?,
    };
    let settings = config.scrape.job_settings()?;
    let schema = Schema::from_path(&cli.schema)
        .with_context(|| format!("Failed to load schema {}", cli.schema.display()))?;

    let context = CdpContext::launch(&config.browser).await?;
    let output = run_job(&context, &schema, &settings).await;
    // run_job already closed it; closing again is a no-op
    context.close().await?;

    write_json(&cli.output, &serde_json::to_value(&output)?)?;
    info!("Wrote {} result(s) to {}", output.data.len(), cli.output.display());

    write_media_urls(&cli.output, &output)?;
    Ok(())
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

/// `media_urls.json` next to the main output, only when media was captured
fn write_media_urls(output_path: &Path, output: &JobOutput) -> Result<()> {
    let media = output.media_urls();
    if media.is_empty() {
        return Ok(());
    }

    let path = output_path
        .parent()
        .map(|dir| dir.join("media_urls.json"))
        .unwrap_or_else(|| PathBuf::from("media_urls.json"));
    let document = json!({
        "timestamp": output.metadata.timestamp,
        "mediaCount": media.len(),
        "mediaUrls": media,
    });
    match write_json(&path, &document) {
        Ok(()) => info!("Wrote {} media URL(s) to {}", media.len(), path.display()),
        Err(e) => warn!("{:#}", e),
    }
    Ok(())
}
