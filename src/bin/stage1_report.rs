//! Stage 1: EC2 right-sizing report
//!
//! Replays captured Compute Optimizer / EC2 / Pricing payloads and writes the
//! raw report pair into a filesystem store laid out as `{bucket}/{key}`.
//!
//! ## Usage
//!
//! ```bash
//! REPORT_BUCKET=cost-reports cargo run --bin stage1-report -- \
//!     --snapshot-dir ./captures/latest --store-root ./artifacts
//! ```
//!
//! The snapshot directory holds `recommendations.json` (required),
//! `instances.json` and `pricing.json`. The invocation summary is printed
//! to stdout as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use ec2_optimizer::report::InvocationSummary;
use ec2_optimizer::sources::{FsBlobStore, SnapshotSources};
use ec2_optimizer::stage1::Stage1Stats;
use ec2_optimizer::{telemetry, PipelineError, Stage1Pipeline, Stage1Settings};

#[derive(Parser)]
#[command(name = "stage1-report")]
#[command(version)]
#[command(about = "Generate the EC2 right-sizing report from captured AWS payloads")]
struct Args {
    /// Directory with recommendations.json, instances.json and pricing.json
    #[arg(long, env = "SNAPSHOT_DIR")]
    snapshot_dir: PathBuf,

    /// Root directory of the artifact store
    #[arg(long, env = "STORE_ROOT", default_value = "./artifacts")]
    store_root: PathBuf,

    /// Scheduled event payload (JSON file); only logged
    #[arg(long)]
    event: Option<PathBuf>,
}

async fn read_event(path: Option<&Path>) -> Result<serde_json::Value> {
    let Some(path) = path else {
        return Ok(serde_json::json!({}));
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading event {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing event {}", path.display()))
}

async fn run(args: &Args) -> Result<InvocationSummary<Stage1Stats>, PipelineError> {
    let settings = Stage1Settings::from_env()?;
    let event = match read_event(args.event.as_deref()).await {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable event");
            serde_json::json!({})
        }
    };

    let sources = SnapshotSources::open(&args.snapshot_dir).await?;
    let store = Arc::new(FsBlobStore::new(args.store_root.clone()));
    let pipeline = Stage1Pipeline::new(sources.recommendations, sources.tags, sources.prices, store);

    pipeline.run(&settings, &event).await
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    telemetry::init();
    let args = Args::parse();

    let summary = match run(&args).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "Report generation failed");
            InvocationSummary::from_error(&e)
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
