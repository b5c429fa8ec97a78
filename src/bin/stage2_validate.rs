//! Stage 2: allow-list validation
//!
//! Takes an object-created notification, reads the raw report it points at
//! from a filesystem store and writes the validated pair next to it.
//! Non-approved types are sent to Bedrock Converse.
//!
//! ## Usage
//!
//! ```bash
//! AWS_BEARER_TOKEN_BEDROCK=... cargo run --bin stage2-validate -- \
//!     --event ./event.json --store-root ./artifacts
//! ```
//!
//! `--allowlist` (or `ALLOWLIST_PATH`) replaces the embedded allow-list;
//! `BEDROCK_ENDPOINT_URL` points the transport at another endpoint.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use ec2_optimizer::report::InvocationSummary;
use ec2_optimizer::sources::FsBlobStore;
use ec2_optimizer::stage2::{AiAdvisor, AllowListChecker, BedrockHttpTransport, Stage2Stats};
use ec2_optimizer::{telemetry, PipelineError, Stage2Pipeline, Stage2Settings};

#[derive(Parser)]
#[command(name = "stage2-validate")]
#[command(version)]
#[command(about = "Validate a raw EC2 report against the instance allow-list")]
struct Args {
    /// Object-created notification (JSON file)
    #[arg(long, env = "EVENT_FILE")]
    event: PathBuf,

    /// Root directory of the artifact store
    #[arg(long, env = "STORE_ROOT", default_value = "./artifacts")]
    store_root: PathBuf,

    /// Allow-list YAML, overriding ALLOWLIST_PATH
    #[arg(long)]
    allowlist: Option<PathBuf>,
}

async fn run(
    args: &Args,
    event: &serde_json::Value,
) -> Result<InvocationSummary<Stage2Stats>> {
    let mut settings = Stage2Settings::from_env().map_err(PipelineError::from)?;
    if let Some(path) = &args.allowlist {
        settings.allowlist_path = Some(path.clone());
    }
    tracing::debug!(?settings, "Resolved settings");

    let mut transport =
        BedrockHttpTransport::new(&settings.bedrock_region, settings.bedrock_token.clone())?;
    if let Some(endpoint) = &settings.bedrock_endpoint {
        transport = transport.with_endpoint(endpoint.clone());
    }
    let advisor = Arc::new(AiAdvisor::new(Arc::new(transport), &settings.model_id));
    let checker = Arc::new(AllowListChecker::from_optional_path(
        settings.allowlist_path.as_deref(),
    ));
    let store = Arc::new(FsBlobStore::new(args.store_root.clone()));

    let pipeline = Stage2Pipeline::new(store, checker, advisor);
    Ok(pipeline.handle(&settings, event).await?)
}

fn failure_summary(error: &anyhow::Error) -> InvocationSummary<Stage2Stats> {
    match error.downcast_ref::<PipelineError>() {
        Some(e) => InvocationSummary::from_error(e),
        None => InvocationSummary::message(500, format!("{error:#}")),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    telemetry::init();
    let args = Args::parse();

    let text = tokio::fs::read_to_string(&args.event)
        .await
        .with_context(|| format!("reading event {}", args.event.display()))?;
    let event: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing event {}", args.event.display()))?;

    let summary = match run(&args, &event).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "Validation failed");
            failure_summary(&e)
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
