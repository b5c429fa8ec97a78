//! Stage 2 orchestration
//!
//! ```text
//!   notification ──► trigger guards ──► read raw report ──► enrich rows
//!                        │ skip/400                            │
//!                        ▼                                     ▼
//!                     summary                {prefix}/{ts}/validated/*.{csv,json}
//! ```
//!
//! `{ts}` is the Stage 1 folder timestamp taken from the triggering key, so
//! the validated pair lands next to its input.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::advisor::AiAdvisor;
use super::allowlist::AllowListChecker;
use super::enricher::RecommendationEnricher;
use super::report::{
    build_validated_report, ValidatedRow, ValidationSummary, CSV_FILE_NAME, JSON_FILE_NAME,
};
use super::trigger::{evaluate, extract_timestamp, ObjectLocation, TriggerDecision};
use crate::config::Stage2Settings;
use crate::error::{PipelineError, ReportError};
use crate::report::{format_timestamp, to_csv, upload_pair, InvocationSummary};
use crate::sources::BlobStore;
use crate::stage1::ReportRow;

/// Raw report as read back; only the records matter here
#[derive(Debug, Deserialize)]
struct InputReport {
    #[serde(default)]
    recommendations: Vec<ReportRow>,
}

/// Counts, totals and artifact locations of a validated report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage2Report {
    pub total_instances_validated: usize,
    pub approved_in_allowlist: usize,
    pub ai_recommended_alternatives: usize,
    pub ai_validation_failed: usize,
    pub total_estimated_monthly_savings_with_discount_usd: f64,
    pub bedrock_model: String,
    pub s3_csv: String,
    pub s3_json: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Stage2Stats {
    Empty { total_instances: usize },
    Reported(Stage2Report),
}

pub struct Stage2Pipeline {
    store: Arc<dyn BlobStore>,
    checker: Arc<AllowListChecker>,
    advisor: Arc<AiAdvisor>,
    enricher: RecommendationEnricher,
}

impl Stage2Pipeline {
    pub fn new(
        store: Arc<dyn BlobStore>,
        checker: Arc<AllowListChecker>,
        advisor: Arc<AiAdvisor>,
    ) -> Self {
        let enricher = RecommendationEnricher::new(checker.clone(), advisor.clone());
        Self {
            store,
            checker,
            advisor,
            enricher,
        }
    }

    pub async fn handle(
        &self,
        settings: &Stage2Settings,
        event: &serde_json::Value,
    ) -> Result<InvocationSummary<Stage2Stats>, PipelineError> {
        self.handle_at(settings, event, Utc::now()).await
    }

    /// Handle with an explicit clock, used when the key carries no timestamp
    #[tracing::instrument(skip_all, fields(model = %self.advisor.model_id()))]
    pub async fn handle_at(
        &self,
        settings: &Stage2Settings,
        event: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<InvocationSummary<Stage2Stats>, PipelineError> {
        tracing::info!("Starting EC2 recommendation validation");

        let location = match evaluate(event)? {
            TriggerDecision::Process(location) => location,
            TriggerDecision::Skip { location, reason } => {
                return Ok(InvocationSummary::message(
                    200,
                    TriggerDecision::skip_message(&location, reason),
                ));
            }
        };

        // Step 1: read the raw report
        tracing::info!(bucket = %location.bucket, key = %location.key, "Step 1/4: Reading report");
        let rows = self.read_rows(&location).await?;
        if rows.is_empty() {
            tracing::info!("No recommendations to validate");
            return Ok(InvocationSummary::ok(
                "No recommendations to validate",
                Stage2Stats::Empty { total_instances: 0 },
            ));
        }

        // Step 2: allow-list
        let entries = self.checker.load()?;
        tracing::info!(
            allowed_types = entries.len(),
            "Step 2/4: Allow-list loaded"
        );

        // Step 3: validation
        tracing::info!(count = rows.len(), "Step 3/4: Validating recommendations");
        let results = self.enricher.enrich_all(rows).await;

        // Step 4: artifacts
        tracing::info!("Step 4/4: Generating validated reports");
        let mut timestamp = extract_timestamp(&location.key);
        if timestamp.is_empty() {
            timestamp = format_timestamp(now);
        }
        let report = build_validated_report(&results, &format_timestamp(now));
        let csv = to_csv::<ValidatedRow>(&report.recommendations)?;
        let json = report.to_json()?;

        if let Some(dir) = &settings.local_output_dir {
            write_local_copy(dir, &csv, &json).await;
        }

        let folder = format!("{}/{}/validated", settings.report_prefix, timestamp);
        let bucket = settings.output_bucket(&location.bucket);
        let locations = upload_pair(
            self.store.as_ref(),
            bucket,
            format!("{folder}/{CSV_FILE_NAME}"),
            csv,
            format!("{folder}/{JSON_FILE_NAME}"),
            json,
        )
        .await?;

        let summary = ValidationSummary::tally(&results);
        let stats = Stage2Report {
            total_instances_validated: results.len(),
            approved_in_allowlist: summary.approved,
            ai_recommended_alternatives: summary.ai_recommended,
            ai_validation_failed: summary.ai_failed,
            total_estimated_monthly_savings_with_discount_usd: report
                .report_metadata
                .total_estimated_monthly_savings_with_discount,
            bedrock_model: self.advisor.model_id().to_string(),
            s3_csv: locations.csv_uri,
            s3_json: locations.json_uri,
        };

        tracing::info!(
            validated = stats.total_instances_validated,
            approved = stats.approved_in_allowlist,
            ai_recommended = stats.ai_recommended_alternatives,
            failed = stats.ai_validation_failed,
            savings_with_discount = stats.total_estimated_monthly_savings_with_discount_usd,
            "Validation summary"
        );

        Ok(InvocationSummary::ok(
            "Validation report generated successfully",
            Stage2Stats::Reported(stats),
        ))
    }

    async fn read_rows(&self, location: &ObjectLocation) -> Result<Vec<ReportRow>, PipelineError> {
        let body = self.store.get(&location.bucket, &location.key).await?;
        let report: InputReport = serde_json::from_slice(&body).map_err(ReportError::from)?;
        tracing::info!(count = report.recommendations.len(), "Loaded recommendations");
        Ok(report.recommendations)
    }
}

/// Best-effort copy of the validated pair into a local directory
async fn write_local_copy(dir: &Path, csv: &str, json: &str) {
    let result: std::io::Result<()> = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(CSV_FILE_NAME), csv).await?;
        tokio::fs::write(dir.join(JSON_FILE_NAME), json).await
    }
    .await;

    match result {
        Ok(()) => tracing::info!(dir = %dir.display(), "Saved local copy"),
        Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "Could not save local copy"),
    }
}
