//! Stage 1 orchestration
//!
//! One invocation: fetch all recommendations, attach tags, drop cluster
//! nodes, price what is left, upload the CSV/JSON pair. Collaborator calls
//! run one after another.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::eks_filter;
use super::pricing::PriceCalculator;
use super::recommendations::ComputeOptimizerAdapter;
use super::report::{build_raw_report, ReportRow, CSV_FILE_NAME, JSON_FILE_NAME};
use super::tags::TagEnricher;
use crate::config::Stage1Settings;
use crate::error::PipelineError;
use crate::model::round_to;
use crate::report::{format_timestamp, to_csv, upload_pair, InvocationSummary};
use crate::sources::{BlobStore, PriceSource, RecommendationSource, TagSource};

/// Totals and artifact locations of a completed report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage1Report {
    pub total_instances_analyzed: usize,
    pub eks_excluded: usize,
    pub non_eks_included: usize,
    pub total_estimated_monthly_savings_on_demand_usd: f64,
    pub total_estimated_monthly_savings_after_discounts_usd: f64,
    pub s3_csv: String,
    pub s3_json: String,
}

/// Invocation statistics, one shape per way the run can end
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Stage1Stats {
    NoRecommendations {
        total_instances: usize,
    },
    AllManaged {
        total_instances: usize,
        eks_excluded: usize,
        non_eks_included: usize,
    },
    Reported(Stage1Report),
}

pub struct Stage1Pipeline {
    recommendations: Arc<dyn RecommendationSource>,
    tags: Arc<dyn TagSource>,
    prices: Arc<dyn PriceSource>,
    store: Arc<dyn BlobStore>,
}

impl Stage1Pipeline {
    pub fn new(
        recommendations: Arc<dyn RecommendationSource>,
        tags: Arc<dyn TagSource>,
        prices: Arc<dyn PriceSource>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            recommendations,
            tags,
            prices,
            store,
        }
    }

    pub async fn run(
        &self,
        settings: &Stage1Settings,
        event: &serde_json::Value,
    ) -> Result<InvocationSummary<Stage1Stats>, PipelineError> {
        self.run_at(settings, event, Utc::now()).await
    }

    /// Run with an explicit clock; `now` names the artifact folder
    #[tracing::instrument(skip_all, fields(bucket = %settings.report_bucket))]
    pub async fn run_at(
        &self,
        settings: &Stage1Settings,
        event: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<InvocationSummary<Stage1Stats>, PipelineError> {
        tracing::info!("Starting EC2 Cost Optimization Report generation");
        tracing::info!(%event, "Trigger event");

        // Step 1: recommendations
        tracing::info!("Step 1/5: Fetching Compute Optimizer EC2 recommendations");
        let recommendations = ComputeOptimizerAdapter::new(self.recommendations.clone())
            .fetch_all(&settings.account_ids)
            .await?;

        if recommendations.is_empty() {
            tracing::info!("No EC2 recommendations found. Exiting.");
            return Ok(InvocationSummary::ok(
                "No recommendations found",
                Stage1Stats::NoRecommendations { total_instances: 0 },
            ));
        }
        let total = recommendations.len();

        // Step 2: tags
        tracing::info!(count = total, "Step 2/5: Fetching EC2 tags");
        let recommendations = TagEnricher::new(self.tags.clone())
            .enrich(recommendations)
            .await?;

        // Step 3: cluster nodes out
        tracing::info!("Step 3/5: Filtering EKS/Kubernetes instances");
        let (kept, excluded) = eks_filter::filter(recommendations);

        if kept.is_empty() {
            tracing::info!("All instances are EKS workloads. No report to generate.");
            return Ok(InvocationSummary::ok(
                "All instances are EKS workloads, nothing to report",
                Stage1Stats::AllManaged {
                    total_instances: total,
                    eks_excluded: excluded.len(),
                    non_eks_included: 0,
                },
            ));
        }

        // Step 4: pricing
        tracing::info!(count = kept.len(), "Step 4/5: Fetching On-Demand pricing");
        let mut calculator = PriceCalculator::new(self.prices.clone(), settings.region.clone());
        let priced = calculator.enrich(kept).await;

        // Step 5: artifacts
        tracing::info!("Step 5/5: Generating CSV and JSON reports");
        let timestamp = format_timestamp(now);
        let rows: Vec<ReportRow> = priced.iter().map(ReportRow::from).collect();
        let csv = to_csv(&rows)?;
        let report = build_raw_report(rows, &timestamp);
        let json = report.to_json()?;

        let folder = format!("{}/{}", settings.report_prefix, timestamp);
        let locations = upload_pair(
            self.store.as_ref(),
            &settings.report_bucket,
            format!("{folder}/{CSV_FILE_NAME}"),
            csv,
            format!("{folder}/{JSON_FILE_NAME}"),
            json,
        )
        .await?;

        let stats = Stage1Report {
            total_instances_analyzed: total,
            eks_excluded: excluded.len(),
            non_eks_included: priced.len(),
            total_estimated_monthly_savings_on_demand_usd: round_to(
                priced
                    .iter()
                    .map(|p| p.recommendation.estimated_monthly_savings_on_demand)
                    .sum(),
                2,
            ),
            total_estimated_monthly_savings_after_discounts_usd: round_to(
                priced
                    .iter()
                    .map(|p| p.recommendation.estimated_monthly_savings_after_discounts)
                    .sum(),
                2,
            ),
            s3_csv: locations.csv_uri,
            s3_json: locations.json_uri,
        };

        tracing::info!(
            analyzed = stats.total_instances_analyzed,
            excluded = stats.eks_excluded,
            included = stats.non_eks_included,
            savings_on_demand = stats.total_estimated_monthly_savings_on_demand_usd,
            "Execution summary"
        );

        Ok(InvocationSummary::ok(
            "Report generated successfully",
            Stage1Stats::Reported(stats),
        ))
    }
}
