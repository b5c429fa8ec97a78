//! Compute Optimizer adapter
//!
//! Drains the paginated recommendation source and flattens each raw entry
//! into a [`Recommendation`]. Entries are structured one at a time; a bad
//! entry is logged and dropped without affecting the rest of the batch.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::SourceError;
use crate::model::Recommendation;
use crate::report::lenient;
use crate::sources::{RecommendationPageRequest, RecommendationSource};

/// Largest page the recommendation API serves
pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRecommendation {
    instance_arn: String,
    instance_name: String,
    account_id: String,
    current_instance_type: String,
    finding: String,
    finding_reason_codes: Vec<String>,
    current_performance_risk: Option<String>,
    #[serde(deserialize_with = "lenient::list")]
    inferred_workload_types: Vec<String>,
    effective_recommendation_preferences: RawPreferences,
    recommendation_options: Vec<RawOption>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPreferences {
    #[serde(deserialize_with = "lenient::list")]
    inferred_workload_types: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawOption {
    instance_type: String,
    performance_risk: f64,
    migration_effort: Option<String>,
    instance_state: Option<String>,
    savings_opportunity: RawSavings,
    savings_opportunity_after_discounts: RawSavings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSavings {
    savings_opportunity_percentage: f64,
    estimated_monthly_savings: RawAmount,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAmount {
    currency: Option<String>,
    value: f64,
}

/// Why a raw entry was dropped
#[derive(Error, Debug)]
pub enum StructureError {
    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    #[error("no instance id in ARN or name")]
    MissingInstanceId,
}

/// Flatten one raw Compute Optimizer entry. Only the first recommendation
/// option is used.
pub fn structure(entry: Value) -> Result<Recommendation, StructureError> {
    let raw: RawRecommendation = serde_json::from_value(entry)?;

    let instance_id = match raw.instance_arn.rsplit_once('/') {
        Some((_, id)) => id.to_string(),
        None => raw.instance_name.clone(),
    };
    if instance_id.trim().is_empty() {
        return Err(StructureError::MissingInstanceId);
    }

    let top = raw.recommendation_options.into_iter().next().unwrap_or_default();
    let inferred_workload_types = if raw.inferred_workload_types.is_empty() {
        raw.effective_recommendation_preferences.inferred_workload_types
    } else {
        raw.inferred_workload_types
    };

    let mut rec = Recommendation {
        instance_id,
        instance_arn: raw.instance_arn,
        account_id: raw.account_id,
        current_instance_type: raw.current_instance_type,
        finding: raw.finding,
        current_performance_risk: raw
            .current_performance_risk
            .unwrap_or_else(|| "N/A".to_string()),
        inferred_workload_types,
        recommended_instance_type: top.instance_type,
        recommendation_instance_state: top.instance_state.unwrap_or_else(|| "running".to_string()),
        recommended_performance_risk: top.performance_risk,
        recommended_migration_effort: top.migration_effort.unwrap_or_else(|| "Unknown".to_string()),
        savings_opportunity_pct: top.savings_opportunity.savings_opportunity_percentage,
        estimated_monthly_savings_on_demand: top.savings_opportunity.estimated_monthly_savings.value,
        savings_currency: top
            .savings_opportunity
            .estimated_monthly_savings
            .currency
            .unwrap_or_else(|| "USD".to_string()),
        savings_after_discounts_pct: top
            .savings_opportunity_after_discounts
            .savings_opportunity_percentage,
        estimated_monthly_savings_after_discounts: top
            .savings_opportunity_after_discounts
            .estimated_monthly_savings
            .value,
        ..Default::default()
    };
    rec.set_finding_reasons(raw.finding_reason_codes);
    Ok(rec)
}

/// Fetches and structures every EC2 recommendation visible to the caller
pub struct ComputeOptimizerAdapter {
    source: Arc<dyn RecommendationSource>,
}

impl ComputeOptimizerAdapter {
    pub fn new(source: Arc<dyn RecommendationSource>) -> Self {
        Self { source }
    }

    /// Follow `next_token` until exhausted. `account_ids` empty means the
    /// caller's own account.
    pub async fn fetch_all(
        &self,
        account_ids: &[String],
    ) -> Result<Vec<Recommendation>, SourceError> {
        let mut recommendations = Vec::new();
        let mut seen = HashSet::new();
        let mut request = RecommendationPageRequest {
            account_ids: account_ids.to_vec(),
            next_token: None,
            max_results: MAX_PAGE_SIZE,
        };

        tracing::info!("Fetching EC2 instance recommendations from Compute Optimizer");

        loop {
            let page = self.source.fetch_page(&request).await?;
            tracing::info!(
                count = page.instance_recommendations.len(),
                "Fetched batch of recommendations"
            );

            for entry in page.instance_recommendations {
                let arn = entry
                    .get("instanceArn")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                match structure(entry) {
                    Ok(rec) => {
                        if seen.insert(rec.instance_id.clone()) {
                            recommendations.push(rec);
                        } else {
                            tracing::warn!(
                                instance_id = %rec.instance_id,
                                "Duplicate recommendation dropped"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(arn = %arn, error = %e, "Failed to structure recommendation");
                    }
                }
            }

            match page.next_token.filter(|t| !t.is_empty()) {
                Some(token) => request.next_token = Some(token),
                None => break,
            }
        }

        tracing::info!(total = recommendations.len(), "Total recommendations fetched");
        Ok(recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_entry() -> Value {
        json!({
            "instanceArn": "arn:aws:ec2:us-east-1:123456789012:instance/i-0abc123",
            "accountId": "123456789012",
            "instanceName": "web-01",
            "currentInstanceType": "m5.2xlarge",
            "finding": "OVER_PROVISIONED",
            "findingReasonCodes": ["CPUOverprovisioned", "MemoryOverprovisioned", "NetworkBandwidthOverprovisioned"],
            "currentPerformanceRisk": "VeryLow",
            "inferredWorkloadTypes": ["Nginx"],
            "recommendationOptions": [
                {
                    "instanceType": "m5.xlarge",
                    "performanceRisk": 1.0,
                    "migrationEffort": "VeryLow",
                    "savingsOpportunity": {
                        "savingsOpportunityPercentage": 50.0,
                        "estimatedMonthlySavings": {"currency": "USD", "value": 140.16}
                    },
                    "savingsOpportunityAfterDiscounts": {
                        "savingsOpportunityPercentage": 40.0,
                        "estimatedMonthlySavings": {"currency": "USD", "value": 100.0}
                    }
                },
                {"instanceType": "m5.large"}
            ]
        })
    }

    #[test]
    fn test_structure_full_entry() {
        let rec = structure(full_entry()).unwrap();
        assert_eq!(rec.instance_id, "i-0abc123");
        assert_eq!(rec.account_id, "123456789012");
        assert_eq!(rec.recommended_instance_type, "m5.xlarge");
        assert_eq!(rec.cpu_finding_reasons, vec!["CPUOverprovisioned"]);
        assert_eq!(rec.memory_finding_reasons, vec!["MemoryOverprovisioned"]);
        assert_eq!(rec.finding_reasons.len(), 3);
        assert_eq!(rec.recommended_performance_risk, 1.0);
        assert_eq!(rec.estimated_monthly_savings_on_demand, 140.16);
        assert_eq!(rec.estimated_monthly_savings_after_discounts, 100.0);
        assert_eq!(rec.savings_after_discounts_pct, 40.0);
        assert_eq!(rec.inferred_workload_types, vec!["Nginx"]);
        assert_eq!(rec.recommendation_instance_state, "running");
        // Name comes from tags, not from the recommendation
        assert_eq!(rec.instance_name, "");
    }

    #[test]
    fn test_structure_defaults() {
        let rec = structure(json!({"instanceName": "i-fallback"})).unwrap();
        assert_eq!(rec.instance_id, "i-fallback");
        assert_eq!(rec.current_performance_risk, "N/A");
        assert_eq!(rec.recommended_migration_effort, "Unknown");
        assert_eq!(rec.recommendation_instance_state, "running");
        assert_eq!(rec.savings_currency, "USD");
        assert_eq!(rec.savings_opportunity_pct, 0.0);
        assert_eq!(rec.recommended_instance_type, "");
    }

    #[test]
    fn test_structure_rejects_malformed() {
        assert!(matches!(
            structure(json!({"instanceArn": "no-slash"})),
            Err(StructureError::MissingInstanceId)
        ));
        assert!(matches!(
            structure(json!({"instanceArn": "a/i-1", "finding": 42})),
            Err(StructureError::Decode(_))
        ));
        assert!(structure(json!("not an object")).is_err());
    }

    #[test]
    fn test_workload_types_fall_back_to_preferences() {
        let rec = structure(json!({
            "instanceArn": "a/i-1",
            "effectiveRecommendationPreferences": {"inferredWorkloadTypes": "Active"}
        }))
        .unwrap();
        assert_eq!(rec.inferred_workload_types, vec!["Active"]);
    }

    #[tokio::test]
    async fn test_fetch_all_reads_past_one_page_size() {
        use crate::sources::SnapshotRecommendationSource;

        let entries: Vec<Value> = (0..1500)
            .map(|n| {
                let arn = format!("arn:aws:ec2:us-east-1:123456789012:instance/i-{n}");
                json!({ "instanceArn": arn })
            })
            .collect();
        let text = json!({"instanceRecommendations": entries}).to_string();
        let source = SnapshotRecommendationSource::from_json(&text).unwrap();

        let adapter = ComputeOptimizerAdapter::new(Arc::new(source));
        let recommendations = adapter.fetch_all(&[]).await.unwrap();

        assert_eq!(recommendations.len(), 1500);
        assert_eq!(recommendations[1499].instance_id, "i-1499");
    }
}
