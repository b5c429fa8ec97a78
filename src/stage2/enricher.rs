//! Per-record validation
//!
//! ```text
//!   recommended type allow-listed? ──yes──► Approved (Allowed Instance)
//!              │ no
//!              ▼
//!        advisor.consult ──Suggested──► AI-Recommended Alternative
//!              │ Failed
//!              ▼
//!        AI Validation Failed
//! ```
//!
//! Every record ends in exactly one of the three states; a failed advisor
//! call never stops the batch.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::advisor::{AdvisorOutcome, AiAdvisor};
use super::allowlist::{AllowListChecker, AllowedType, TierInfo};
use super::prompt::{build_request, AdvisorResponse};
use crate::model::round_to;
use crate::report::LIST_SEPARATOR;
use crate::stage1::ReportRow;

pub const APPROVED_SUMMARY: &str = "Instance type is pre-approved in the organization's allow-list.";
pub const FAILED_SUMMARY: &str =
    "AI validation failed. Using original Compute Optimizer recommendation.";

/// Alternatives rendered into the report
const MAX_RENDERED_ALTERNATIVES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValidationStatus {
    #[serde(rename = "Approved (Allowed Instance)")]
    Approved,
    #[serde(rename = "AI-Recommended Alternative")]
    AiRecommended,
    #[serde(rename = "AI Validation Failed")]
    AiFailed,
}

impl ValidationStatus {
    pub fn label(self) -> &'static str {
        match self {
            ValidationStatus::Approved => "Approved (Allowed Instance)",
            ValidationStatus::AiRecommended => "AI-Recommended Alternative",
            ValidationStatus::AiFailed => "AI Validation Failed",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A Stage 1 row with its validation outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub row: ReportRow,
    pub status: ValidationStatus,
    pub final_recommendation: String,
    pub discount_tier_name: String,
    pub discount_percent: u32,
    pub discounted_monthly_price: f64,
    pub estimated_monthly_savings_with_discount: f64,
    pub ai_confidence: String,
    pub ai_analysis_summary: String,
    pub ai_alternatives: String,
    /// Model id, set only when the advisor produced the final type
    pub ai_model: String,
}

/// `(discounted monthly price, savings against the current monthly price)`
pub fn discounted_pricing(
    current_monthly: f64,
    recommended_monthly: f64,
    discount_percent: u32,
) -> (f64, f64) {
    let discounted = round_to(
        recommended_monthly * (1.0 - f64::from(discount_percent) / 100.0),
        2,
    );
    (discounted, round_to(current_monthly - discounted, 2))
}

fn tier_fields(tier: Option<&TierInfo>) -> (String, u32) {
    tier.map(|t| (t.tier_name.clone(), t.discount_percent))
        .unwrap_or_default()
}

pub struct RecommendationEnricher {
    checker: Arc<AllowListChecker>,
    advisor: Arc<AiAdvisor>,
}

impl RecommendationEnricher {
    pub fn new(checker: Arc<AllowListChecker>, advisor: Arc<AiAdvisor>) -> Self {
        Self { checker, advisor }
    }

    /// Validate every row, in order
    pub async fn enrich_all(&self, rows: Vec<ReportRow>) -> Vec<ValidationResult> {
        let allowed = self.checker.get_all_allowed_types();
        let total = rows.len();
        let mut results = Vec::with_capacity(total);

        for (index, row) in rows.into_iter().enumerate() {
            tracing::info!(
                progress = format!("{}/{}", index + 1, total),
                instance_id = %row.instance_id,
                recommended = %row.recommended_instance_type,
                "Validating recommendation"
            );
            results.push(self.validate(row, &allowed).await);
        }

        let count = |status| results.iter().filter(|r| r.status == status).count();
        tracing::info!(
            approved = count(ValidationStatus::Approved),
            ai_recommended = count(ValidationStatus::AiRecommended),
            failed = count(ValidationStatus::AiFailed),
            total = results.len(),
            "Enrichment complete"
        );
        results
    }

    /// Validate one row. The allow-list check is the only branch condition;
    /// the advisor is consulted only for types that are not approved.
    pub async fn validate(&self, row: ReportRow, allowed: &[AllowedType]) -> ValidationResult {
        if self.checker.is_allowed(&row.recommended_instance_type) {
            return self.approve(row);
        }

        let (system, user) = build_request(&row, allowed);
        match self.advisor.consult(&system, &user).await {
            AdvisorOutcome::Suggested(response) => self.adopt_alternative(row, response),
            AdvisorOutcome::Failed(e) => {
                tracing::error!(
                    instance_id = %row.instance_id,
                    error = %e,
                    "Bedrock validation failed"
                );
                Self::fail(row)
            }
        }
    }

    fn approve(&self, row: ReportRow) -> ValidationResult {
        let final_type = row.recommended_instance_type.clone();
        let (tier_name, discount_percent) = tier_fields(self.checker.get_tier(&final_type));
        let (discounted, savings) = discounted_pricing(
            row.current_monthly_price,
            row.recommended_monthly_price,
            discount_percent,
        );

        tracing::info!(
            instance_id = %row.instance_id,
            instance_type = %final_type,
            tier = %tier_name,
            "Approved"
        );

        ValidationResult {
            row,
            status: ValidationStatus::Approved,
            final_recommendation: final_type,
            discount_tier_name: tier_name,
            discount_percent,
            discounted_monthly_price: discounted,
            estimated_monthly_savings_with_discount: savings,
            ai_confidence: "high".to_string(),
            ai_analysis_summary: APPROVED_SUMMARY.to_string(),
            ai_alternatives: String::new(),
            ai_model: String::new(),
        }
    }

    fn adopt_alternative(&self, row: ReportRow, response: AdvisorResponse) -> ValidationResult {
        let final_type = response
            .alternatives
            .first()
            .map(|a| a.instance_type.clone())
            .unwrap_or_default();
        let (tier_name, discount_percent) = tier_fields(self.checker.get_tier(&final_type));

        // The alternative's own price is not looked up; the original
        // recommendation's monthly price stands in for it.
        let (discounted, savings) = discounted_pricing(
            row.current_monthly_price,
            row.recommended_monthly_price,
            discount_percent,
        );

        let alternatives = response
            .alternatives
            .iter()
            .take(MAX_RENDERED_ALTERNATIVES)
            .map(|a| a.summary())
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR);
        let confidence = response
            .confidence
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        tracing::info!(
            instance_id = %row.instance_id,
            recommended = %row.recommended_instance_type,
            alternative = %final_type,
            confidence = %confidence,
            "AI recommendation"
        );

        ValidationResult {
            row,
            status: ValidationStatus::AiRecommended,
            final_recommendation: final_type,
            discount_tier_name: tier_name,
            discount_percent,
            discounted_monthly_price: discounted,
            estimated_monthly_savings_with_discount: savings,
            ai_confidence: confidence,
            ai_analysis_summary: response.analysis_summary,
            ai_alternatives: alternatives,
            ai_model: self.advisor.model_id().to_string(),
        }
    }

    fn fail(row: ReportRow) -> ValidationResult {
        ValidationResult {
            final_recommendation: row.recommended_instance_type.clone(),
            row,
            status: ValidationStatus::AiFailed,
            discount_tier_name: String::new(),
            discount_percent: 0,
            discounted_monthly_price: 0.0,
            estimated_monthly_savings_with_discount: 0.0,
            ai_confidence: String::new(),
            ai_analysis_summary: FAILED_SUMMARY.to_string(),
            ai_alternatives: String::new(),
            ai_model: String::new(),
        }
    }
}
