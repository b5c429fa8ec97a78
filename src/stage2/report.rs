//! Validated (Stage 2) report

use serde::{Deserialize, Serialize};

use super::enricher::{ValidationResult, ValidationStatus};
use crate::model::round_to;
use crate::report::{ReportDocument, ReportRecord};

pub const VALIDATED_REPORT_TYPE: &str = "validated";
pub const CSV_FILE_NAME: &str = "ec2_validated_report.csv";
pub const JSON_FILE_NAME: &str = "ec2_validated_report.json";

/// One row of the validated report
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidatedRow {
    #[serde(rename = "Account ID")]
    pub account_id: String,
    #[serde(rename = "Instance ID")]
    pub instance_id: String,
    #[serde(rename = "Instance Name")]
    pub instance_name: String,
    #[serde(rename = "Finding")]
    pub finding: String,
    #[serde(rename = "Current Instance Type")]
    pub current_instance_type: String,
    #[serde(rename = "CO Recommended Type")]
    pub co_recommended_type: String,
    #[serde(rename = "Validation Status")]
    pub validation_status: String,
    #[serde(rename = "Final Recommendation")]
    pub final_recommendation: String,
    #[serde(rename = "Discount Tier")]
    pub discount_tier: String,
    #[serde(rename = "Discount (%)")]
    pub discount_percent: u32,
    #[serde(rename = "Current Monthly Price (USD)")]
    pub current_monthly_price: f64,
    #[serde(rename = "Recommended Monthly Price (USD)")]
    pub recommended_monthly_price: f64,
    #[serde(rename = "Discounted Monthly Price (USD)")]
    pub discounted_monthly_price: f64,
    #[serde(rename = "Est. Savings On-Demand (USD)")]
    pub estimated_savings_on_demand: f64,
    #[serde(rename = "Est. Savings With Discount (USD)")]
    pub estimated_savings_with_discount: f64,
    #[serde(rename = "AI Confidence")]
    pub ai_confidence: String,
    #[serde(rename = "AI Analysis")]
    pub ai_analysis: String,
    #[serde(rename = "AI Alternatives")]
    pub ai_alternatives: String,
    #[serde(rename = "AI Model")]
    pub ai_model: String,
}

impl From<&ValidationResult> for ValidatedRow {
    fn from(result: &ValidationResult) -> Self {
        let row = &result.row;
        Self {
            account_id: row.account_id.clone(),
            instance_id: row.instance_id.clone(),
            instance_name: row.instance_name.clone(),
            finding: row.finding.clone(),
            current_instance_type: row.current_instance_type.clone(),
            co_recommended_type: row.recommended_instance_type.clone(),
            validation_status: result.status.label().to_string(),
            final_recommendation: result.final_recommendation.clone(),
            discount_tier: result.discount_tier_name.clone(),
            discount_percent: result.discount_percent,
            current_monthly_price: row.current_monthly_price,
            recommended_monthly_price: row.recommended_monthly_price,
            discounted_monthly_price: result.discounted_monthly_price,
            estimated_savings_on_demand: row.estimated_monthly_savings_on_demand,
            estimated_savings_with_discount: result.estimated_monthly_savings_with_discount,
            ai_confidence: result.ai_confidence.clone(),
            ai_analysis: result.ai_analysis_summary.clone(),
            ai_alternatives: result.ai_alternatives.clone(),
            ai_model: result.ai_model.clone(),
        }
    }
}

impl ReportRecord for ValidatedRow {
    const COLUMNS: &'static [&'static str] = &[
        "Account ID",
        "Instance ID",
        "Instance Name",
        "Finding",
        "Current Instance Type",
        "CO Recommended Type",
        "Validation Status",
        "Final Recommendation",
        "Discount Tier",
        "Discount (%)",
        "Current Monthly Price (USD)",
        "Recommended Monthly Price (USD)",
        "Discounted Monthly Price (USD)",
        "Est. Savings On-Demand (USD)",
        "Est. Savings With Discount (USD)",
        "AI Confidence",
        "AI Analysis",
        "AI Alternatives",
        "AI Model",
    ];

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.account_id.clone(),
            self.instance_id.clone(),
            self.instance_name.clone(),
            self.finding.clone(),
            self.current_instance_type.clone(),
            self.co_recommended_type.clone(),
            self.validation_status.clone(),
            self.final_recommendation.clone(),
            self.discount_tier.clone(),
            self.discount_percent.to_string(),
            self.current_monthly_price.to_string(),
            self.recommended_monthly_price.to_string(),
            self.discounted_monthly_price.to_string(),
            self.estimated_savings_on_demand.to_string(),
            self.estimated_savings_with_discount.to_string(),
            self.ai_confidence.clone(),
            self.ai_analysis.clone(),
            self.ai_alternatives.clone(),
            self.ai_model.clone(),
        ]
    }
}

/// Record count per validation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    #[serde(rename = "Approved (Allowed Instance)")]
    pub approved: usize,
    #[serde(rename = "AI-Recommended Alternative")]
    pub ai_recommended: usize,
    #[serde(rename = "AI Validation Failed")]
    pub ai_failed: usize,
}

impl ValidationSummary {
    pub fn tally(results: &[ValidationResult]) -> Self {
        results
            .iter()
            .fold(Self::default(), |mut summary, result| {
                match result.status {
                    ValidationStatus::Approved => summary.approved += 1,
                    ValidationStatus::AiRecommended => summary.ai_recommended += 1,
                    ValidationStatus::AiFailed => summary.ai_failed += 1,
                }
                summary
            })
    }

    pub fn total(&self) -> usize {
        self.approved + self.ai_recommended + self.ai_failed
    }
}

/// Metadata block of the validated report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedReportMetadata {
    pub generated_at: String,
    pub report_type: String,
    pub total_instances: usize,
    pub approved_count: usize,
    pub ai_recommended_count: usize,
    pub ai_failed_count: usize,
    pub total_estimated_monthly_savings_with_discount: f64,
    pub validation_summary: ValidationSummary,
}

pub type ValidatedReport = ReportDocument<ValidatedReportMetadata, ValidatedRow>;

/// Sum of discounted savings over every result, rounded to cents
pub fn total_savings_with_discount(results: &[ValidationResult]) -> f64 {
    round_to(
        results
            .iter()
            .map(|r| r.estimated_monthly_savings_with_discount)
            .sum(),
        2,
    )
}

pub fn build_validated_report(results: &[ValidationResult], generated_at: &str) -> ValidatedReport {
    let summary = ValidationSummary::tally(results);
    ValidatedReport {
        report_metadata: ValidatedReportMetadata {
            generated_at: generated_at.to_string(),
            report_type: VALIDATED_REPORT_TYPE.to_string(),
            total_instances: results.len(),
            approved_count: summary.approved,
            ai_recommended_count: summary.ai_recommended,
            ai_failed_count: summary.ai_failed,
            total_estimated_monthly_savings_with_discount: total_savings_with_discount(results),
            validation_summary: summary,
        },
        recommendations: results.iter().map(ValidatedRow::from).collect(),
    }
}
