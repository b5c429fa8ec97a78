//! Raw (Stage 1) report
//!
//! `ReportRow` is the display record: its serde names are the column labels
//! used in both the CSV header and the JSON keys, which is also the shape
//! Stage 2 reads back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{round_to, PricedRecommendation};
use crate::report::{join_list, lenient, ReportDocument, ReportRecord};

pub const RAW_REPORT_TYPE: &str = "raw";
pub const CSV_FILE_NAME: &str = "ec2_optimization_report.csv";
pub const JSON_FILE_NAME: &str = "ec2_optimization_report.json";

/// One row of the raw report
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "Account ID", default, deserialize_with = "lenient::text")]
    pub account_id: String,
    #[serde(rename = "Instance ID", default, deserialize_with = "lenient::text")]
    pub instance_id: String,
    #[serde(rename = "Instance Name", default, deserialize_with = "lenient::text")]
    pub instance_name: String,
    #[serde(rename = "Finding", default, deserialize_with = "lenient::text")]
    pub finding: String,
    #[serde(rename = "Finding Reasons", default, deserialize_with = "lenient::list")]
    pub finding_reasons: Vec<String>,
    #[serde(rename = "CPU Finding Reasons", default, deserialize_with = "lenient::list")]
    pub cpu_finding_reasons: Vec<String>,
    #[serde(rename = "Memory Finding Reasons", default, deserialize_with = "lenient::list")]
    pub memory_finding_reasons: Vec<String>,
    #[serde(
        rename = "Recommendation Instance State",
        default,
        deserialize_with = "lenient::text"
    )]
    pub recommendation_instance_state: String,
    #[serde(rename = "Current Instance Type", default, deserialize_with = "lenient::text")]
    pub current_instance_type: String,
    #[serde(
        rename = "Recommended Instance Type",
        default,
        deserialize_with = "lenient::text"
    )]
    pub recommended_instance_type: String,
    #[serde(
        rename = "Current Performance Risk",
        default,
        deserialize_with = "lenient::text"
    )]
    pub current_performance_risk: String,
    #[serde(
        rename = "Recommended Performance Risk",
        default,
        deserialize_with = "lenient::number"
    )]
    pub recommended_performance_risk: f64,
    #[serde(
        rename = "Current Hourly Price (USD)",
        default,
        deserialize_with = "lenient::number"
    )]
    pub current_hourly_price: f64,
    #[serde(
        rename = "Recommended Hourly Price (USD)",
        default,
        deserialize_with = "lenient::number"
    )]
    pub recommended_hourly_price: f64,
    #[serde(
        rename = "Current Monthly On-Demand Price (USD)",
        default,
        deserialize_with = "lenient::number"
    )]
    pub current_monthly_price: f64,
    #[serde(
        rename = "Recommended Monthly On-Demand Price (USD)",
        default,
        deserialize_with = "lenient::number"
    )]
    pub recommended_monthly_price: f64,
    #[serde(
        rename = "Monthly Price Difference (USD)",
        default,
        deserialize_with = "lenient::number"
    )]
    pub monthly_price_difference: f64,
    #[serde(
        rename = "Est. Monthly Savings On-Demand (USD)",
        default,
        deserialize_with = "lenient::number"
    )]
    pub estimated_monthly_savings_on_demand: f64,
    #[serde(
        rename = "Est. Monthly Savings After Discounts (USD)",
        default,
        deserialize_with = "lenient::number"
    )]
    pub estimated_monthly_savings_after_discounts: f64,
    #[serde(
        rename = "Savings Opportunity (%)",
        default,
        deserialize_with = "lenient::number"
    )]
    pub savings_opportunity_pct: f64,
    #[serde(
        rename = "Savings After Discounts (%)",
        default,
        deserialize_with = "lenient::number"
    )]
    pub savings_after_discounts_pct: f64,
    #[serde(rename = "Currency", default, deserialize_with = "lenient::text")]
    pub currency: String,
    #[serde(
        rename = "Inferred Workload Types",
        default,
        deserialize_with = "lenient::list"
    )]
    pub inferred_workload_types: Vec<String>,
    #[serde(rename = "Migration Effort", default, deserialize_with = "lenient::text")]
    pub migration_effort: String,
}

impl From<&PricedRecommendation> for ReportRow {
    fn from(priced: &PricedRecommendation) -> Self {
        let rec = &priced.recommendation;
        let pricing = &priced.pricing;
        Self {
            account_id: rec.account_id.clone(),
            instance_id: rec.instance_id.clone(),
            instance_name: rec.instance_name.clone(),
            finding: rec.finding.clone(),
            finding_reasons: rec.finding_reasons.clone(),
            cpu_finding_reasons: rec.cpu_finding_reasons.clone(),
            memory_finding_reasons: rec.memory_finding_reasons.clone(),
            recommendation_instance_state: rec.recommendation_instance_state.clone(),
            current_instance_type: rec.current_instance_type.clone(),
            recommended_instance_type: rec.recommended_instance_type.clone(),
            current_performance_risk: rec.current_performance_risk.clone(),
            recommended_performance_risk: rec.recommended_performance_risk,
            current_hourly_price: pricing.current_hourly,
            recommended_hourly_price: pricing.recommended_hourly,
            current_monthly_price: pricing.current_monthly,
            recommended_monthly_price: pricing.recommended_monthly,
            monthly_price_difference: pricing.monthly_difference,
            estimated_monthly_savings_on_demand: rec.estimated_monthly_savings_on_demand,
            estimated_monthly_savings_after_discounts: rec
                .estimated_monthly_savings_after_discounts,
            savings_opportunity_pct: rec.savings_opportunity_pct,
            savings_after_discounts_pct: rec.savings_after_discounts_pct,
            currency: rec.savings_currency.clone(),
            inferred_workload_types: rec.inferred_workload_types.clone(),
            migration_effort: rec.recommended_migration_effort.clone(),
        }
    }
}

impl ReportRecord for ReportRow {
    const COLUMNS: &'static [&'static str] = &[
        "Account ID",
        "Instance ID",
        "Instance Name",
        "Finding",
        "Finding Reasons",
        "CPU Finding Reasons",
        "Memory Finding Reasons",
        "Recommendation Instance State",
        "Current Instance Type",
        "Recommended Instance Type",
        "Current Performance Risk",
        "Recommended Performance Risk",
        "Current Hourly Price (USD)",
        "Recommended Hourly Price (USD)",
        "Current Monthly On-Demand Price (USD)",
        "Recommended Monthly On-Demand Price (USD)",
        "Monthly Price Difference (USD)",
        "Est. Monthly Savings On-Demand (USD)",
        "Est. Monthly Savings After Discounts (USD)",
        "Savings Opportunity (%)",
        "Savings After Discounts (%)",
        "Currency",
        "Inferred Workload Types",
        "Migration Effort",
    ];

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.account_id.clone(),
            self.instance_id.clone(),
            self.instance_name.clone(),
            self.finding.clone(),
            join_list(&self.finding_reasons),
            join_list(&self.cpu_finding_reasons),
            join_list(&self.memory_finding_reasons),
            self.recommendation_instance_state.clone(),
            self.current_instance_type.clone(),
            self.recommended_instance_type.clone(),
            self.current_performance_risk.clone(),
            self.recommended_performance_risk.to_string(),
            self.current_hourly_price.to_string(),
            self.recommended_hourly_price.to_string(),
            self.current_monthly_price.to_string(),
            self.recommended_monthly_price.to_string(),
            self.monthly_price_difference.to_string(),
            self.estimated_monthly_savings_on_demand.to_string(),
            self.estimated_monthly_savings_after_discounts.to_string(),
            self.savings_opportunity_pct.to_string(),
            self.savings_after_discounts_pct.to_string(),
            self.currency.clone(),
            join_list(&self.inferred_workload_types),
            self.migration_effort.clone(),
        ]
    }
}

/// Metadata block of the raw report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReportMetadata {
    pub generated_at: String,
    pub report_type: String,
    pub total_instances: usize,
    pub total_estimated_monthly_savings_on_demand: f64,
    pub total_estimated_monthly_savings_after_discounts: f64,
    /// Instance count per finding code
    pub finding_summary: BTreeMap<String, usize>,
}

pub type RawReport = ReportDocument<RawReportMetadata, ReportRow>;

pub fn build_raw_report(rows: Vec<ReportRow>, generated_at: &str) -> RawReport {
    let mut finding_summary = BTreeMap::new();
    for row in &rows {
        let finding = if row.finding.is_empty() {
            "Unknown".to_string()
        } else {
            row.finding.clone()
        };
        *finding_summary.entry(finding).or_insert(0) += 1;
    }

    RawReport {
        report_metadata: RawReportMetadata {
            generated_at: generated_at.to_string(),
            report_type: RAW_REPORT_TYPE.to_string(),
            total_instances: rows.len(),
            total_estimated_monthly_savings_on_demand: round_to(
                rows.iter().map(|r| r.estimated_monthly_savings_on_demand).sum(),
                2,
            ),
            total_estimated_monthly_savings_after_discounts: round_to(
                rows.iter()
                    .map(|r| r.estimated_monthly_savings_after_discounts)
                    .sum(),
                2,
            ),
            finding_summary,
        },
        recommendations: rows,
    }
}
