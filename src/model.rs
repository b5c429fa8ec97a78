//! Internal recommendation records
//!
//! `Recommendation` is what the Compute Optimizer adapter produces and what
//! tag enrichment and the EKS filter operate on. Price enrichment consumes it
//! and wraps it into a `PricedRecommendation`. Report-facing (display
//! label) records live in the stage report modules.

use std::collections::BTreeMap;

/// Average hours per month used for monthly price projections
pub const MONTHLY_HOURS: f64 = 730.0;

/// Finding reason codes that relate to CPU sizing
pub const CPU_FINDING_REASONS: [&str; 2] = ["CPUOverprovisioned", "CPUUnderprovisioned"];

/// Finding reason codes that relate to memory sizing
pub const MEMORY_FINDING_REASONS: [&str; 2] = ["MemoryOverprovisioned", "MemoryUnderprovisioned"];

/// One right-sizing recommendation for one EC2 instance
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Recommendation {
    pub instance_id: String,
    pub instance_arn: String,
    pub account_id: String,
    /// Value of the `Name` tag, filled by tag enrichment
    pub instance_name: String,
    pub current_instance_type: String,
    pub finding: String,
    pub finding_reasons: Vec<String>,
    pub cpu_finding_reasons: Vec<String>,
    pub memory_finding_reasons: Vec<String>,
    pub current_performance_risk: String,
    pub inferred_workload_types: Vec<String>,
    pub recommended_instance_type: String,
    pub recommendation_instance_state: String,
    pub recommended_performance_risk: f64,
    pub recommended_migration_effort: String,
    pub savings_opportunity_pct: f64,
    pub estimated_monthly_savings_on_demand: f64,
    pub savings_currency: String,
    pub savings_after_discounts_pct: f64,
    pub estimated_monthly_savings_after_discounts: f64,
    pub tags: BTreeMap<String, String>,
}

impl Recommendation {
    /// Split finding reason codes into the CPU and memory subsets
    pub fn set_finding_reasons(&mut self, reasons: Vec<String>) {
        self.cpu_finding_reasons = reasons
            .iter()
            .filter(|r| CPU_FINDING_REASONS.contains(&r.as_str()))
            .cloned()
            .collect();
        self.memory_finding_reasons = reasons
            .iter()
            .filter(|r| MEMORY_FINDING_REASONS.contains(&r.as_str()))
            .cloned()
            .collect();
        self.finding_reasons = reasons;
    }

    /// Attach the instance tags and derive the display name from `Name`
    pub fn apply_tags(&mut self, tags: BTreeMap<String, String>) {
        self.instance_name = tags.get("Name").cloned().unwrap_or_default();
        self.tags = tags;
    }
}

/// On-demand pricing derived for one recommendation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pricing {
    /// Hourly on-demand price of the current type (6 decimals)
    pub current_hourly: f64,
    /// Hourly on-demand price of the recommended type (6 decimals)
    pub recommended_hourly: f64,
    /// Monthly on-demand price of the current type (2 decimals)
    pub current_monthly: f64,
    /// Monthly on-demand price of the recommended type (2 decimals)
    pub recommended_monthly: f64,
    /// current - recommended; positive means the recommendation is cheaper
    pub monthly_difference: f64,
}

impl Pricing {
    pub fn from_hourly(current_hourly: f64, recommended_hourly: f64) -> Self {
        let current_monthly = round_to(current_hourly * MONTHLY_HOURS, 2);
        let recommended_monthly = round_to(recommended_hourly * MONTHLY_HOURS, 2);
        Self {
            current_hourly: round_to(current_hourly, 6),
            recommended_hourly: round_to(recommended_hourly, 6),
            current_monthly,
            recommended_monthly,
            monthly_difference: round_to(current_monthly - recommended_monthly, 2),
        }
    }
}

/// A recommendation after price enrichment
#[derive(Debug, Clone, PartialEq)]
pub struct PricedRecommendation {
    pub recommendation: Recommendation,
    pub pricing: Pricing,
}

/// Round half away from zero to `places` decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
