//! Prompt codec for the AI advisor
//!
//! `build_request` renders one report row plus the allow-list into the
//! system/user prompt pair. `parse_response` turns the model's text back
//! into an [`AdvisorResponse`], tolerating a surrounding markdown code fence.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::allowlist::AllowedType;
use crate::error::AdvisorError;
use crate::stage1::ReportRow;

/// Longest model output kept in parse errors and logs
pub const MAX_ERROR_TEXT: usize = 500;

pub const SYSTEM_PROMPT: &str = "You are an AWS EC2 instance type expert. Your role is to validate \
Compute Optimizer recommendations against an organization's approved instance type \
allow-list and suggest the best alternatives when the recommended type is not approved.

IMPORTANT: Respond ONLY with a valid JSON object. No explanations, no markdown, no extra text.";

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?\s*```").expect("valid code fence regex")
});

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

/// Markdown table of the approved types
pub fn format_allowlist_table(allowed: &[AllowedType]) -> String {
    let mut lines = vec![
        "| Instance Type | Family | Category | Discount |".to_string(),
        "|---|---|---|---|".to_string(),
    ];
    lines.extend(allowed.iter().map(|entry| {
        format!(
            "| {} | {} | {} | {}% |",
            entry.instance_type, entry.family, entry.category, entry.discount_percent
        )
    }));
    lines.join("\n")
}

/// `(system, user)` prompts for a row whose recommended type is not approved
pub fn build_request(row: &ReportRow, allowed: &[AllowedType]) -> (String, String) {
    let current_type = or_placeholder(&row.current_instance_type, "unknown");
    let recommended_type = or_placeholder(&row.recommended_instance_type, "unknown");
    let finding = or_placeholder(&row.finding, "unknown");
    let instance_name = or_placeholder(&row.instance_name, "unnamed");
    let instance_id = or_placeholder(&row.instance_id, "unknown");
    let allowlist_table = format_allowlist_table(allowed);

    let user = format!(
        "## Task
The AWS Compute Optimizer recommends migrating from **{current_type}** to **{recommended_type}**, \
but **{recommended_type}** is NOT in the organization's approved allow-list.

Select the best alternative(s) from the allow-list below.

## Current Instance Details
- **Current Type**: {current_type}
- **Current Monthly Cost**: ${current_monthly}
- **Finding**: {finding}
- **Instance Name**: {instance_name}
- **Instance ID**: {instance_id}

## Compute Optimizer Recommendation
- **Recommended Type**: {recommended_type}
- **Recommended Monthly Cost**: ${recommended_monthly}
- **Estimated Savings**: ${estimated_savings}

## Approved Allow-List
{allowlist_table}

## Selection Criteria (Priority Order)
1. **Price**: closest to or lower than the recommended type's cost
2. **vCPU count**: should meet or exceed the recommended type
3. **Memory**: should meet or exceed the recommended type
4. **Storage/network**: similar or better I/O characteristics
5. **20% headroom rule**: prefer types with ~20% more capacity than minimum required
6. **Favor higher discount tiers**: Tier 1 (50%) over Tier 2 (35%) when specs are comparable

## Required JSON Response Format
{{
  \"alternatives\": [
    {{
      \"instance_type\": \"<type>\",
      \"reason\": \"<brief justification>\",
      \"rank\": 1
    }}
  ],
  \"analysis_summary\": \"<2-3 sentence summary of the analysis>\",
  \"confidence\": \"<high|medium|low>\"
}}

Provide up to 3 ranked alternatives. Rank 1 is the best match.",
        current_monthly = row.current_monthly_price,
        recommended_monthly = row.recommended_monthly_price,
        estimated_savings = row.estimated_monthly_savings_on_demand,
    );

    (SYSTEM_PROMPT.to_string(), user)
}

/// One candidate type proposed by the model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, deserialize_with = "lenient_rank")]
    pub rank: Option<u32>,
}

impl Alternative {
    /// `#rank: type — reason`
    pub fn summary(&self) -> String {
        let rank = self
            .rank
            .map(|r| r.to_string())
            .unwrap_or_else(|| "?".to_string());
        let instance_type = or_placeholder(&self.instance_type, "?");
        format!("#{rank}: {instance_type} — {}", self.reason)
    }
}

/// Structured model answer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdvisorResponse {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub analysis_summary: String,
    #[serde(default)]
    pub confidence: Option<String>,
}

fn lenient_rank<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|r| u32::try_from(r).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Strip the first code fence, if any, and trim
pub fn strip_code_fence(raw: &str) -> &str {
    match CODE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim(),
        None => raw.trim(),
    }
}

pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Parse model text into a structured response
pub fn parse_response(raw: &str) -> Result<AdvisorResponse, AdvisorError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|source| {
        let text = truncate_chars(raw, MAX_ERROR_TEXT).to_string();
        tracing::error!(response = %text, "Failed to parse JSON response");
        AdvisorError::Parse { text, source }
    })
}
