//! Environment configuration for both stages
//!
//! Values are read through a lookup closure so tests can supply a map
//! instead of touching the process environment. Empty values count as
//! unset.

use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_REPORT_PREFIX: &str = "reports";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MODEL_ID: &str = "claude";

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Settings of the report generation stage
#[derive(Debug, Clone, PartialEq)]
pub struct Stage1Settings {
    pub report_bucket: String,
    pub report_prefix: String,
    /// Region whose on-demand prices are looked up
    pub region: String,
    /// Accounts to query; empty means the caller's account only
    pub account_ids: Vec<String>,
}

impl Stage1Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let report_bucket = non_empty(&lookup, "REPORT_BUCKET").ok_or(ConfigError::Missing {
            key: "REPORT_BUCKET",
        })?;

        let region = non_empty(&lookup, "AWS_DEFAULT_REGION")
            .or_else(|| non_empty(&lookup, "AWS_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let account_ids = non_empty(&lookup, "ACCOUNT_IDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            report_bucket,
            report_prefix: non_empty(&lookup, "REPORT_PREFIX")
                .unwrap_or_else(|| DEFAULT_REPORT_PREFIX.to_string()),
            region,
            account_ids,
        })
    }
}

/// Settings of the validation stage
#[derive(Clone, PartialEq)]
pub struct Stage2Settings {
    /// Output bucket; the triggering bucket is used when unset
    pub report_bucket: Option<String>,
    pub report_prefix: String,
    /// Model alias (`claude`, `nova`) or full Bedrock model id
    pub model_id: String,
    pub bedrock_region: String,
    /// Overrides the Bedrock runtime endpoint (e.g. a VPC endpoint)
    pub bedrock_endpoint: Option<String>,
    pub bedrock_token: Option<String>,
    /// Allow-list YAML; the embedded default is used when unset
    pub allowlist_path: Option<PathBuf>,
    /// Directory that also receives the validated report pair
    pub local_output_dir: Option<PathBuf>,
}

impl Stage2Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bedrock_endpoint = non_empty(&lookup, "BEDROCK_ENDPOINT_URL");
        if let Some(endpoint) = &bedrock_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::Invalid {
                    key: "BEDROCK_ENDPOINT_URL",
                    message: format!("'{endpoint}' is not an http(s) URL"),
                });
            }
        }

        Ok(Self {
            report_bucket: non_empty(&lookup, "REPORT_BUCKET"),
            report_prefix: non_empty(&lookup, "REPORT_PREFIX")
                .unwrap_or_else(|| DEFAULT_REPORT_PREFIX.to_string()),
            model_id: non_empty(&lookup, "BEDROCK_MODEL_ID")
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            bedrock_region: non_empty(&lookup, "BEDROCK_REGION")
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            bedrock_endpoint,
            bedrock_token: non_empty(&lookup, "AWS_BEARER_TOKEN_BEDROCK"),
            allowlist_path: non_empty(&lookup, "ALLOWLIST_PATH").map(PathBuf::from),
            local_output_dir: non_empty(&lookup, "LOCAL_OUTPUT_DIR").map(PathBuf::from),
        })
    }

    /// Bucket that receives the validated reports
    pub fn output_bucket<'a>(&'a self, trigger_bucket: &'a str) -> &'a str {
        self.report_bucket.as_deref().unwrap_or(trigger_bucket)
    }
}

impl Default for Stage2Settings {
    fn default() -> Self {
        Self {
            report_bucket: None,
            report_prefix: DEFAULT_REPORT_PREFIX.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            bedrock_region: DEFAULT_REGION.to_string(),
            bedrock_endpoint: None,
            bedrock_token: None,
            allowlist_path: None,
            local_output_dir: None,
        }
    }
}

impl fmt::Debug for Stage2Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage2Settings")
            .field("report_bucket", &self.report_bucket)
            .field("report_prefix", &self.report_prefix)
            .field("model_id", &self.model_id)
            .field("bedrock_region", &self.bedrock_region)
            .field("bedrock_endpoint", &self.bedrock_endpoint)
            .field(
                "bedrock_token",
                &self.bedrock_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("allowlist_path", &self.allowlist_path)
            .field("local_output_dir", &self.local_output_dir)
            .finish()
    }
}
