//! Error types for the report pipeline
//!
//! Each collaborator boundary has its own `thiserror` enum. `PipelineError`
//! rolls them up for the two stage entry points; only configuration and
//! trigger errors are meant to end an invocation; everything else is
//! absorbed per record further down.

use std::path::PathBuf;

use thiserror::Error;

/// Invocation-level error returned by the stage pipelines
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),

    #[error("Recommendation source error: {0}")]
    Source(#[from] SourceError),

    #[error("Tag lookup error: {0}")]
    Tags(#[from] TagLookupError),

    #[error("Allow-list error: {0}")]
    AllowList(#[from] AllowListError),

    #[error("Artifact store error: {0}")]
    Store(#[from] StoreError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

impl PipelineError {
    /// HTTP-style status code surfaced in the invocation summary
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Trigger(_) => 400,
            _ => 500,
        }
    }
}

/// Missing or malformed settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} environment variable is required")]
    Missing { key: &'static str },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Malformed artifact-creation notification
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("No Records found in S3 event")]
    NoRecords,

    #[error("Missing bucket or key in S3 event: bucket={bucket}, key={key}")]
    MissingLocation { bucket: String, key: String },

    #[error("Unreadable S3 event: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failures of the paginated recommendation source or the price source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Request failed: {message}")]
    Request { message: String },

    #[error("Unknown page token '{token}'")]
    UnknownPageToken { token: String },

    #[error("Failed to read snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failures of the instance tag lookup
#[derive(Error, Debug)]
pub enum TagLookupError {
    /// One or more instances no longer exist (usually terminated).
    /// `missing` lists the ids the source rejected, when it says.
    #[error("Instances not found: {message}")]
    NotFound {
        message: String,
        missing: Vec<String>,
    },

    #[error("Tag request failed: {message}")]
    Request { message: String },
}

/// Allow-list loading failures
#[derive(Error, Debug)]
pub enum AllowListError {
    #[error("Failed to read allow-list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid allow-list YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Instance type '{instance_type}' is listed in both '{first_tier}' and '{second_tier}'")]
    DuplicateType {
        instance_type: String,
        first_tier: String,
        second_tier: String,
    },

    #[error("Tier '{tier}' has discount {percent}%, expected 0-100")]
    InvalidDiscount { tier: String, percent: u32 },
}

/// AI advisor failures. All of them put the record into the
/// "AI Validation Failed" state.
#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Bedrock request failed: {message}")]
    Transport { message: String },

    #[error("Bedrock returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Empty response from Bedrock")]
    EmptyResponse,

    #[error("Could not parse Bedrock response as JSON: {source} (response: {text})")]
    Parse {
        /// Original model output, truncated for logging
        text: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Bedrock returned no alternatives")]
    NoAlternatives,
}

/// Artifact store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {uri}")]
    NotFound { uri: String },

    #[error("I/O error on {uri}: {source}")]
    Io {
        uri: String,
        #[source]
        source: std::io::Error,
    },
}

/// Report rendering and parsing failures
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Report is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
