//! Stage 2: allow-list validation
//!
//! Reads a Stage 1 JSON report, approves allow-listed recommendations,
//! asks the AI advisor for an approved alternative otherwise, and writes a
//! validated report pair next to the input.

pub mod advisor;
pub mod allowlist;
pub mod bedrock;
pub mod enricher;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod trigger;

pub use advisor::{resolve_model_id, AdvisorOutcome, AiAdvisor, ConverseTransport};
pub use allowlist::{AllowListChecker, AllowedType, TierInfo};
pub use bedrock::BedrockHttpTransport;
pub use enricher::{RecommendationEnricher, ValidationResult, ValidationStatus};
pub use pipeline::{Stage2Pipeline, Stage2Report, Stage2Stats};
pub use prompt::{build_request, parse_response, AdvisorResponse, Alternative};
pub use report::{ValidatedReportMetadata, ValidatedRow};
pub use trigger::{evaluate, extract_timestamp, TriggerDecision};
