//! AI advisor
//!
//! Wraps a Bedrock Converse transport: one single-turn request per call,
//! every text block of the answer concatenated, then handed to the prompt
//! codec. [`AiAdvisor::consult`] folds every failure into
//! [`AdvisorOutcome::Failed`] so the caller branches on a value, not on an
//! error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::prompt::{parse_response, AdvisorResponse};
use crate::error::AdvisorError;

/// Shorthand model names accepted in `BEDROCK_MODEL_ID`
pub const MODEL_ALIASES: [(&str, &str); 2] = [
    ("claude", "anthropic.claude-3-5-sonnet-20241022-v2:0"),
    ("nova", "amazon.nova-pro-v1:0"),
];

pub const MAX_TOKENS: u32 = 2048;
pub const TEMPERATURE: f64 = 0.1;

/// Full model id for an alias; anything else is returned as given
pub fn resolve_model_id(model: &str) -> String {
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == model)
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| model.to_string())
}

// ============================================================================
// Converse wire types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
    pub system: Vec<ContentBlock>,
    pub messages: Vec<Message>,
    pub inference_config: InferenceConfig,
}

impl ConverseRequest {
    pub fn single_turn(system: &str, user: &str) -> Self {
        Self {
            system: vec![ContentBlock::text(system)],
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![ContentBlock::text(user)],
            }],
            inference_config: InferenceConfig {
                max_tokens: MAX_TOKENS,
                temperature: TEMPERATURE,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConverseOutput {
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseResponse {
    #[serde(default)]
    pub output: ConverseOutput,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

impl ConverseResponse {
    /// Concatenation of every text block of the output message
    pub fn text(&self) -> String {
        self.output
            .message
            .iter()
            .flat_map(|m| &m.content)
            .filter_map(|block| block.text.as_deref())
            .collect()
    }
}

/// Transport for the Converse operation
#[async_trait]
pub trait ConverseTransport: Send + Sync {
    async fn converse(
        &self,
        model_id: &str,
        request: &ConverseRequest,
    ) -> Result<ConverseResponse, AdvisorError>;
}

// ============================================================================
// Advisor
// ============================================================================

/// Result of one consultation
#[derive(Debug)]
pub enum AdvisorOutcome {
    /// At least one alternative was proposed
    Suggested(AdvisorResponse),
    Failed(AdvisorError),
}

pub struct AiAdvisor {
    transport: Arc<dyn ConverseTransport>,
    model_id: String,
}

impl AiAdvisor {
    /// `model` may be an alias (`claude`, `nova`) or a full model id
    pub fn new(transport: Arc<dyn ConverseTransport>, model: &str) -> Self {
        let model_id = resolve_model_id(model);
        tracing::info!(model = %model_id, "AI advisor initialized");
        Self {
            transport,
            model_id,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Send the prompts and parse the structured answer
    pub async fn invoke(&self, system: &str, user: &str) -> Result<AdvisorResponse, AdvisorError> {
        tracing::info!(model = %self.model_id, "Invoking Bedrock model");

        let request = ConverseRequest::single_turn(system, user);
        let response = self.transport.converse(&self.model_id, &request).await?;

        let text = response.text();
        if text.is_empty() {
            return Err(AdvisorError::EmptyResponse);
        }
        let parsed = parse_response(&text)?;

        if let Some(usage) = &response.usage {
            tracing::info!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Bedrock response"
            );
        }
        Ok(parsed)
    }

    /// `invoke`, with zero alternatives counted as a failure
    pub async fn consult(&self, system: &str, user: &str) -> AdvisorOutcome {
        match self.invoke(system, user).await {
            Ok(response) if response.alternatives.is_empty() => {
                AdvisorOutcome::Failed(AdvisorError::NoAlternatives)
            }
            Ok(response) => AdvisorOutcome::Suggested(response),
            Err(e) => AdvisorOutcome::Failed(e),
        }
    }
}
