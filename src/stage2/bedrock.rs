//! Bedrock Converse over HTTP
//!
//! `POST {endpoint}/model/{modelId}/converse` with an optional bearer token
//! (Bedrock API keys). Throttling, 5xx responses, timeouts and connection
//! errors are retried with exponential backoff; other failures return at
//! once.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::advisor::{ConverseRequest, ConverseResponse, ConverseTransport};
use crate::error::AdvisorError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Regional Bedrock runtime endpoint
pub fn runtime_endpoint(region: &str) -> String {
    format!("https://bedrock-runtime.{region}.amazonaws.com")
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub struct BedrockHttpTransport {
    client: Client,
    endpoint: String,
    bearer_token: Option<String>,
    max_attempts: u32,
    base_delay: Duration,
}

impl BedrockHttpTransport {
    pub fn new(region: &str, bearer_token: Option<String>) -> Result<Self, AdvisorError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AdvisorError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: runtime_endpoint(region),
            bearer_token,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        })
    }

    /// Replace the regional endpoint, e.g. with a VPC endpoint or a local mock
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn converse_url(&self, model_id: &str) -> String {
        format!(
            "{}/model/{}/converse",
            self.endpoint,
            urlencoding::encode(model_id)
        )
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[async_trait]
impl ConverseTransport for BedrockHttpTransport {
    async fn converse(
        &self,
        model_id: &str,
        request: &ConverseRequest,
    ) -> Result<ConverseResponse, AdvisorError> {
        let url = self.converse_url(model_id);
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = self.backoff(attempt - 1);
                tracing::warn!(
                    attempt,
                    max_attempts = self.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying Bedrock request"
                );
                tokio::time::sleep(delay).await;
            }

            let mut builder = self.client.post(&url).json(request);
            if let Some(token) = &self.bearer_token {
                builder = builder.bearer_auth(token);
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    let error = AdvisorError::Transport {
                        message: e.to_string(),
                    };
                    if !retryable {
                        return Err(error);
                    }
                    last_error = Some(error);
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<ConverseResponse>()
                    .await
                    .map_err(|e| AdvisorError::Transport {
                        message: format!("Unreadable Converse response: {e}"),
                    });
            }

            let body = response.text().await.unwrap_or_default();
            let error = AdvisorError::HttpStatus {
                status: status.as_u16(),
                body,
            };
            if !is_retryable(status) {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or(AdvisorError::Transport {
            message: "no attempts made".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converse_url_encodes_model_id() {
        let transport = BedrockHttpTransport::new("us-west-2", None).unwrap();
        assert_eq!(
            transport.converse_url("anthropic.claude-3-5-sonnet-20241022-v2:0"),
            "https://bedrock-runtime.us-west-2.amazonaws.com/model/anthropic.claude-3-5-sonnet-20241022-v2%3A0/converse"
        );
    }

    #[test]
    fn test_with_endpoint_trims_slash() {
        let transport = BedrockHttpTransport::new("us-east-1", None)
            .unwrap()
            .with_endpoint("http://localhost:9000/");
        assert_eq!(transport.endpoint(), "http://localhost:9000");
        assert_eq!(
            transport.converse_url("m"),
            "http://localhost:9000/model/m/converse"
        );
    }

    #[test]
    fn test_backoff_doubles() {
        let transport = BedrockHttpTransport::new("us-east-1", None)
            .unwrap()
            .with_retry(4, Duration::from_millis(100));
        assert_eq!(transport.backoff(1), Duration::from_millis(100));
        assert_eq!(transport.backoff(2), Duration::from_millis(200));
        assert_eq!(transport.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::FORBIDDEN));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let transport = BedrockHttpTransport::new("us-east-1", Some("token".to_string()))
            .unwrap()
            .with_endpoint("http://127.0.0.1:9")
            .with_retry(2, Duration::from_millis(1));
        let request = ConverseRequest::single_turn("s", "u");
        let err = transport.converse("m", &request).await.unwrap_err();
        assert!(matches!(err, AdvisorError::Transport { .. }));
    }
}
