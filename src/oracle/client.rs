use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{Effort, Generation, Oracle, TokenUsage};
use crate::config::{OracleConfig, RequestConfig};
use crate::error::{OracleError, OracleResult};
use crate::prompts::SCORE_THOUGHT_PROMPT;

/// HTTP client for a chat-completion style oracle endpoint
#[derive(Clone)]
pub struct HttpOracle {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    request_config: RequestConfig,
}

/// Message in an oracle conversation
#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

impl Message {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Request body for a completion call
#[derive(Debug, Clone, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    stream: bool,
}

/// Response body from a completion call
#[derive(Debug, Clone, Deserialize)]
struct CompletionResponse {
    completion: String,
    #[serde(default)]
    usage: Option<UsageResponse>,
}

#[derive(Debug, Clone, Deserialize)]
struct UsageResponse {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl From<UsageResponse> for TokenUsage {
    fn from(u: UsageResponse) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens.unwrap_or(0),
            completion_tokens: u.completion_tokens.unwrap_or(0),
            total_tokens: u.total_tokens.unwrap_or(0),
        }
    }
}

/// Structured payload embedded in a generation completion
#[derive(Debug, Clone, Deserialize)]
struct GenerationPayload {
    content: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    terminal: bool,
}

/// Structured payload embedded in a score completion
#[derive(Debug, Clone, Deserialize)]
struct ScorePayload {
    score: f64,
}

impl HttpOracle {
    /// Create a new oracle client
    pub fn new(config: &OracleConfig, request_config: RequestConfig) -> OracleResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(OracleError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a completion with bounded retry and exponential backoff
    async fn complete(&self, request: CompletionRequest) -> OracleResult<CompletionResponse> {
        let url = format!("{}/v1/completions", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    model = %request.model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying oracle request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    let latency = start.elapsed();
                    info!(
                        model = %request.model,
                        latency_ms = latency.as_millis(),
                        "Oracle call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        model = %request.model,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "Oracle call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(OracleError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &CompletionRequest,
    ) -> OracleResult<CompletionResponse> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling oracle"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    OracleError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let completion: CompletionResponse =
            response
                .json()
                .await
                .map_err(|e| OracleError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(completion)
    }
}

/// Extract JSON from a completion string, handling markdown code blocks.
pub(crate) fn extract_json(completion: &str) -> &str {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }

    if completion.contains("```json") {
        if let Some(block) = completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
        {
            return block.trim();
        }
    }

    if completion.contains("```") {
        if let Some(block) = completion.split("```").nth(1) {
            return block.trim();
        }
    }

    trimmed
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn generate(&self, prompt: &str, effort: Effort) -> OracleResult<Generation> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt.to_string())],
            max_tokens: effort.max_tokens(),
            stream: false,
        };

        let response = self.complete(request).await?;
        let usage = response.usage.map(TokenUsage::from).unwrap_or_default();

        // Structured payload when the oracle honors JSON mode, plain text otherwise
        match serde_json::from_str::<GenerationPayload>(extract_json(&response.completion)) {
            Ok(payload) => Ok(Generation {
                content: payload.content,
                confidence: payload.confidence,
                usage,
                terminal: payload.terminal,
            }),
            Err(e) => {
                debug!(error = %e, "Generation payload not structured, using plain text");
                Ok(Generation {
                    content: response.completion,
                    confidence: None,
                    usage,
                    terminal: false,
                })
            }
        }
    }

    async fn score(&self, content: &str) -> OracleResult<f64> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(SCORE_THOUGHT_PROMPT),
                Message::user(format!("Score this thought:\n\n\"{}\"", content)),
            ],
            max_tokens: Effort::Low.max_tokens(),
            stream: false,
        };

        let response = self.complete(request).await?;
        let raw = extract_json(&response.completion);

        let score = match serde_json::from_str::<ScorePayload>(raw) {
            Ok(payload) => payload.score,
            // Some models answer with a bare number
            Err(_) => raw
                .split_whitespace()
                .next()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| OracleError::InvalidResponse {
                    message: format!(
                        "No score found in response. First 100 chars: '{}'",
                        response.completion.chars().take(100).collect::<String>()
                    ),
                })?,
        };

        Ok(score.clamp(0.0, 1.0))
    }
}
