//! Anthropic provider implementation (messages API).
//!
//! Speaks the "messages with content blocks" wire schema: a top-level
//! system string, role-tagged messages, and a response whose content is an
//! array of typed blocks. Text blocks are flattened into the
//! provider-neutral [`CompletionResponse`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::provider::Provider;
use crate::types::{CompletionRequest, CompletionResponse, ModelEntry};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// An LLM provider speaking the Anthropic messages API.
pub struct AnthropicProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new provider from configuration.
    pub fn new(config: ProviderConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    /// Returns the provider configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn messages_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/v1/messages")
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.config.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "anthropic api key is empty".into(),
            ));
        }
        Ok(())
    }
}

// ── Wire schema ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    content: Vec<WireBlock>,
    model: String,
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: WireErrorBody,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: String,
}

/// Extract the provider's error message from a JSON error body, falling
/// back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<WireError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// Parse a `Retry-After` header (whole seconds) into milliseconds.
fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(|secs| secs * 1000)
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.ensure_configured()?;

        // The messages API takes system text out-of-band; fold any system
        // messages into one top-level string.
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();
        for msg in &request.messages {
            if msg.role == "system" {
                system_parts.push(msg.content.as_str());
            } else {
                messages.push(WireMessage {
                    role: &msg.role,
                    content: &msg.content,
                });
            }
        }
        let wire = WireRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            messages,
        };

        debug!(
            provider = %self.config.name,
            model = %request.model,
            messages = request.messages.len(),
            "sending messages request"
        );

        let started = Instant::now();
        let response = self
            .http
            .post(self.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&wire)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                let retry_after_ms = parse_retry_after(&response).unwrap_or(1000);
                return Err(ProviderError::RateLimited { retry_after_ms });
            }
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ProviderError::AuthFailed(error_message(&body)));
            }
            if status.is_server_error() {
                return Err(ProviderError::ServerError {
                    status: status.as_u16(),
                    body: error_message(&body),
                });
            }
            return Err(ProviderError::InvalidResponse(format!(
                "HTTP {status}: {}",
                error_message(&body)
            )));
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response: {e}")))?;

        let content: String = wire
            .content
            .iter()
            .filter_map(|block| match block {
                WireBlock::Text { text } => Some(text.as_str()),
                WireBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let cost_usd = self
            .config
            .prices
            .cost(&wire.model, wire.usage.input_tokens, wire.usage.output_tokens);

        debug!(
            provider = %self.config.name,
            model = %wire.model,
            input_tokens = wire.usage.input_tokens,
            output_tokens = wire.usage.output_tokens,
            latency_ms,
            "messages response received"
        );

        Ok(CompletionResponse {
            content,
            model: wire.model,
            input_tokens: wire.usage.input_tokens,
            output_tokens: wire.usage.output_tokens,
            latency_ms,
            cost_usd,
        })
    }

    fn model_entries(&self) -> Vec<ModelEntry> {
        self.config.models.clone()
    }
}
