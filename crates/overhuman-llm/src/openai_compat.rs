//! Chat-completions provider implementation.
//!
//! [`OpenAiCompatProvider`] works with any API that follows the OpenAI
//! chat-completions format, which covers OpenAI itself plus most proxies,
//! local model servers, and open-model aggregators. Point it at a
//! different endpoint by changing the `base_url` in [`ProviderConfig`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::provider::Provider;
use crate::types::{CompletionRequest, CompletionResponse, ModelEntry};

/// An LLM provider speaking the chat-completions API.
pub struct OpenAiCompatProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl OpenAiCompatProvider {
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

    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

// ── Wire schema ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    model: String,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let wire = WireRequest {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
            max_tokens: request.max_tokens,
        };

        debug!(
            provider = %self.config.name,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let started = Instant::now();
        let mut req = self
            .http
            .post(self.completions_url())
            .header("Content-Type", "application/json");
        if !self.config.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.config.api_key));
        }
        let response = req.json(&wire).send().await?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                let retry_after_ms = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(|secs| secs * 1000)
                    .unwrap_or(1000);
                return Err(ProviderError::RateLimited { retry_after_ms });
            }
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ProviderError::AuthFailed(body));
            }
            if status.is_server_error() {
                return Err(ProviderError::ServerError {
                    status: status.as_u16(),
                    body,
                });
            }
            return Err(ProviderError::InvalidResponse(format!("HTTP {status}: {body}")));
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response: {e}")))?;

        let content = wire
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError::InvalidResponse("response had no choices".into()))?;

        let cost_usd = self
            .config
            .prices
            .cost(&wire.model, wire.usage.prompt_tokens, wire.usage.completion_tokens);

        debug!(
            provider = %self.config.name,
            model = %wire.model,
            input_tokens = wire.usage.prompt_tokens,
            output_tokens = wire.usage.completion_tokens,
            latency_ms,
            "chat completion response received"
        );

        Ok(CompletionResponse {
            content,
            model: wire.model,
            input_tokens: wire.usage.prompt_tokens,
            output_tokens: wire.usage.completion_tokens,
            latency_ms,
            cost_usd,
        })
    }

    fn model_entries(&self) -> Vec<ModelEntry> {
        self.config.models.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(ProviderConfig::openai("sk-test").with_base_url(server.uri()))
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("gpt-4o", vec![ChatMessage::user("hello")], 64)
    }

    #[tokio::test]
    async fn complete_parses_choice_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "hello"}],
                "max_tokens": 64,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "hi there"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 400, "completion_tokens": 100, "total_tokens": 500}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider_for(&server).complete(&request()).await.unwrap();
        assert_eq!(response.content, "hi there");
        assert_eq!(response.input_tokens, 400);
        assert_eq!(response.output_tokens, 100);
        // 400 in at $2.50/M + 100 out at $10/M.
        assert!((response.cost_usd - (0.001 + 0.001)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn local_server_without_key_omits_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}}],
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(ProviderConfig::chat_completions(
            "ollama",
            server.uri(),
            "",
            "llama3",
        ));
        let response = provider
            .complete(&CompletionRequest::new("llama3", vec![ChatMessage::user("x")], 16))
            .await
            .unwrap();
        assert_eq!(response.content, "ok");
        // No usage reported: counts and cost stay zero.
        assert_eq!(response.input_tokens, 0);
        assert_eq!(response.cost_usd, 0.0);
    }

    #[tokio::test]
    async fn missing_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o",
                "choices": []
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn http_4xx_maps_by_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = provider_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthFailed(_)));
    }

    #[tokio::test]
    async fn http_5xx_maps_to_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = provider_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::ServerError { status: 500, .. }));
    }
}
