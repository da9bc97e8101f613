//! Request and response types for LLM completion calls.
//!
//! These are provider-neutral: each provider module translates them to and
//! from its native wire schema ("messages with content blocks" or "chat
//! completions"). They carry everything the pipeline's cost accounting
//! needs — token counts, latency, and dollars.

use serde::{Deserialize, Serialize};

/// A message in a completion conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// The role of the message author ("system", "user", "assistant").
    pub role: String,

    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Create a message with role and content.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// A completion request sent to an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The conversation messages, in order.
    pub messages: Vec<ChatMessage>,

    /// The target model id.
    pub model: String,

    /// Maximum number of output tokens.
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Create a request with a model, messages, and an output budget.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, max_tokens: u32) -> Self {
        Self {
            messages,
            model: model.into(),
            max_tokens,
        }
    }
}

/// A completion response from an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated text, flattened from whatever block structure the
    /// provider uses natively.
    pub content: String,

    /// The model that generated the response, echoed back.
    pub model: String,

    /// Tokens consumed by the prompt.
    pub input_tokens: u32,

    /// Tokens generated in the response.
    pub output_tokens: u32,

    /// Round-trip latency in milliseconds.
    pub latency_ms: u64,

    /// Monetary cost of this call in USD, from the provider's price table.
    pub cost_usd: f64,
}

/// Task-complexity tier used by the model router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Cheap, fast models for classification and micro-reflection.
    Simple,
    /// Mid-range models for everyday task execution.
    Moderate,
    /// Frontier models for planning and meta-reflection.
    Complex,
}

/// One row of a provider's model catalog, consumed by the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Model id as the provider knows it.
    pub id: String,

    /// Complexity tier this model serves.
    pub tier: ModelTier,

    /// Input cost in dollars per million tokens.
    pub input_cost_per_m: f64,

    /// Output cost in dollars per million tokens.
    pub output_cost_per_m: f64,
}

impl ModelEntry {
    /// Build an entry.
    pub fn new(
        id: impl Into<String>,
        tier: ModelTier,
        input_cost_per_m: f64,
        output_cost_per_m: f64,
    ) -> Self {
        Self {
            id: id.into(),
            tier,
            input_cost_per_m,
            output_cost_per_m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_helpers() {
        let sys = ChatMessage::system("You are helpful.");
        assert_eq!(sys.role, "system");
        assert_eq!(sys.content, "You are helpful.");

        assert_eq!(ChatMessage::user("hi").role, "user");
        assert_eq!(ChatMessage::assistant("hello").role, "assistant");
    }

    #[test]
    fn request_construction() {
        let req = CompletionRequest::new("claude-haiku-4-5", vec![ChatMessage::user("2+2?")], 128);
        assert_eq!(req.model, "claude-haiku-4-5");
        assert_eq!(req.max_tokens, 128);
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn tier_serde_labels() {
        assert_eq!(serde_json::to_string(&ModelTier::Simple).unwrap(), "\"simple\"");
        let t: ModelTier = serde_json::from_str("\"complex\"").unwrap();
        assert_eq!(t, ModelTier::Complex);
    }

    #[test]
    fn response_serde_roundtrip() {
        let resp = CompletionResponse {
            content: "four".into(),
            model: "m".into(),
            input_tokens: 12,
            output_tokens: 3,
            latency_ms: 450,
            cost_usd: 0.000042,
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: CompletionResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "four");
        assert_eq!(back.input_tokens, 12);
        assert_eq!(back.latency_ms, 450);
    }
}
