//! # overhuman-llm
//!
//! LLM provider abstraction and model routing.
//!
//! - **[`provider`]** -- the [`Provider`] trait
//! - **[`anthropic`]** -- messages-with-content-blocks wire schema
//! - **[`openai_compat`]** -- chat-completions wire schema (OpenAI, proxies,
//!   local model servers, aggregators)
//! - **[`router`]** -- tier-based [`ModelRouter`]
//! - **[`pricing`]** -- per-model dollar rates
//! - **[`config`]** -- [`ProviderConfig`] with stock endpoint presets
//!
//! Every completion response carries token counts, latency, and cost, so
//! the pipeline can do its accounting without provider-specific knowledge.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod openai_compat;
pub mod pricing;
pub mod provider;
pub mod router;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use config::ProviderConfig;
pub use error::{ProviderError, Result};
pub use openai_compat::OpenAiCompatProvider;
pub use pricing::PriceTable;
pub use provider::Provider;
pub use router::ModelRouter;
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, ModelEntry, ModelTier};

use std::sync::Arc;

/// Build a provider from the daemon configuration.
///
/// `provider` selects the wire schema: "anthropic" uses the messages API,
/// anything else is treated as a chat-completions endpoint named after
/// itself. A non-empty `base_url` overrides the preset endpoint.
pub fn build_provider(
    provider: &str,
    api_key: &str,
    base_url: &str,
    default_model: &str,
) -> Arc<dyn Provider> {
    match provider {
        "anthropic" => {
            let mut config = ProviderConfig::anthropic(api_key);
            if !base_url.is_empty() {
                config.base_url = base_url.to_string();
            }
            if !default_model.is_empty() {
                config.default_model = default_model.to_string();
            }
            Arc::new(AnthropicProvider::new(config))
        }
        "openai" => {
            let mut config = ProviderConfig::openai(api_key);
            if !base_url.is_empty() {
                config.base_url = base_url.to_string();
            }
            if !default_model.is_empty() {
                config.default_model = default_model.to_string();
            }
            Arc::new(OpenAiCompatProvider::new(config))
        }
        other => {
            let url = if base_url.is_empty() {
                "http://127.0.0.1:8080/v1"
            } else {
                base_url
            };
            Arc::new(OpenAiCompatProvider::new(ProviderConfig::chat_completions(
                other,
                url,
                api_key,
                default_model,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_provider_selects_schema() {
        let p = build_provider("anthropic", "k", "", "");
        assert_eq!(p.name(), "anthropic");

        let p = build_provider("openai", "k", "", "gpt-4o-mini");
        assert_eq!(p.name(), "openai");

        let p = build_provider("ollama", "", "http://localhost:11434/v1", "llama3");
        assert_eq!(p.name(), "ollama");
    }

    #[test]
    fn build_provider_keeps_catalog_for_known_endpoints() {
        let p = build_provider("anthropic", "k", "", "");
        assert!(!p.model_entries().is_empty());
        let p = build_provider("somewhere", "", "", "m");
        assert!(p.model_entries().is_empty());
    }
}
