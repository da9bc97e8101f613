//! Provider configuration.
//!
//! A [`ProviderConfig`] carries everything a provider needs to talk to one
//! endpoint: base URL, API key, default model, the model catalog with
//! tiers, and the price table. The chat-completions provider is reused for
//! proxies, local model servers, and open-model aggregators by varying the
//! base URL and default model only.

use crate::pricing::PriceTable;
use crate::types::{ModelEntry, ModelTier};

/// Default per-call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for a single provider endpoint.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider name (e.g. "anthropic", "openai", "ollama").
    pub name: String,

    /// API base URL, without a trailing slash requirement.
    pub base_url: String,

    /// API key sent with every request. May be empty for local servers.
    pub api_key: String,

    /// Model used when a caller does not specify one.
    pub default_model: String,

    /// Model catalog for the router.
    pub models: Vec<ModelEntry>,

    /// Per-model dollar rates.
    pub prices: PriceTable,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// The stock Anthropic configuration (messages API).
    pub fn anthropic(api_key: impl Into<String>) -> Self {
        let models = vec![
            ModelEntry::new("claude-haiku-4-5", ModelTier::Simple, 1.0, 5.0),
            ModelEntry::new("claude-sonnet-4-5", ModelTier::Moderate, 3.0, 15.0),
            ModelEntry::new("claude-opus-4-1", ModelTier::Complex, 15.0, 75.0),
        ];
        let prices = price_table_from(&models);
        Self {
            name: "anthropic".into(),
            base_url: "https://api.anthropic.com".into(),
            api_key: api_key.into(),
            default_model: "claude-sonnet-4-5".into(),
            models,
            prices,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// The stock OpenAI configuration (chat-completions API).
    pub fn openai(api_key: impl Into<String>) -> Self {
        let models = vec![
            ModelEntry::new("gpt-4o-mini", ModelTier::Simple, 0.15, 0.6),
            ModelEntry::new("gpt-4o", ModelTier::Moderate, 2.5, 10.0),
            ModelEntry::new("o1", ModelTier::Complex, 15.0, 60.0),
        ];
        let prices = price_table_from(&models);
        Self {
            name: "openai".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: api_key.into(),
            default_model: "gpt-4o".into(),
            models,
            prices,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// A chat-completions endpoint at an arbitrary base URL (proxies,
    /// local model servers, aggregators). No catalog or prices; callers
    /// add models as needed and unknown models bill at zero.
    pub fn chat_completions(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            models: Vec::new(),
            prices: PriceTable::empty(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Builder-style base URL override.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builder-style timeout override.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Derive a price table from a model catalog.
fn price_table_from(models: &[ModelEntry]) -> PriceTable {
    let mut table = PriceTable::empty();
    for m in models {
        table.set(m.id.clone(), m.input_cost_per_m, m.output_cost_per_m);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_defaults() {
        let c = ProviderConfig::anthropic("sk-test");
        assert_eq!(c.name, "anthropic");
        assert_eq!(c.default_model, "claude-sonnet-4-5");
        assert_eq!(c.models.len(), 3);
        assert!(c.prices.get("claude-haiku-4-5").is_some());
        assert_eq!(c.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn openai_defaults() {
        let c = ProviderConfig::openai("sk-test");
        assert_eq!(c.base_url, "https://api.openai.com/v1");
        assert!(c.models.iter().any(|m| m.tier == ModelTier::Complex));
    }

    #[test]
    fn chat_completions_is_bare() {
        let c = ProviderConfig::chat_completions("ollama", "http://localhost:11434/v1", "", "llama3");
        assert!(c.models.is_empty());
        assert_eq!(c.prices.cost("llama3", 1000, 1000), 0.0);
    }

    #[test]
    fn builder_overrides() {
        let c = ProviderConfig::anthropic("k")
            .with_base_url("http://localhost:1")
            .with_timeout_secs(5);
        assert_eq!(c.base_url, "http://localhost:1");
        assert_eq!(c.timeout_secs, 5);
    }
}
