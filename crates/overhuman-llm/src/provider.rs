//! The core [`Provider`] trait for LLM completions.
//!
//! All LLM providers implement this trait, which provides a single
//! `complete` method plus a model catalog for the router.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CompletionRequest, CompletionResponse, ModelEntry};

/// A provider that can execute completion requests.
///
/// Implementations handle the protocol details for a specific wire schema
/// (authentication, request formatting, response parsing). The two
/// implementations are [`AnthropicProvider`](crate::anthropic::AnthropicProvider)
/// for the messages-with-content-blocks schema and
/// [`OpenAiCompatProvider`](crate::openai_compat::OpenAiCompatProvider) for
/// the chat-completions schema used by most other endpoints.
///
/// # Example
///
/// ```rust,ignore
/// use overhuman_llm::{Provider, CompletionRequest, ChatMessage};
///
/// async fn ask(provider: &dyn Provider) -> overhuman_llm::Result<String> {
///     let request = CompletionRequest::new(
///         "claude-haiku-4-5",
///         vec![ChatMessage::user("What is 2+2?")],
///         128,
///     );
///     let response = provider.complete(&request).await?;
///     Ok(response.content)
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the provider name (e.g. "anthropic", "openai").
    fn name(&self) -> &str;

    /// Execute a completion request and return the response.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`](crate::error::ProviderError) on network
    /// failure, authentication rejection, rate limiting, server errors, or
    /// an unparseable response.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// The models this provider serves, with tiers and rates, for the
    /// model router.
    fn model_entries(&self) -> Vec<ModelEntry>;
}
