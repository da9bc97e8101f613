//! Test doubles shared by the crate's unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use overhuman_llm::error::ProviderError;
use overhuman_llm::{
    CompletionRequest, CompletionResponse, ModelEntry, ModelTier, Provider,
};

/// Cost billed per scripted completion.
pub const SCRIPTED_COST: f64 = 0.001;

/// A provider that replays a fixed list of responses in order.
///
/// Each `complete` call pops the next script entry; an exhausted script
/// returns a server error, which doubles as the failure injection for
/// fallback tests.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    /// A provider that answers with `responses`, in order.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose every call fails.
    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    /// How many completion calls have been made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> overhuman_llm::Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(content) => Ok(CompletionResponse {
                content,
                model: request.model.clone(),
                input_tokens: 100,
                output_tokens: 50,
                latency_ms: 1,
                cost_usd: SCRIPTED_COST,
            }),
            None => Err(ProviderError::ServerError {
                status: 500,
                body: "script exhausted".into(),
            }),
        }
    }

    fn model_entries(&self) -> Vec<ModelEntry> {
        vec![
            ModelEntry::new("scripted-small", ModelTier::Simple, 0.1, 0.4),
            ModelEntry::new("scripted-mid", ModelTier::Moderate, 1.0, 4.0),
            ModelEntry::new("scripted-big", ModelTier::Complex, 10.0, 40.0),
        ]
    }
}
