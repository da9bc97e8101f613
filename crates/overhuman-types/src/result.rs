//! The per-run outcome record.

use serde::{Deserialize, Serialize};

/// Everything the pipeline knows about one completed run.
///
/// Produced exactly once per processed input. Consumed by logging, the
/// reflection engine, and the response router; cached briefly for
/// duplicate-input idempotency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Task id, equal to the normalized input's id.
    pub task_id: String,

    /// Whether the run completed its execution stages.
    pub success: bool,

    /// Summed cost of every LLM call made during the run, in USD.
    pub cost_usd: f64,

    /// Wall-clock from intake start to goal-update end.
    pub elapsed_ms: u64,

    /// Review-assigned quality score in [0, 1].
    pub quality: f64,

    /// Final result text delivered to the caller. Empty on failure.
    pub result: String,

    /// Fingerprint of the (goal, task type) pair.
    pub fingerprint: String,

    /// True when this run pushed its pattern over the automation threshold.
    pub automation_triggered: bool,

    /// Failure reason when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RunResult {
    /// A failed result with the given reason and zeroed accounting.
    pub fn failure(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            cost_usd: 0.0,
            elapsed_ms: 0,
            quality: 0.0,
            result: String::new(),
            fingerprint: String::new(),
            automation_triggered: false,
            reason: Some(reason.into()),
        }
    }
}
