//! Lightweight goal tracking for the pipeline's final stage.
//!
//! Goals are short free-text objectives accumulated from reflection
//! output. The tracker only needs to answer "what is pending" and "how
//! many completed" for the macro-reflection aggregate.

use parking_lot::Mutex;

#[derive(Default)]
struct GoalState {
    pending: Vec<String>,
    completed: u64,
}

/// Thread-safe pending/completed goal lists.
#[derive(Default)]
pub struct GoalTracker {
    state: Mutex<GoalState>,
}

impl GoalTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending goal; duplicates are dropped.
    pub fn add(&self, goal: impl Into<String>) {
        let goal = goal.into();
        if goal.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        if !state.pending.contains(&goal) {
            state.pending.push(goal);
        }
    }

    /// Mark one run's goal completed.
    pub fn complete_one(&self) {
        self.state.lock().completed += 1;
    }

    /// Remove a pending goal when reflection reports it done.
    pub fn resolve(&self, goal: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.pending.len();
        state.pending.retain(|g| g != goal);
        let removed = state.pending.len() < before;
        if removed {
            state.completed += 1;
        }
        removed
    }

    /// Pending goals, oldest first.
    pub fn pending(&self) -> Vec<String> {
        self.state.lock().pending.clone()
    }

    /// Completed count.
    pub fn completed(&self) -> u64 {
        self.state.lock().completed
    }
}
