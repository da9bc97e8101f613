//! Deterministic skill registry.
//!
//! A skill is a synthesized code path that can stand in for an LLM call on
//! a fingerprinted task. Synthesis happens outside the daemon; the
//! registry only holds the executable results and hands them to the
//! pipeline's execution stage. The cache is an `RwLock` map for many
//! readers and rare writers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use overhuman_types::Result;

/// A deterministic code path standing in for an LLM call.
pub trait Skill: Send + Sync {
    /// Stable skill identifier.
    fn id(&self) -> &str;

    /// Human-readable description for listings.
    fn describe(&self) -> &str;

    /// Execute against a goal and raw payload, returning the result text.
    ///
    /// # Errors
    ///
    /// Any error makes the pipeline fall back to the LLM and flag the
    /// skill for review.
    fn execute(&self, goal: &str, payload: &str) -> Result<String>;
}

/// Holds registered skills keyed by id.
#[derive(Default)]
pub struct SkillRegistry {
    skills: RwLock<HashMap<String, Arc<dyn Skill>>>,
}

impl SkillRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a skill under its id.
    pub fn register(&self, skill: Arc<dyn Skill>) {
        let id = skill.id().to_string();
        debug!(skill = %id, "skill registered");
        self.skills.write().insert(id, skill);
    }

    /// Fetch a skill by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Skill>> {
        self.skills.read().get(id).cloned()
    }

    /// Remove a skill. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.skills.write().remove(id).is_some()
    }

    /// Sorted skill ids.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.skills.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered skills.
    pub fn len(&self) -> usize {
        self.skills.read().len()
    }

    /// True when no skill is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
