//! Entry types for the memory and pattern substrate.
//!
//! These are the value types shared between the durable store and the
//! pipeline: short-term exchanges, long-term summaries, pattern statistics,
//! and shared-knowledge items. The stores that own them live in
//! `overhuman-store` and `overhuman-core`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a short-term entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human (or adapter) side of an exchange.
    User,
    /// The pipeline's reply.
    Assistant,
    /// Daemon-internal notes.
    System,
}

/// One exchange held in the short-term ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortTermEntry {
    /// Unique id, textual uuid.
    pub id: String,
    /// Who produced the entry.
    pub role: Role,
    /// The exchange text.
    pub content: String,
    /// Free-form annotations (task id, channel, …).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
}

impl ShortTermEntry {
    /// A fresh entry stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Builder-style metadata insertion.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A durable summary in long-term memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermEntry {
    /// Stable id chosen by the writer (e.g. `"{task_id}_meso"`).
    pub id: String,
    /// The stored summary text.
    pub summary: String,
    /// Tag list; persisted comma-joined and re-split on read.
    pub tags: Vec<String>,
    /// Run that produced the entry.
    pub run_id: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl LongTermEntry {
    /// A fresh entry stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        summary: impl Into<String>,
        tags: Vec<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            tags,
            run_id: run_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Running statistics for one recurring task shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternEntry {
    /// SHA-256 fingerprint of (goal, task type), lowercase hex. Primary key.
    pub fingerprint: String,
    /// Latest observed human description of the task shape.
    pub description: String,
    /// How many times this shape has been observed. Never decreases.
    pub count: u64,
    /// Exact arithmetic mean of all recorded qualities, in [0, 1].
    pub avg_quality: f64,
    /// When the shape was last observed.
    pub last_seen: DateTime<Utc>,
    /// Linked deterministic skill, if one has been synthesized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
}

/// What kind of knowledge an SKB entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkbKind {
    /// A recurring task shape worth sharing.
    Pattern,
    /// A reflection-produced observation.
    Insight,
    /// A reusable deterministic capability.
    Skill,
    /// A higher-level behavioral policy.
    Strategy,
}

impl SkbKind {
    /// Wire label (lowercase).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Insight => "insight",
            Self::Skill => "skill",
            Self::Strategy => "strategy",
        }
    }

    /// Parse a wire label.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pattern" => Some(Self::Pattern),
            "insight" => Some(Self::Insight),
            "skill" => Some(Self::Skill),
            "strategy" => Some(Self::Strategy),
            _ => None,
        }
    }
}

/// A cross-agent shared knowledge item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkbEntry {
    /// Stable id.
    pub id: String,
    /// Knowledge kind.
    pub kind: SkbKind,
    /// Originating agent name.
    pub agent: String,
    /// The knowledge text.
    pub content: String,
    /// Tag list.
    pub tags: Vec<String>,
    /// Running fitness in [0, 1].
    pub fitness: f64,
    /// How many times the item has been used.
    pub usage_count: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl SkbEntry {
    /// A fresh entry with zero usage and the given initial fitness.
    pub fn new(
        id: impl Into<String>,
        kind: SkbKind,
        agent: impl Into<String>,
        content: impl Into<String>,
        tags: Vec<String>,
        fitness: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            agent: agent.into(),
            content: content.into(),
            tags,
            fitness: fitness.clamp(0.0, 1.0),
            usage_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Direction tag appended to propagated SKB entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationDirection {
    /// Child to parent.
    Up,
    /// Parent to child.
    Down,
    /// Sibling to sibling.
    Horizontal,
}

impl PropagationDirection {
    /// Tag string appended to propagated entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Horizontal => "horizontal",
        }
    }
}
