//! The normalized input model.
//!
//! [`NormalizedInput`] is the canonical shape every signal takes once it
//! enters the daemon, whether it arrived over stdin, HTTP, a webhook, a
//! watched directory, a chat platform, a mailbox, or the internal heartbeat
//! timer. Adapters construct one via the factory methods and push it into
//! the daemon queue; nothing downstream ever sees channel-specific types.
//!
//! Inputs are immutable after construction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Channel name used by heartbeat inputs.
pub const HEARTBEAT_CHANNEL: &str = "heartbeat";

/// Payload text carried by heartbeat inputs.
pub const HEARTBEAT_PAYLOAD: &str = "heartbeat";

/// Where an input came from.
///
/// The set is closed: adapters must map onto one of these tags, and the
/// pipeline branches on the tag (e.g. `Timer` selects self-maintenance
/// behavior instead of a user reply).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputSource {
    /// Plain text from the CLI stream.
    Text,
    /// Raw JSON submitted programmatically.
    Json,
    /// Webhook receiver.
    Webhook,
    /// File-directory watcher.
    File,
    /// Internal wall-clock timer (heartbeats).
    Timer,
    /// First chat platform adapter.
    ChatA,
    /// Second chat platform adapter.
    ChatB,
    /// Third chat platform adapter.
    ChatC,
    /// SMTP/IMAP mail adapter.
    Mail,
    /// HTTP ingestion API.
    Api,
}

impl InputSource {
    /// The wire label for this source (e.g. `"chat-a"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Webhook => "webhook",
            Self::File => "file",
            Self::Timer => "timer",
            Self::ChatA => "chat-a",
            Self::ChatB => "chat-b",
            Self::ChatC => "chat-c",
            Self::Mail => "mail",
            Self::Api => "api",
        }
    }
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing priority, ordered low to critical.
///
/// Derived `Ord` follows declaration order, so
/// `Priority::Low < Priority::Critical` holds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default for user-originated inputs.
    #[default]
    Normal,
    /// Expedited handling requested.
    High,
    /// Reserved for heartbeats and operator overrides.
    Critical,
}

impl Priority {
    /// Parse a priority label, accepting both the internal lowercase form
    /// and the upper-case form used at the HTTP boundary.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Metadata attached to a normalized input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputMeta {
    /// When the input was received.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Logical channel name (e.g. "cli", "heartbeat", a chat room id).
    pub channel: String,

    /// Sender identifier within the channel.
    #[serde(default)]
    pub sender: String,

    /// Optional source URL (webhooks) or filesystem path (file watcher).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Free-form adapter-specific fields.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl InputMeta {
    /// Metadata with the given channel and everything else defaulted.
    pub fn for_channel(channel: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            channel: channel.into(),
            sender: String::new(),
            url: None,
            extra: HashMap::new(),
        }
    }
}

/// A file attached to an input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Original file name.
    pub name: String,
    /// MIME type as reported by the adapter.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Local path where the adapter staged the content.
    pub path: String,
}

/// A signal normalized into the one shape the pipeline understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedInput {
    /// Unique id, textual uuid.
    pub id: String,

    /// Which adapter class produced this input.
    pub source: InputSource,

    /// Receive-time metadata.
    pub meta: InputMeta,

    /// The task text itself.
    pub payload: String,

    /// Attachments, in the order the adapter produced them.
    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Processing priority.
    #[serde(default)]
    pub priority: Priority,

    /// Correlation id used to route the final reply (sync HTTP callers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Channel tag the reply should be delivered through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl NormalizedInput {
    /// Generic factory.
    pub fn new(source: InputSource, meta: InputMeta, payload: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            meta,
            payload: payload.into(),
            attachments: Vec::new(),
            priority: Priority::Normal,
            correlation_id: None,
            reply_to: None,
        }
    }

    /// Plain text input (CLI stream).
    pub fn text(payload: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::new(InputSource::Text, InputMeta::for_channel(channel), payload)
    }

    /// Raw JSON input.
    pub fn json(payload: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::new(InputSource::Json, InputMeta::for_channel(channel), payload)
    }

    /// Webhook input with the originating URL recorded in metadata.
    pub fn webhook(payload: impl Into<String>, url: impl Into<String>) -> Self {
        let mut meta = InputMeta::for_channel("webhook");
        meta.url = Some(url.into());
        Self::new(InputSource::Webhook, meta, payload)
    }

    /// A timer-synthesized heartbeat.
    ///
    /// Heartbeats carry the reserved source/channel pair `timer`/`heartbeat`
    /// and critical priority. They flow through the same pipeline as user
    /// inputs; the source tag selects self-maintenance behavior.
    pub fn heartbeat() -> Self {
        let mut input = Self::new(
            InputSource::Timer,
            InputMeta::for_channel(HEARTBEAT_CHANNEL),
            HEARTBEAT_PAYLOAD,
        );
        input.priority = Priority::Critical;
        input
    }

    /// True for timer-synthesized heartbeats.
    pub fn is_heartbeat(&self) -> bool {
        self.source == InputSource::Timer && self.meta.channel == HEARTBEAT_CHANNEL
    }

    /// Builder-style priority override.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder-style sender override.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.meta.sender = sender.into();
        self
    }

    /// Builder-style correlation id + reply channel.
    pub fn with_correlation(
        mut self,
        correlation_id: impl Into<String>,
        reply_to: impl Into<String>,
    ) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self.reply_to = Some(reply_to.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_labels() {
        assert_eq!(InputSource::ChatA.as_str(), "chat-a");
        assert_eq!(InputSource::Timer.as_str(), "timer");
        assert_eq!(InputSource::Mail.to_string(), "mail");
    }

    #[test]
    fn source_serde_uses_kebab_case() {
        let json = serde_json::to_string(&InputSource::ChatB).unwrap();
        assert_eq!(json, "\"chat-b\"");
        let parsed: InputSource = serde_json::from_str("\"webhook\"").unwrap();
        assert_eq!(parsed, InputSource::Webhook);
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }

    #[test]
    fn priority_parse_accepts_both_cases() {
        assert_eq!(Priority::parse("CRITICAL"), Some(Priority::Critical));
        assert_eq!(Priority::parse("low"), Some(Priority::Low));
        assert_eq!(Priority::parse("Normal"), Some(Priority::Normal));
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn text_factory_defaults() {
        let input = NormalizedInput::text("summarize this", "cli");
        assert_eq!(input.source, InputSource::Text);
        assert_eq!(input.meta.channel, "cli");
        assert_eq!(input.priority, Priority::Normal);
        assert!(input.correlation_id.is_none());
        assert!(!input.id.is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let a = NormalizedInput::text("a", "cli");
        let b = NormalizedInput::text("b", "cli");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn heartbeat_factory() {
        let hb = NormalizedInput::heartbeat();
        assert!(hb.is_heartbeat());
        assert_eq!(hb.source, InputSource::Timer);
        assert_eq!(hb.meta.channel, HEARTBEAT_CHANNEL);
        assert_eq!(hb.payload, HEARTBEAT_PAYLOAD);
        assert_eq!(hb.priority, Priority::Critical);
        assert!(hb.correlation_id.is_none());
    }

    #[test]
    fn timer_source_alone_is_not_heartbeat() {
        let input = NormalizedInput::new(
            InputSource::Timer,
            InputMeta::for_channel("cron"),
            "scheduled job",
        );
        assert!(!input.is_heartbeat());
    }

    #[test]
    fn webhook_factory_records_url() {
        let input = NormalizedInput::webhook("{\"event\":\"push\"}", "https://example.com/hook");
        assert_eq!(input.source, InputSource::Webhook);
        assert_eq!(input.meta.url.as_deref(), Some("https://example.com/hook"));
    }

    #[test]
    fn with_correlation_sets_both_fields() {
        let input =
            NormalizedInput::text("translate hello", "api").with_correlation("corr-1", "http-sync");
        assert_eq!(input.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(input.reply_to.as_deref(), Some("http-sync"));
    }

    #[test]
    fn serde_roundtrip_preserves_every_field() {
        let mut input = NormalizedInput::text("round trip", "cli")
            .with_priority(Priority::High)
            .with_sender("alice")
            .with_correlation("c1", "cli");
        input.attachments.push(Attachment {
            name: "notes.txt".into(),
            mime_type: "text/plain".into(),
            size: 42,
            path: "/tmp/notes.txt".into(),
        });
        input.meta.extra.insert("thread".into(), "t-9".into());

        let json = serde_json::to_string(&input).unwrap();
        let restored: NormalizedInput = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id, input.id);
        assert_eq!(restored.source, InputSource::Text);
        assert_eq!(restored.priority, Priority::High);
        assert_eq!(restored.payload, "round trip");
        assert_eq!(restored.meta.channel, "cli");
        assert_eq!(restored.meta.sender, "alice");
        assert_eq!(restored.meta.extra.get("thread").unwrap(), "t-9");
        assert_eq!(restored.attachments.len(), 1);
        assert_eq!(restored.attachments[0].name, "notes.txt");
        assert_eq!(restored.attachments[0].size, 42);
        assert_eq!(restored.correlation_id.as_deref(), Some("c1"));
        assert_eq!(restored.reply_to.as_deref(), Some("cli"));
        assert_eq!(restored.meta.timestamp, input.meta.timestamp);
    }

    #[test]
    fn priority_serde_labels() {
        assert_eq!(
            serde_json::to_string(&Priority::Critical).unwrap(),
            "\"critical\""
        );
        let p: Priority = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(p, Priority::High);
    }
}
