//! Chat platform adapter contract surface.
//!
//! The three chat platforms (sources `chat-a`, `chat-b`, `chat-c`) share
//! one adapter: bot protocols differ only behind the [`ChatClient`]
//! trait, which a platform crate implements with its own wire format.
//! This module owns everything protocol-independent: the allow-list, the
//! poll loop, message normalization, and reply routing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use overhuman_types::input::{InputMeta, InputSource, NormalizedInput};

use crate::traits::{ChannelAdapter, ChannelError, Result};

/// Which chat platform slot an adapter occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPlatform {
    /// First configured platform.
    A,
    /// Second configured platform.
    B,
    /// Third configured platform.
    C,
}

impl ChatPlatform {
    /// The adapter/source name for this slot.
    pub fn name(&self) -> &'static str {
        match self {
            Self::A => "chat-a",
            Self::B => "chat-b",
            Self::C => "chat-c",
        }
    }

    fn source(&self) -> InputSource {
        match self {
            Self::A => InputSource::ChatA,
            Self::B => InputSource::ChatB,
            Self::C => InputSource::ChatC,
        }
    }
}

/// One message fetched from a chat platform.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Sender identifier within the platform.
    pub sender: String,
    /// Chat / room / conversation identifier.
    pub chat_id: String,
    /// Message text.
    pub text: String,
}

/// The wire-protocol seam a platform crate implements.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Fetch messages that arrived since the last call.
    async fn fetch_updates(&self) -> Result<Vec<ChatMessage>>;

    /// Send a message into a chat.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()>;
}

/// Adapter settings shared by all chat platforms.
#[derive(Debug, Clone)]
pub struct ChatAdapterConfig {
    /// Poll interval in seconds.
    pub poll_secs: u64,
    /// Senders allowed to create tasks; empty allows everyone.
    pub allowed_senders: Vec<String>,
}

impl Default for ChatAdapterConfig {
    fn default() -> Self {
        Self {
            poll_secs: 2,
            allowed_senders: Vec::new(),
        }
    }
}

/// Platform-independent chat adapter over a [`ChatClient`].
pub struct ChatAdapter {
    platform: ChatPlatform,
    client: Arc<dyn ChatClient>,
    config: ChatAdapterConfig,
}

impl ChatAdapter {
    /// Create an adapter for one platform slot.
    pub fn new(
        platform: ChatPlatform,
        client: Arc<dyn ChatClient>,
        config: ChatAdapterConfig,
    ) -> Self {
        Self {
            platform,
            client,
            config,
        }
    }

    /// Allow-list check; empty list allows everyone.
    pub fn is_allowed(&self, sender: &str) -> bool {
        self.config.allowed_senders.is_empty()
            || self
                .config
                .allowed_senders
                .iter()
                .any(|s| s.eq_ignore_ascii_case(sender))
    }

    fn normalize(&self, msg: &ChatMessage) -> NormalizedInput {
        let mut meta = InputMeta::for_channel(msg.chat_id.clone());
        meta.sender = msg.sender.clone();
        NormalizedInput::new(self.platform.source(), meta, msg.text.clone())
            .with_correlation(uuid_like(&msg.chat_id), self.platform.name())
    }
}

/// Chat replies are routed by chat id; the correlation id just needs to
/// be unique per inbound message.
fn uuid_like(chat_id: &str) -> String {
    format!("{}:{}", chat_id, uuid::Uuid::new_v4())
}

#[async_trait]
impl ChannelAdapter for ChatAdapter {
    fn name(&self) -> &str {
        self.platform.name()
    }

    async fn start(
        &self,
        cancel: CancellationToken,
        out: mpsc::Sender<NormalizedInput>,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.poll_secs.max(1)));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
            let updates = self.client.fetch_updates().await?;
            for msg in updates {
                if !self.is_allowed(&msg.sender) {
                    warn!(
                        platform = self.platform.name(),
                        sender = %msg.sender,
                        "message from disallowed sender ignored"
                    );
                    continue;
                }
                if msg.text.trim().is_empty() {
                    continue;
                }
                debug!(platform = self.platform.name(), chat = %msg.chat_id, "chat message accepted");
                out.send(self.normalize(&msg))
                    .await
                    .map_err(|_| ChannelError::QueueClosed)?;
            }
        }
    }

    async fn send(&self, target: &str, message: &str) -> Result<()> {
        // Targets are "chat_id:correlation"; everything before the first
        // colon routes the reply.
        let chat_id = target.split(':').next().unwrap_or(target);
        self.client.send_message(chat_id, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct FakeClient {
        updates: Mutex<Vec<Vec<ChatMessage>>>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeClient {
        fn with_batches(batches: Vec<Vec<ChatMessage>>) -> Arc<Self> {
            Arc::new(Self {
                updates: Mutex::new(batches),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatClient for FakeClient {
        async fn fetch_updates(&self) -> Result<Vec<ChatMessage>> {
            let mut updates = self.updates.lock();
            if updates.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(updates.remove(0))
            }
        }

        async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
            self.sent.lock().push((chat_id.into(), text.into()));
            Ok(())
        }
    }

    fn msg(sender: &str, text: &str) -> ChatMessage {
        ChatMessage {
            sender: sender.into(),
            chat_id: "room-1".into(),
            text: text.into(),
        }
    }

    async fn run_one_batch(adapter: ChatAdapter) -> Vec<NormalizedInput> {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { adapter.start(run_cancel, tx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let _ = handle.await;

        let mut collected = Vec::new();
        while let Ok(input) = rx.try_recv() {
            collected.push(input);
        }
        collected
    }

    #[tokio::test]
    async fn messages_become_normalized_inputs() {
        let client = FakeClient::with_batches(vec![vec![msg("alice", "summarize chat")]]);
        let adapter = ChatAdapter::new(ChatPlatform::A, client, ChatAdapterConfig::default());

        let inputs = run_one_batch(adapter).await;
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].source, InputSource::ChatA);
        assert_eq!(inputs[0].meta.sender, "alice");
        assert_eq!(inputs[0].meta.channel, "room-1");
        assert_eq!(inputs[0].reply_to.as_deref(), Some("chat-a"));
        assert!(inputs[0].correlation_id.as_deref().unwrap().starts_with("room-1:"));
    }

    #[tokio::test]
    async fn allow_list_filters_senders() {
        let client = FakeClient::with_batches(vec![vec![
            msg("alice", "allowed task"),
            msg("mallory", "blocked task"),
        ]]);
        let adapter = ChatAdapter::new(
            ChatPlatform::B,
            client,
            ChatAdapterConfig {
                allowed_senders: vec!["Alice".into()],
                ..Default::default()
            },
        );

        let inputs = run_one_batch(adapter).await;
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].payload, "allowed task");
        assert_eq!(inputs[0].source, InputSource::ChatB);
    }

    #[tokio::test]
    async fn blank_messages_are_dropped() {
        let client = FakeClient::with_batches(vec![vec![msg("alice", "   ")]]);
        let adapter = ChatAdapter::new(ChatPlatform::C, client, ChatAdapterConfig::default());
        assert!(run_one_batch(adapter).await.is_empty());
    }

    #[tokio::test]
    async fn send_routes_by_chat_id_prefix() {
        let client = FakeClient::with_batches(vec![]);
        let adapter =
            ChatAdapter::new(ChatPlatform::A, client.clone(), ChatAdapterConfig::default());

        adapter.send("room-9:abc-def", "the answer").await.unwrap();
        let sent = client.sent.lock();
        assert_eq!(sent.as_slice(), &[("room-9".to_string(), "the answer".to_string())]);
    }

    #[test]
    fn platform_names() {
        assert_eq!(ChatPlatform::A.name(), "chat-a");
        assert_eq!(ChatPlatform::B.name(), "chat-b");
        assert_eq!(ChatPlatform::C.name(), "chat-c");
    }
}
