//! Channel adapter trait definitions and the adapter registry.
//!
//! Every input surface (stdin, file poller, chat platforms, mail)
//! implements [`ChannelAdapter`]; the daemon holds them in an
//! [`AdapterRegistry`], fans out `start_all`, and joins `stop_all`.
//! Adapters share nothing but the normalized input type.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use overhuman_types::input::NormalizedInput;

use crate::backoff::Backoff;

/// Channel-specific error type.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ChannelError {
    /// Failed to establish a connection to the channel backend.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication / authorization was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Sending a message failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receiving a message failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The daemon queue is gone; the adapter must shut down.
    #[error("input queue closed")]
    QueueClosed,

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that do not fit other variants.
    #[error("{0}")]
    Other(String),
}

/// A convenience alias for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// The capability set every input adapter implements.
///
/// The daemon manages the lifecycle: [`start`](ChannelAdapter::start) is
/// long-lived and runs until the token is cancelled or the source is
/// exhausted; [`send`](ChannelAdapter::send) delivers a reply to a target
/// within the channel; [`stop`](ChannelAdapter::stop) releases resources.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Unique adapter name (e.g. `"stdin"`, `"file"`, `"chat-a"`).
    fn name(&self) -> &str;

    /// Run the intake loop, pushing normalized inputs into `out`.
    ///
    /// Returning `Ok` means the source ended cleanly (EOF, `/quit`); the
    /// registry will not restart it. Returning `Err` marks a transient
    /// failure and the registry restarts the adapter after a backoff.
    async fn start(
        &self,
        cancel: CancellationToken,
        out: mpsc::Sender<NormalizedInput>,
    ) -> Result<()>;

    /// Deliver a reply to `target` within this channel.
    async fn send(&self, target: &str, message: &str) -> Result<()>;

    /// Release resources. Called once after the intake loop ends.
    async fn stop(&self) {}
}

/// Holds the adapter set and fans lifecycle operations out.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn ChannelAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter.
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        info!(adapter = adapter.name(), "adapter registered");
        self.adapters.push(adapter);
    }

    /// Adapter names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    /// Look up an adapter by name (for reply routing).
    pub fn get(&self, name: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.iter().find(|a| a.name() == name).cloned()
    }

    /// Spawn one task per adapter.
    ///
    /// Each task wraps the adapter's intake loop in a restart-with-backoff
    /// loop (1 s doubling, capped at 30 s); transient errors never reach
    /// the queue. Tasks end when the token is cancelled or the adapter
    /// returns cleanly.
    pub fn start_all(
        &self,
        cancel: &CancellationToken,
        out: &mpsc::Sender<NormalizedInput>,
    ) -> Vec<JoinHandle<()>> {
        self.adapters
            .iter()
            .map(|adapter| {
                let adapter = Arc::clone(adapter);
                let cancel = cancel.clone();
                let out = out.clone();
                tokio::spawn(async move {
                    let mut backoff = Backoff::default();
                    loop {
                        match adapter.start(cancel.clone(), out.clone()).await {
                            Ok(()) => {
                                info!(adapter = adapter.name(), "adapter finished");
                                break;
                            }
                            Err(ChannelError::QueueClosed) => {
                                warn!(adapter = adapter.name(), "queue closed; adapter stopping");
                                break;
                            }
                            Err(e) => {
                                let delay = backoff.next_delay();
                                warn!(
                                    adapter = adapter.name(),
                                    error = %e,
                                    retry_in_secs = delay.as_secs(),
                                    "adapter error; restarting"
                                );
                                tokio::select! {
                                    _ = cancel.cancelled() => break,
                                    _ = tokio::time::sleep(delay) => {}
                                }
                            }
                        }
                        if cancel.is_cancelled() {
                            break;
                        }
                        backoff.reset_if_settled();
                    }
                    adapter.stop().await;
                })
            })
            .collect()
    }

    /// Cancel and join every adapter task within the grace window.
    pub async fn stop_all(handles: Vec<JoinHandle<()>>, grace: Duration) {
        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(grace, join_all).await.is_err() {
            warn!("adapter shutdown exceeded grace window");
        }
    }
}
