//! The CLI stream adapter.
//!
//! Reads stdin line by line: whitespace is trimmed, empty lines are
//! skipped, and `/quit` or `/exit` ends the stream cleanly. Everything
//! else becomes a normalized input with source `text` on channel `cli`.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use overhuman_types::input::NormalizedInput;

use crate::traits::{ChannelAdapter, ChannelError, Result};

/// Channel name used for CLI-originated inputs.
pub const CLI_CHANNEL: &str = "cli";

/// Line-oriented stdin adapter.
pub struct StdinAdapter;

impl StdinAdapter {
    /// Create the adapter.
    pub fn new() -> Self {
        Self
    }

    /// Drive the line loop over any reader (tests feed a cursor; the
    /// daemon feeds real stdin).
    pub async fn run_lines<R>(
        reader: R,
        cancel: CancellationToken,
        out: mpsc::Sender<NormalizedInput>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                // EOF ends the stream cleanly.
                return Ok(());
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with("/quit") || line.starts_with("/exit") {
                info!("cli stream terminated by command");
                return Ok(());
            }
            debug!(len = line.len(), "cli line accepted");
            out.send(NormalizedInput::text(line, CLI_CHANNEL))
                .await
                .map_err(|_| ChannelError::QueueClosed)?;
        }
    }
}

impl Default for StdinAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for StdinAdapter {
    fn name(&self) -> &str {
        "stdin"
    }

    async fn start(
        &self,
        cancel: CancellationToken,
        out: mpsc::Sender<NormalizedInput>,
    ) -> Result<()> {
        Self::run_lines(tokio::io::stdin(), cancel, out).await
    }

    async fn send(&self, _target: &str, message: &str) -> Result<()> {
        // Replies to the CLI stream go to stdout.
        println!("{message}");
        Ok(())
    }
}
