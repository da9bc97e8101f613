//! Mail adapter contract surface (IMAP in, SMTP out).
//!
//! The protocol conversations are fixed command sequences:
//!
//! - IMAP: `LOGIN` -> `SELECT` -> `SEARCH UNSEEN` -> `FETCH` (headers +
//!   text + size) -> `STORE +FLAGS (\Seen)`
//! - SMTP: `EHLO` -> `STARTTLS` when offered -> `AUTH PLAIN` when
//!   credentials exist -> `MAIL FROM` -> `RCPT TO` -> `DATA` -> `QUIT`
//!
//! The socket-level client lives behind [`MailTransport`]; this module
//! owns the sequences, the allow-list, body truncation, and the poll
//! loop that turns unseen mail into normalized inputs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use overhuman_types::input::{InputMeta, InputSource, NormalizedInput};

use crate::traits::{ChannelAdapter, ChannelError, Result};

/// Mail adapter settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// IMAP server host.
    pub imap_host: String,
    /// IMAP port (usually 993).
    pub imap_port: u16,
    /// SMTP server host.
    pub smtp_host: String,
    /// SMTP port (usually 587).
    pub smtp_port: u16,
    /// Account user name (also the From address).
    pub username: String,
    /// Account password.
    pub password: String,
    /// Mailbox to poll.
    pub mailbox: String,
    /// Poll interval in seconds.
    pub poll_secs: u64,
    /// Senders allowed to create tasks; empty allows everyone.
    pub allowed_senders: Vec<String>,
    /// Body truncation bound in characters.
    pub max_body_chars: usize,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            imap_host: String::new(),
            imap_port: 993,
            smtp_host: String::new(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            mailbox: "INBOX".into(),
            poll_secs: 60,
            allowed_senders: Vec::new(),
            max_body_chars: 8_000,
        }
    }
}

/// One fetched email, already decoded by the transport.
#[derive(Debug, Clone)]
pub struct ParsedEmail {
    /// IMAP sequence number (used for the `STORE` command).
    pub seq: u32,
    /// From address.
    pub from: String,
    /// Subject line.
    pub subject: String,
    /// Decoded text body.
    pub body: String,
    /// Message size in bytes as reported by `FETCH`.
    pub size: u64,
}

/// The socket seam a concrete mail client implements.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Run the IMAP fetch conversation and return unseen messages.
    async fn fetch_unseen(&self) -> Result<Vec<ParsedEmail>>;

    /// Mark a message seen (`STORE seq +FLAGS (\Seen)`).
    async fn mark_seen(&self, seq: u32) -> Result<()>;

    /// Run the SMTP conversation to deliver one reply.
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// The IMAP command sequence for one fetch pass, in order.
///
/// `{n}` placeholders carry the sequence numbers found by `SEARCH`.
pub fn imap_fetch_sequence(config: &MailConfig) -> Vec<String> {
    vec![
        format!("a1 LOGIN {} {}", config.username, "****"),
        format!("a2 SELECT {}", config.mailbox),
        "a3 SEARCH UNSEEN".to_string(),
        "a4 FETCH {n} (BODY[HEADER.FIELDS (FROM SUBJECT)] BODY[TEXT] RFC822.SIZE)".to_string(),
        "a5 STORE {n} +FLAGS (\\Seen)".to_string(),
    ]
}

/// The SMTP command sequence for one delivery, in order.
///
/// `STARTTLS` appears only for the submission port and `AUTH PLAIN` only
/// when credentials are configured.
pub fn smtp_send_sequence(config: &MailConfig, to: &str) -> Vec<String> {
    let mut sequence = vec![format!("EHLO {}", config.smtp_host)];
    if config.smtp_port == 587 {
        sequence.push("STARTTLS".to_string());
    }
    if !config.username.is_empty() && !config.password.is_empty() {
        sequence.push("AUTH PLAIN".to_string());
    }
    sequence.push(format!("MAIL FROM:<{}>", config.username));
    sequence.push(format!("RCPT TO:<{to}>"));
    sequence.push("DATA".to_string());
    sequence.push("QUIT".to_string());
    sequence
}

/// Mail channel adapter over a [`MailTransport`].
pub struct MailAdapter {
    config: MailConfig,
    transport: Arc<dyn MailTransport>,
}

impl MailAdapter {
    /// Create the adapter.
    pub fn new(config: MailConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self { config, transport }
    }

    /// Allow-list check, case-insensitive; empty list allows everyone.
    pub fn is_sender_allowed(&self, sender: &str) -> bool {
        self.config.allowed_senders.is_empty()
            || self
                .config
                .allowed_senders
                .iter()
                .any(|s| s.eq_ignore_ascii_case(sender))
    }

    fn normalize(&self, email: &ParsedEmail) -> NormalizedInput {
        let body: String = if email.body.chars().count() > self.config.max_body_chars {
            let truncated: String = email.body.chars().take(self.config.max_body_chars).collect();
            format!("{truncated}\n\n[truncated]")
        } else {
            email.body.clone()
        };
        let mut meta = InputMeta::for_channel("mail");
        meta.sender = email.from.clone();
        meta.extra.insert("subject".into(), email.subject.clone());
        meta.extra.insert("size".into(), email.size.to_string());
        NormalizedInput::new(
            InputSource::Mail,
            meta,
            format!("Subject: {}\n\n{}", email.subject, body),
        )
        .with_correlation(format!("mail:{}", email.seq), "mail")
        .with_sender(email.from.clone())
    }
}

#[async_trait]
impl ChannelAdapter for MailAdapter {
    fn name(&self) -> &str {
        "mail"
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
            let emails = self.transport.fetch_unseen().await?;
            for email in emails {
                // Seen-marking happens regardless of the allow-list so a
                // blocked sender cannot wedge the unseen set.
                self.transport.mark_seen(email.seq).await?;
                if !self.is_sender_allowed(&email.from) {
                    warn!(sender = %email.from, "email from disallowed sender ignored");
                    continue;
                }
                debug!(seq = email.seq, from = %email.from, "email accepted");
                out.send(self.normalize(&email))
                    .await
                    .map_err(|_| ChannelError::QueueClosed)?;
            }
        }
    }

    async fn send(&self, target: &str, message: &str) -> Result<()> {
        // Replies go back to the sender address the target encodes.
        let to = target.strip_prefix("mail:").unwrap_or(target);
        self.transport
            .send_mail(to, "Re: your request", message)
            .await
    }
}
