//! # overhuman-channels
//!
//! Input channel adapters. Each adapter turns one signal surface into
//! [`NormalizedInput`](overhuman_types::input::NormalizedInput) values
//! pushed onto the daemon queue; nothing downstream knows which surface a
//! task came from.
//!
//! - **[`traits`]** -- the [`ChannelAdapter`] capability set and registry
//! - **[`stdin`]** -- line-oriented CLI stream
//! - **[`file_watch`]** -- polling directory watcher
//! - **[`chat`]** -- chat platform contract surface (slots a/b/c)
//! - **[`mail`]** -- IMAP/SMTP contract surface
//! - **[`backoff`]** -- bounded restart backoff shared by the registry
//!
//! The HTTP ingestion API and webhook receiver live in
//! `overhuman-services`; they are server surfaces, not pollers.

pub mod backoff;
pub mod chat;
pub mod file_watch;
pub mod mail;
pub mod stdin;
pub mod traits;

pub use chat::{ChatAdapter, ChatClient, ChatPlatform};
pub use file_watch::FileWatchAdapter;
pub use mail::{MailAdapter, MailConfig, MailTransport};
pub use stdin::StdinAdapter;
pub use traits::{AdapterRegistry, ChannelAdapter, ChannelError};
