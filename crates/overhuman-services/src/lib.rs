//! # overhuman-services
//!
//! Daemon-side services: the HTTP ingestion API, the webhook receiver,
//! the heartbeat ticker, and sync-response delivery.
//!
//! - **[`api`]** -- `GET /health`, `POST /input`, `POST /input/sync`
//! - **[`webhook`]** -- configured-path receiver with header mapping
//! - **[`heartbeat`]** -- interval ticker injecting heartbeat inputs
//! - **[`respond`]** -- correlation-id keyed [`ResponseRegistry`]

pub mod api;
pub mod error;
pub mod heartbeat;
pub mod respond;
pub mod webhook;

pub use api::{ApiState, SYNC_REPLY_CHANNEL};
pub use error::{Result, ServiceError};
pub use heartbeat::HeartbeatService;
pub use respond::{ResponseRegistry, RunOutcome};
pub use webhook::WebhookState;
