//! The webhook receiver.
//!
//! `POST {configured-path}` with a body of at most 1 MB. Optional
//! `X-Webhook-Source` and `X-Priority` headers map onto the normalized
//! input's sender and priority. Always fire-and-forget: 202 on accept,
//! 503 when the queue is full.

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Json;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use overhuman_types::input::{NormalizedInput, Priority};

/// Maximum accepted webhook body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Default receive path.
pub const DEFAULT_PATH: &str = "/webhook";

/// State for the webhook router.
#[derive(Clone)]
pub struct WebhookState {
    /// The daemon's bounded input queue.
    pub queue: mpsc::Sender<NormalizedInput>,
    /// Public URL or path recorded into input metadata.
    pub source_url: String,
}

/// Build a router serving the receiver at `path`.
pub fn webhook_routes(path: &str, state: WebhookState) -> Router {
    Router::new()
        .route(path, post(receive))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn receive(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> Response {
    if body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "empty body"})),
        )
            .into_response();
    }
    let payload = match std::str::from_utf8(&body) {
        Ok(text) => text.to_string(),
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "body is not utf-8"})),
            )
                .into_response();
        }
    };

    let mut input = NormalizedInput::webhook(payload, state.source_url.clone());
    if let Some(source) = header_str(&headers, "x-webhook-source") {
        input.meta.sender = source.to_string();
    }
    if let Some(raw) = header_str(&headers, "x-priority")
        && let Some(priority) = Priority::parse(raw)
    {
        input.priority = priority;
    }

    let input_id = input.id.clone();
    match state.queue.try_send(input) {
        Ok(()) => {
            debug!(input_id = %input_id, "webhook accepted");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({"input_id": input_id, "status": "accepted"})),
            )
                .into_response()
        }
        Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
            warn!("webhook rejected: queue unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": "queue full"})),
            )
                .into_response()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}
