//! The HTTP ingestion API.
//!
//! | Method & path      | Outcome                                        |
//! |--------------------|------------------------------------------------|
//! | `GET /health`      | `{status, uptime}` 200, always cheap           |
//! | `POST /input`      | 202 accepted, 400 bad body, 503 queue full     |
//! | `POST /input/sync` | 200 with result, 504 after 60 s, 503 when full |
//!
//! Sync callers are parked in the [`ResponseRegistry`] keyed by the
//! input id; the daemon delivers the final result string after the
//! pipeline's last stage.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use overhuman_types::input::{NormalizedInput, Priority};

use crate::error::{Result, ServiceError};
use crate::respond::ResponseRegistry;

/// Reply-channel tag carried by sync HTTP inputs.
pub const SYNC_REPLY_CHANNEL: &str = "http-sync";

/// How long a sync caller waits before 504.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    /// The daemon's bounded input queue.
    pub queue: mpsc::Sender<NormalizedInput>,
    /// Waiting sync callers.
    pub responses: Arc<ResponseRegistry>,
    /// Sync wait bound; [`SYNC_TIMEOUT`] in production, shorter in tests.
    pub sync_timeout: Duration,
}

impl ApiState {
    /// Production state over a queue and registry.
    pub fn new(queue: mpsc::Sender<NormalizedInput>, responses: Arc<ResponseRegistry>) -> Self {
        Self {
            queue,
            responses,
            sync_timeout: SYNC_TIMEOUT,
        }
    }
}

/// Request body for both ingestion endpoints.
#[derive(Debug, Deserialize)]
pub struct InputRequest {
    /// The task text. Required and non-empty.
    pub payload: String,
    /// Priority label; upper- and lowercase accepted.
    #[serde(default)]
    pub priority: Option<String>,
    /// Sender identifier.
    #[serde(default)]
    pub sender: Option<String>,
    /// Free-form string metadata.
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct AcceptedBody {
    input_id: String,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct CompletedBody {
    input_id: String,
    status: &'static str,
    result: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Build the API router.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/input", post(ingest_async))
        .route("/input/sync", post(ingest_sync))
        .with_state(state)
}

/// Serve the API until the token is cancelled.
pub async fn serve(addr: &str, state: ApiState, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(ServiceError::Bind)?;
    info!(addr = %listener.local_addr().map_err(ServiceError::Bind)?, "api listening");
    axum::serve(listener, api_routes(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(ServiceError::Serve)?;
    Ok(())
}

/// Server start time, set once at process start.
static START_TIME: OnceLock<Instant> = OnceLock::new();

async fn health() -> Json<serde_json::Value> {
    let start = START_TIME.get_or_init(Instant::now);
    Json(serde_json::json!({
        "status": "ok",
        "uptime": format!("{}s", start.elapsed().as_secs()),
    }))
}

/// Validate a body and build the normalized input.
fn build_input(
    body: std::result::Result<Json<InputRequest>, JsonRejection>,
) -> std::result::Result<NormalizedInput, Response> {
    let Json(request) = body.map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, format!("invalid body: {e}"))
    })?;
    if request.payload.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "payload is required"));
    }

    let mut input = NormalizedInput::new(
        overhuman_types::input::InputSource::Api,
        overhuman_types::input::InputMeta::for_channel("api"),
        request.payload,
    );
    if let Some(raw) = request.priority.as_deref() {
        match Priority::parse(raw) {
            Some(priority) => input.priority = priority,
            None => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("unknown priority: {raw}"),
                ));
            }
        }
    }
    if let Some(sender) = request.sender {
        input.meta.sender = sender;
    }
    if let Some(metadata) = request.metadata {
        input.meta.extra = metadata;
    }
    Ok(input)
}

fn enqueue(state: &ApiState, input: NormalizedInput) -> std::result::Result<String, Response> {
    let input_id = input.id.clone();
    match state.queue.try_send(input) {
        Ok(()) => Ok(input_id),
        Err(TrySendError::Full(_)) => {
            warn!("input rejected: queue full");
            Err(error_response(StatusCode::SERVICE_UNAVAILABLE, "queue full"))
        }
        Err(TrySendError::Closed(_)) => {
            warn!("input rejected: daemon shutting down");
            Err(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "daemon shutting down",
            ))
        }
    }
}

/// `POST /input` -- fire and forget.
async fn ingest_async(
    State(state): State<ApiState>,
    body: std::result::Result<Json<InputRequest>, JsonRejection>,
) -> Response {
    let input = match build_input(body) {
        Ok(input) => input,
        Err(response) => return response,
    };
    match enqueue(&state, input) {
        Ok(input_id) => {
            debug!(input_id = %input_id, "async input accepted");
            (
                StatusCode::ACCEPTED,
                Json(AcceptedBody {
                    input_id,
                    status: "accepted",
                }),
            )
                .into_response()
        }
        Err(response) => response,
    }
}

/// `POST /input/sync` -- block until the pipeline completes.
async fn ingest_sync(
    State(state): State<ApiState>,
    body: std::result::Result<Json<InputRequest>, JsonRejection>,
) -> Response {
    let mut input = match build_input(body) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let input_id = input.id.clone();
    input = input.with_correlation(input_id.clone(), SYNC_REPLY_CHANNEL);

    // Register before enqueueing so a fast pipeline cannot win the race.
    let receiver = state.responses.register(input_id.clone());
    if let Err(response) = enqueue(&state, input) {
        state.responses.remove(&input_id);
        return response;
    }

    match tokio::time::timeout(state.sync_timeout, receiver).await {
        Ok(Ok(Ok(result))) => (
            StatusCode::OK,
            Json(CompletedBody {
                input_id,
                status: "completed",
                result,
            }),
        )
            .into_response(),
        // User-visible run failures map to 4xx/504, never 5xx.
        Ok(Ok(Err(reason))) => {
            let status = if reason.contains("timeout") || reason.contains("deadline") {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::BAD_REQUEST
            };
            error_response(status, reason)
        }
        Ok(Err(_)) => {
            state.responses.remove(&input_id);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "response channel dropped")
        }
        Err(_) => {
            state.responses.remove(&input_id);
            warn!(input_id = %input_id, "sync caller timed out");
            error_response(StatusCode::GATEWAY_TIMEOUT, "timed out waiting for result")
        }
    }
}
