//! # JSON-RPC + WebSocket API
//!
//! The axum router that puts a [`PaymentBuildService`] on the network.
//!
//! ## Endpoints
//!
//! | Method | Path      | Description                          |
//! |--------|-----------|--------------------------------------|
//! | GET    | `/health` | Liveness probe                       |
//! | GET    | `/status` | Daemon status summary                |
//! | POST   | `/rpc`    | JSON-RPC 2.0 gateway                 |
//! | GET    | `/ws`     | WebSocket stream of review updates   |
//!
//! ## RPC methods
//!
//! | Method                     | Params                    | Result                   |
//! |----------------------------|---------------------------|--------------------------|
//! | `wallet_startBuildPayment` | none                      | `{ bid }`                |
//! | `wallet_stopBuildPayment`  | `{ bid }`                 | `null`                   |
//! | `wallet_buildPayment`      | `BuildPaymentArgs`        | `BuildPaymentResult`     |
//! | `wallet_buildRequest`      | `BuildRequestArgs`        | `BuildRequestResult`     |
//! | `wallet_reviewPayment`     | `{ bid, session_id }`     | `null` once acknowledged |
//! | `wallet_ackPaymentReview`  | `{ bid, seqno }`          | `{ acked }`              |
//! | `wallet_sendPayment`       | `SendPaymentArgs`         | `{ bid, payment }`       |
//!
//! Every method that takes a `session_id` requires it. Sub-session ids
//! order calls on a build: a call with a lower id than the latest one is
//! answered with a cancellation (-32004).
//!
//! Each `/rpc` call runs under its own cancellation token, cancelled when
//! the connection drops the request. A closed frontend therefore cancels
//! its in-flight build or review.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use nova_wallet::{
    BuildError, BuildPaymentArgs, BuildPaymentId, BuildRequestArgs, PaymentBuildService,
    SendPaymentArgs, SessionId,
};

use crate::metrics::SharedMetrics;
use crate::notifier::WsReviewNotifier;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Reported version string.
    pub version: String,
    /// Name of the loaded fixture, or "empty".
    pub fixture: String,
    /// When the daemon started.
    pub started_at: DateTime<Utc>,
    /// The payment build engine.
    pub service: Arc<PaymentBuildService>,
    /// Review update fan-out; the same notifier the service reports to.
    pub notifier: Arc<WsReviewNotifier>,
    /// Prometheus handles.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the API router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    /// Named parameters.
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Unknown or stopped build, or its lock could not be taken.
pub const SESSION_ERROR: i32 = -32001;
/// Review or send out of order.
pub const NOT_READY_ERROR: i32 = -32002;
/// Send differs from the reviewed payment.
pub const MISMATCH_ERROR: i32 = -32003;
/// Preempted by a newer call, or the caller went away.
pub const CANCELLED_ERROR: i32 = -32004;
pub const INVALID_PARAMS: i32 = -32602;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_REQUEST: i32 = -32600;
pub const INTERNAL_ERROR: i32 = -32603;

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<BuildError> for JsonRpcError {
    fn from(e: BuildError) -> Self {
        let code = match &e {
            BuildError::InvalidParameters(_)
            | BuildError::MissingPaymentId
            | BuildError::UnsupportedAsset(_) => INVALID_PARAMS,
            BuildError::SessionNotFound(_) | BuildError::LockTimeout(_) => SESSION_ERROR,
            BuildError::NotReadyForReview
            | BuildError::MissingFrozenValues
            | BuildError::NotReadyToSend { .. } => NOT_READY_ERROR,
            BuildError::MismatchedField(_) => MISMATCH_ERROR,
            BuildError::Cancelled => CANCELLED_ERROR,
        };
        let data = match &e {
            BuildError::MismatchedField(field) => Some(json!({ "field": field.to_string() })),
            _ => None,
        };
        Self {
            code,
            message: e.to_string(),
            data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BidParams {
    bid: BuildPaymentId,
}

#[derive(Debug, Deserialize)]
struct ReviewParams {
    bid: BuildPaymentId,
    session_id: SessionId,
}

#[derive(Debug, Deserialize)]
struct AckParams {
    bid: BuildPaymentId,
    seqno: u32,
}

fn params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {}", e)))
}

/// Build arguments default every missing field, but a defaulted
/// `session_id` of 0 loses the slot to any earlier call with a higher id.
fn require_session_id(params: &Option<Value>) -> Result<(), JsonRpcError> {
    match params.as_ref().and_then(|p| p.get("session_id")) {
        Some(_) => Ok(()),
        None => Err(JsonRpcError::new(
            INVALID_PARAMS,
            "Invalid params: missing field `session_id`",
        )),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, format!("Internal error: {}", e)))
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub fixture: String,
    /// Live payment builds.
    pub active_builds: usize,
    /// Review updates waiting for a frontend acknowledgement.
    pub pending_acks: usize,
    pub uptime_secs: i64,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    Json(StatusResponse {
        version: state.version.clone(),
        fixture: state.fixture.clone(),
        active_builds: state.service.active_builds(),
        pending_acks: state.notifier.pending_acks(),
        uptime_secs: (now - state.started_at).num_seconds(),
        timestamp: now.to_rfc3339(),
    })
}

/// `POST /rpc`, the JSON-RPC 2.0 gateway.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError::new(
                INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            )),
            id: req.id,
        });
    }

    // Cancelled when this handler's future is dropped.
    let token = CancellationToken::new();
    let _guard = token.clone().drop_guard();

    let (result, error) = match dispatch(&state, &req.method, req.params, &token).await {
        Ok(result) => (Some(result), None),
        Err(error) => {
            tracing::debug!(method = %req.method, code = error.code, message = %error.message, "rpc call rejected");
            (None, Some(error))
        }
    };
    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

async fn dispatch(
    state: &AppState,
    method: &str,
    raw: Option<Value>,
    token: &CancellationToken,
) -> Result<Value, JsonRpcError> {
    let service = &state.service;
    let metrics = &state.metrics;

    let result = match method {
        "wallet_startBuildPayment" => {
            let bid = service.start_build_payment();
            metrics.active_builds.set(service.active_builds() as i64);
            Ok(json!({ "bid": bid }))
        }
        "wallet_stopBuildPayment" => {
            let p: BidParams = params(raw)?;
            service.stop_build_payment(p.bid);
            metrics.active_builds.set(service.active_builds() as i64);
            Ok(Value::Null)
        }
        "wallet_buildPayment" => {
            require_session_id(&raw)?;
            let args: BuildPaymentArgs = params(raw)?;
            metrics.builds_total.inc();
            let _timer = metrics.build_latency_seconds.start_timer();
            match service.build_payment(&args, token).await {
                Ok(res) => {
                    if res.ready_to_review {
                        metrics.builds_ready_total.inc();
                    }
                    to_value(&res)
                }
                Err(e) => Err(e.into()),
            }
        }
        "wallet_buildRequest" => {
            require_session_id(&raw)?;
            let args: BuildRequestArgs = params(raw)?;
            metrics.builds_total.inc();
            match service.build_request(&args, token).await {
                Ok(res) => to_value(&res),
                Err(e) => Err(e.into()),
            }
        }
        "wallet_reviewPayment" => {
            let p: ReviewParams = params(raw)?;
            match service.review_payment(p.bid, p.session_id, token).await {
                Ok(()) => {
                    metrics.reviews_total.inc();
                    Ok(Value::Null)
                }
                Err(e) => Err(e.into()),
            }
        }
        "wallet_ackPaymentReview" => {
            let p: AckParams = params(raw)?;
            let acked = state.notifier.ack(p.bid, p.seqno);
            tracing::debug!(bid = %p.bid, seqno = p.seqno, acked, "payment review acknowledged");
            Ok(json!({ "acked": acked }))
        }
        "wallet_sendPayment" => {
            let args: SendPaymentArgs = params(raw)?;
            match service.send_payment(&args, token).await {
                Ok(approved) => {
                    metrics.sends_total.inc();
                    Ok(json!({ "bid": approved.bid, "payment": &*approved.payment }))
                }
                Err(e) => Err(e.into()),
            }
        }
        _ => {
            return Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            ))
        }
    };

    if result.is_err() {
        metrics.rejections_total.inc();
    }
    result
}

/// `GET /ws` streams [`PaymentReviewed`](nova_wallet::PaymentReviewed)
/// updates as JSON text frames. Client frames are ignored; acknowledgements
/// go through `wallet_ackPaymentReview`.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.notifier.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(update) => {
                        let payload = match serde_json::to_string(&update) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize review update");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "review subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
