//! HTTP surface of the bridge (port 3050 by default).
//!
//! User-facing endpoints:
//! - GET  /health                    - health check
//! - GET  /deposits/native/wallet    - hot-wallet deposit address
//! - GET  /deposits/native/:addr     - ledger balance
//! - POST /withdrawals/native        - queue a withdrawal (201)
//! - GET  /withdrawals/pending       - reserved pending-withdrawal amount
//! - POST /claim                     - bind native address to an EVM address
//! - POST /swap                      - queue a native→wrapped swap (201)
//! - GET  /history/:evm/:native      - deposits, withdrawals, swaps
//! - GET  /events/:native            - per-user job outcomes (SSE)
//! - GET  /metrics                   - Prometheus metrics

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use eyre::Result;
use futures_util::Stream;
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use pawchain_rs::types::{format_paw, NativeAddress};

use crate::error::BridgeError;
use crate::notify::{BridgeEvent, NotificationBus};
use crate::queue::JobQueue;
use crate::service::{BridgeService, ClaimOutcome};
use crate::store::LedgerStore;
use crate::types::{SwapToWrappedJob, WithdrawalJob};

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BridgeService>,
    pub store: Arc<dyn LedgerStore>,
    pub queue: Arc<dyn JobQueue>,
    pub notify: Arc<NotificationBus>,
    pub hot_wallet: NativeAddress,
}

#[derive(Deserialize)]
struct WithdrawalRequest {
    paw: String,
    amount: serde_json::Value,
    blockchain: String,
    sig: String,
}

#[derive(Deserialize)]
struct ClaimRequest {
    #[serde(rename = "pawAddress")]
    paw_address: String,
    #[serde(rename = "blockchainAddress")]
    blockchain_address: String,
    sig: String,
}

#[derive(Deserialize)]
struct SwapRequest {
    paw: String,
    amount: serde_json::Value,
    blockchain: String,
    sig: String,
}

/// Start the API server using axum.
pub async fn start_api_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(10)
        .burst_size(30)
        .finish()
        .ok_or_else(|| eyre::eyre!("Invalid rate limit config"))?;

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/deposits/native/wallet", get(wallet_handler))
        .route("/deposits/native/:addr", get(balance_handler))
        .route("/withdrawals/native", post(withdrawal_handler))
        .route("/withdrawals/pending", get(pending_handler))
        .route("/claim", post(claim_handler))
        .route("/swap", post(swap_handler))
        .route("/history/:evm/:native", get(history_handler))
        .route("/events/:native", get(events_handler))
        .with_state(state)
        .layer(GovernorLayer {
            config: std::sync::Arc::new(governor_conf),
        });

    tracing::info!(%addr, "API server started");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Use into_make_service_with_connect_info so Governor can extract peer IP
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}

async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// The deposit address users send PAW to.
async fn wallet_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "address": state.hot_wallet.as_str() }))
}

async fn balance_handler(
    State(state): State<AppState>,
    Path(addr): Path<String>,
) -> Response {
    let Ok(native) = NativeAddress::parse(&addr) else {
        return error_response(StatusCode::BAD_REQUEST, "bad paw address");
    };
    match state.store.balance(&native).await {
        Ok(balance) => Json(json!({ "balance": format_paw(balance) })).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn withdrawal_handler(
    State(state): State<AppState>,
    Json(request): Json<WithdrawalRequest>,
) -> Response {
    let Some(amount) = amount_string(&request.amount) else {
        return error_response(StatusCode::BAD_REQUEST, "bad amount");
    };
    if NativeAddress::parse(&request.paw).is_err() {
        return error_response(StatusCode::BAD_REQUEST, "bad paw address");
    }

    let job = WithdrawalJob {
        native: request.paw,
        amount,
        evm: request.blockchain,
        signature: Some(request.sig),
        ts_ms: chrono::Utc::now().timestamp_millis(),
        attempt: 0,
    };
    match state.queue.enqueue_withdrawal(&job).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "status": "OK" }))).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn pending_handler(State(state): State<AppState>) -> Response {
    match state.queue.pending_withdrawals_amount().await {
        Ok(amount) => Json(json!({ "amount": format_paw(amount) })).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn claim_handler(
    State(state): State<AppState>,
    Json(request): Json<ClaimRequest>,
) -> Response {
    let Ok(native) = NativeAddress::parse(&request.paw_address) else {
        return error_response(StatusCode::BAD_REQUEST, "bad paw address");
    };

    match state
        .service
        .claim(&native, &request.blockchain_address, &request.sig)
        .await
    {
        Ok(ClaimOutcome::Ok) => {
            (StatusCode::OK, Json(json!({ "status": "OK" }))).into_response()
        }
        Ok(ClaimOutcome::AlreadyDone) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "AlreadyDone" })),
        )
            .into_response(),
        Err(e @ BridgeError::Blacklisted(_)) => {
            error_response(StatusCode::FORBIDDEN, e.code())
        }
        Err(e @ (BridgeError::InvalidOwner | BridgeError::InvalidSignature)) => {
            error_response(StatusCode::CONFLICT, e.code())
        }
        Err(BridgeError::InvalidRequest(message)) => {
            error_response(StatusCode::BAD_REQUEST, &message)
        }
        Err(e) => internal_error(e),
    }
}

async fn swap_handler(State(state): State<AppState>, Json(request): Json<SwapRequest>) -> Response {
    let Some(amount) = amount_string(&request.amount) else {
        return error_response(StatusCode::BAD_REQUEST, "bad amount");
    };
    if NativeAddress::parse(&request.paw).is_err() {
        return error_response(StatusCode::BAD_REQUEST, "bad paw address");
    }

    let job = SwapToWrappedJob {
        native: request.paw,
        amount,
        evm: request.blockchain,
        signature: request.sig,
        ts_ms: chrono::Utc::now().timestamp_millis(),
    };
    match state.queue.enqueue_swap_to_wrapped(&job).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "status": "OK" }))).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn history_handler(
    State(state): State<AppState>,
    Path((evm, native)): Path<(String, String)>,
) -> Response {
    let Ok(native) = NativeAddress::parse(&native) else {
        return error_response(StatusCode::BAD_REQUEST, "bad paw address");
    };

    let deposits = match state.store.deposit_history(&native).await {
        Ok(records) => records,
        Err(e) => return internal_error(e),
    };
    let withdrawals = match state.store.withdrawal_history(&native).await {
        Ok(records) => records,
        Err(e) => return internal_error(e),
    };
    let to_wrapped = match state.store.swap_to_wrapped_history(&native).await {
        Ok(records) => records,
        Err(e) => return internal_error(e),
    };
    let to_native = match state.store.swap_to_native_history(&evm).await {
        Ok(records) => records,
        Err(e) => return internal_error(e),
    };

    let mut swaps: Vec<serde_json::Value> = to_wrapped
        .iter()
        .map(|record| {
            json!({
                "type": "swap-to-wrapped",
                "amount": format_paw(record.amount),
                "evm": record.evm,
                "ts": record.ts_ms,
                "uuid": record.uuid.to_string(),
            })
        })
        .chain(to_native.iter().map(|record| {
            json!({
                "type": "swap-to-native",
                "amount": format_paw(record.amount),
                "evm": record.evm,
                "ts": record.ts_ms,
                "hash": record.hash,
            })
        }))
        .collect();
    swaps.sort_by_key(|value| -value["ts"].as_i64().unwrap_or(0));

    Json(json!({
        "deposits": deposits.iter().map(|record| json!({
            "amount": format_paw(record.amount),
            "ts": record.ts_ms,
            "hash": record.hash,
        })).collect::<Vec<_>>(),
        "withdrawals": withdrawals.iter().map(|record| json!({
            "amount": format_paw(record.amount),
            "ts": record.ts_ms,
            "hash": record.hash,
        })).collect::<Vec<_>>(),
        "swaps": swaps,
    }))
    .into_response()
}

/// Per-user job outcome stream.
async fn events_handler(
    State(state): State<AppState>,
    Path(native): Path<String>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, Response>
{
    if NativeAddress::parse(&native).is_err() {
        return Err(error_response(StatusCode::BAD_REQUEST, "bad paw address"));
    }

    let receiver = state.notify.subscribe(&native).await;
    let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match to_sse_event(&event) {
                    Some(sse) => return Some((Ok(sse), receiver)),
                    None => continue,
                },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &BridgeEvent) -> Option<Event> {
    Event::default().event("job").json_data(event).ok()
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Accept amounts as JSON strings or numbers; reject everything else.
fn amount_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn error_response(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

fn internal_error(e: BridgeError) -> Response {
    tracing::error!(error = %e, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_string_accepts_both_shapes() {
        assert_eq!(amount_string(&json!("10.5")), Some("10.5".to_string()));
        assert_eq!(amount_string(&json!(10.5)), Some("10.5".to_string()));
        assert_eq!(amount_string(&json!(150)), Some("150".to_string()));
        assert_eq!(amount_string(&json!(" 1 ")), Some("1".to_string()));
        assert_eq!(amount_string(&json!(null)), None);
        assert_eq!(amount_string(&json!({"a": 1})), None);
        assert_eq!(amount_string(&json!("")), None);
    }
}
