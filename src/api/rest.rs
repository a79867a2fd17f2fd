// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. This is the pull side of the system:
// the chart front end polls `/candles/:symbol` (or `/state`) on its refresh
// interval and re-renders. No authentication — the backend serves public
// delayed market data.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app_state::AppState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/symbols", get(symbols))
        .route("/api/v1/candles/:symbol", get(candles))
        .route("/api/v1/display", post(set_display))
        // ── WebSocket (handled in the ws module but mounted here) ───────
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Full state snapshot
// =============================================================================

async fn full_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.build_snapshot();
    Json(snapshot)
}

// =============================================================================
// Symbols
// =============================================================================

async fn symbols(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = serde_json::json!({
        "symbols": state.aggregator.symbols(),
        "selected": state.selected_symbols(),
    });
    Json(body)
}

// =============================================================================
// Per-symbol candle series
// =============================================================================

async fn candles(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    match state.aggregator.snapshot(&symbol) {
        Some(series) => Json(series).into_response(),
        None => {
            let body = serde_json::json!({
                "error": format!("unknown symbol: '{symbol}'"),
            });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    }
}

// =============================================================================
// Display selection
// =============================================================================

#[derive(Deserialize)]
struct DisplayRequest {
    symbols: Vec<String>,
}

async fn set_display(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DisplayRequest>,
) -> impl IntoResponse {
    match state.set_selected_symbols(req.symbols) {
        Ok(()) => {
            let selected = state.selected_symbols();
            info!(selected = ?selected, "display selection changed via API");
            Json(serde_json::json!({ "selected": selected })).into_response()
        }
        Err(e) => {
            let body = serde_json::json!({ "error": e.to_string() });
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
    }
}
