//! Dashboard HTTP API
//!
//! REST endpoints over the analytics core. View failures surface as
//! `500 {"error": ...}`; everything else degrades inside the views.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use super::types::*;
use super::{views, AppState};
use crate::market_time;
use crate::persistence::ExportFormat;

/// Create the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(get_health))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/trades", get(get_trades))
        .route("/api/broker-limits", get(get_broker_limits))
        .route("/api/export", get(get_export))
        .with_state(state)
        // CORS for the dashboard frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn internal_error(err: anyhow::Error) -> Response {
    error!(error = %err, "view handler failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
        .into_response()
}

/// GET /api/health - mode and IST clock
async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let paper = &state.config.paper;
    Json(HealthResponse {
        ok: true,
        trade_mode: paper.effective_trade_mode().to_string(),
        live_enabled: paper.live_enabled(),
        ist_time: market_time::ist_time_string(),
        ist_datetime: market_time::ist_datetime_string(),
    })
}

/// GET /api/dashboard - derived rows + stats + composed status
async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    match views::dashboard_view(&state, &query) {
        Ok(body) => Json(body).into_response(),
        Err(err) => internal_error(err),
    }
}

/// GET /api/trades - summary, open/closed trades, analysis
async fn get_trades(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TradesQuery>,
) -> Response {
    match views::trades_view(&state, &query) {
        Ok(body) => Json(body).into_response(),
        Err(err) => internal_error(err),
    }
}

/// GET /api/broker-limits - the governor's verdict for today
async fn get_broker_limits(State(state): State<Arc<AppState>>) -> Response {
    let day = market_time::ist_day();
    let report = state.engine.governor().report(&state.store, &day);
    Json(report).into_response()
}

/// GET /api/export?format=csv|json - dump trade history under exports/
async fn get_export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Response {
    let format = match query
        .format
        .as_deref()
        .map(ExportFormat::parse)
        .unwrap_or(Some(ExportFormat::Csv))
    {
        Some(f) => f,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "format must be csv or json" })),
            )
                .into_response()
        }
    };
    let dir = std::path::Path::new(&state.config.data.exports_dir);
    match state.store.export_trades(dir, format) {
        Ok(result) => Json(result).into_response(),
        Err(err) => internal_error(err),
    }
}
