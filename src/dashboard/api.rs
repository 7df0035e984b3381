//! Dashboard HTTP API
//!
//! REST endpoints for the dashboard frontend.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::collections::BTreeMap;
use tower_http::cors::{Any, CorsLayer};

use super::types::*;
use super::DashboardState;
use crate::export;
use crate::flows::FlowFilter;
use crate::types::{PriceSample, SeriesId};

/// Create the API router with all endpoints
pub fn create_router(state: DashboardState) -> Router {
    Router::new()
        // Prices
        .route("/api/prices", get(get_prices))
        .route("/api/history", get(get_history))
        .route("/api/history/rows", get(get_history_rows))
        .route("/api/spread", get(get_spread))
        .route("/api/refresh", post(post_refresh))
        // Tanker flows
        .route("/api/flows", get(get_flows))
        // CSV downloads
        .route("/api/export/history.csv", get(export_history))
        .route("/api/export/ports.csv", get(export_ports))
        .route("/api/export/ships.csv", get(export_ships))
        .route("/api/export/positions.csv", get(export_positions))
        .route("/api/export/flows.csv", get(export_flows))
        .route("/api/health", get(get_health))
        // WebSocket
        .route("/ws", get(websocket_handler))
        .with_state(state)
        // CORS for frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

// ─────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────

/// GET /api/prices - Latest fetch result and per-series views
async fn get_prices(State(state): State<DashboardState>) -> impl IntoResponse {
    let snapshot = state.snapshot().await;
    Json(ApiResponse::success(PricesResponse::from(&snapshot)))
}

/// GET /api/history - Chart points by series
async fn get_history(State(state): State<DashboardState>) -> impl IntoResponse {
    let snapshot = state.snapshot().await;
    let history: BTreeMap<SeriesId, Vec<PriceSample>> = snapshot
        .series
        .into_iter()
        .map(|view| (view.series, view.history))
        .collect();
    Json(ApiResponse::success(history))
}

/// GET /api/history/rows - Table rows, newest last
async fn get_history_rows(State(state): State<DashboardState>) -> impl IntoResponse {
    let snapshot = state.snapshot().await;
    Json(ApiResponse::success(snapshot.rows))
}

/// GET /api/spread - Brent minus WTI
async fn get_spread(State(state): State<DashboardState>) -> impl IntoResponse {
    let snapshot = state.snapshot().await;
    Json(ApiResponse::success(SpreadResponse {
        spread: snapshot.spread,
        display: snapshot.spread_display,
        last_updated: snapshot.last_updated,
    }))
}

/// POST /api/refresh - Bypass the cache and fetch now
async fn post_refresh(State(state): State<DashboardState>) -> impl IntoResponse {
    let snapshot = state.refresh().await;
    Json(ApiResponse::success(PricesResponse::from(&snapshot)))
}

/// GET /api/flows?origin=Houston&min_volume=1.5&max_volume=3
async fn get_flows(
    Query(filter): Query<FlowFilter>,
    State(state): State<DashboardState>,
) -> impl IntoResponse {
    let (ships, flows) = filter.apply(&state.fleet.positions, &state.fleet.flows);
    Json(ApiResponse::success(FlowsResponse {
        ports: state.fleet.ports.clone(),
        ships,
        flows,
    }))
}

/// GET /api/health - Source and cycle status
async fn get_health(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.health().await))
}

async fn export_history(State(state): State<DashboardState>) -> Response {
    let snapshot = state.snapshot().await;
    csv_response("oil_price_history.csv", export::history_csv(&snapshot.rows))
}

async fn export_ports(State(state): State<DashboardState>) -> Response {
    csv_response("ports.csv", export::ports_csv(&state.fleet.ports))
}

async fn export_ships(State(state): State<DashboardState>) -> Response {
    csv_response("ships.csv", export::ships_csv(&state.fleet.ships))
}

async fn export_positions(State(state): State<DashboardState>) -> Response {
    csv_response("positions.csv", export::positions_csv(&state.fleet.positions))
}

async fn export_flows(State(state): State<DashboardState>) -> Response {
    csv_response("flows.csv", export::flows_csv(&state.fleet.flows))
}

fn csv_response(filename: &str, body: anyhow::Result<String>) -> Response {
    match body {
        Ok(csv) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                ),
            ],
            csv,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(file = %filename, error = %e, "CSV export failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(e.to_string())),
            )
                .into_response()
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// WebSocket Handler
// ─────────────────────────────────────────────────────────────────

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};

/// WebSocket upgrade handler
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<DashboardState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Outgoing message type for WebSocket
enum OutgoingMessage {
    Text(String),
    Pong(Vec<u8>),
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: DashboardState) {
    use futures_util::{SinkExt, StreamExt};

    tracing::info!("New WebSocket connection");

    let (mut sender, mut receiver) = socket.split();

    // Current snapshot first
    let msg = WsMessage::Snapshot(state.snapshot().await);
    if let Ok(json) = serde_json::to_string(&msg) {
        if sender.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    let mut rx = state.broadcaster.subscribe();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<OutgoingMessage>(32);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let result = match msg {
                OutgoingMessage::Text(text) => sender.send(Message::Text(text)).await,
                OutgoingMessage::Pong(data) => sender.send(Message::Pong(data)).await,
            };
            if result.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            broadcast_msg = rx.recv() => {
                match broadcast_msg {
                    Ok(msg) => {
                        if out_tx.send(OutgoingMessage::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "WebSocket client lagging");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        if out_tx.send(OutgoingMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received WebSocket message: {}", text);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }

    send_task.abort();
    tracing::info!("WebSocket connection closed");
}
