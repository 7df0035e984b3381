//! Dashboard API Types
//!
//! DTOs for HTTP/WebSocket communication with the frontend.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::flows::{FlowArc, ShipPosition};
use crate::session::{DashboardSnapshot, SeriesView};
use crate::types::FetchResult;

/// GET /api/prices
#[derive(Debug, Clone, Serialize)]
pub struct PricesResponse {
    pub latest: Option<FetchResult>,
    pub series: Vec<SeriesView>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<&DashboardSnapshot> for PricesResponse {
    fn from(snapshot: &DashboardSnapshot) -> Self {
        Self {
            latest: snapshot.latest.clone(),
            series: snapshot.series.clone(),
            last_updated: snapshot.last_updated,
        }
    }
}

/// GET /api/spread
#[derive(Debug, Clone, Serialize)]
pub struct SpreadResponse {
    /// Brent minus WTI from the latest fetch, when both succeeded
    pub spread: Option<Decimal>,
    pub display: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// GET /api/health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub source: String,
    pub cycles: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    pub cache_entries: usize,
    pub started_at: DateTime<Utc>,
}

/// GET /api/flows
#[derive(Debug, Clone, Serialize)]
pub struct FlowsResponse {
    pub ports: Vec<crate::flows::Port>,
    pub ships: Vec<ShipPosition>,
    pub flows: Vec<FlowArc>,
}

// ─────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    /// Full snapshot (sent on connect and after every cycle)
    Snapshot(DashboardSnapshot),
    /// Heartbeat
    Heartbeat(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
