//! Dashboard Module
//!
//! HTTP/WebSocket API over a running [`DashboardSession`].
//! Only compiled when the `dashboard` feature is enabled.

mod api;
mod types;
mod websocket;

pub use api::create_router;
pub use types::*;
pub use websocket::WebSocketBroadcaster;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::flows::Fleet;
use crate::session::{CycleTrigger, DashboardSession, DashboardSnapshot};

const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// Shared state behind every handler
#[derive(Clone)]
pub struct DashboardState {
    pub session: Arc<Mutex<DashboardSession>>,
    pub fleet: Arc<Fleet>,
    pub broadcaster: WebSocketBroadcaster,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(
        session: Arc<Mutex<DashboardSession>>,
        fleet: Fleet,
        broadcaster: WebSocketBroadcaster,
    ) -> Self {
        Self {
            session,
            fleet: Arc::new(fleet),
            broadcaster,
            started_at: Utc::now(),
        }
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Manual cycle, pushed to every WebSocket client
    pub async fn refresh(&self) -> DashboardSnapshot {
        let snapshot = self
            .session
            .lock()
            .await
            .run_cycle(CycleTrigger::Manual)
            .await;
        self.broadcaster.broadcast_snapshot(&snapshot);
        snapshot
    }

    pub async fn health(&self) -> HealthResponse {
        let session = self.session.lock().await;
        let snapshot = session.snapshot();
        let latest = session.latest();
        let last_error = latest.and_then(|r| {
            session
                .symbols()
                .iter()
                .find_map(|&s| r.failure(s))
                .map(ToString::to_string)
        });

        HealthResponse {
            source: session.fetcher().source_name().to_string(),
            cycles: snapshot.cycles,
            last_updated: snapshot.last_updated,
            last_status: latest.map(|r| r.status_label().to_string()),
            last_error,
            cache_entries: session.fetcher().cache().len(),
            started_at: self.started_at,
        }
    }
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(state: DashboardState, bind: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let broadcaster = state.broadcaster.clone();
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind dashboard on {bind}"))?;

    tracing::info!(addr = %bind, "Dashboard API listening");

    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            broadcaster.broadcast_heartbeat();
        }
    });

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Dashboard server error");

    heartbeat.abort();
    served
}
