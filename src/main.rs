//! OilWatch - crude price dashboard service
//!
//! Loads configuration, builds the price source and cache, then polls on an
//! interval (and serves the dashboard API with the `dashboard` feature).

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use oilwatch::config::{AppConfig, LoggingConfig, SourceMode};
use oilwatch::oracle::{
    CachedFetcher, CommoditiesApiClient, PriceSource, ResponseCache, SyntheticParams,
    SyntheticSource,
};
use oilwatch::session::{spawn_poller, CycleTrigger, DashboardSession, DashboardSnapshot};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging);

    tracing::info!(config = %config.digest(), "Starting OilWatch");

    let symbols = config.symbols()?;
    let mut backfill = Vec::new();

    let source: Arc<dyn PriceSource> = match config.source.mode {
        SourceMode::Live => Arc::new(CommoditiesApiClient::new(
            &config.api.base_url,
            config.request_timeout(),
            config.api.batch_symbols,
        )?),
        SourceMode::Synthetic => {
            let synthetic = SyntheticSource::new(SyntheticParams::from(&config.synthetic));
            let step = chrono::Duration::seconds(config.synthetic.backfill_step_secs as i64);
            let end = chrono::Utc::now() - step;
            backfill = synthetic.history(config.synthetic.backfill_points, end, step);
            Arc::new(synthetic)
        }
    };

    let cache = Arc::new(ResponseCache::new(config.cache_ttl()));
    let fetcher =
        CachedFetcher::new(source, cache).with_network_retry(config.api.retry_on_network);

    let mut session = DashboardSession::new(
        Arc::new(fetcher),
        config.api.api_key.clone().unwrap_or_default(),
        symbols,
        config.history.max_entries,
    )?;
    if !backfill.is_empty() {
        session.seed_history(backfill);
    }
    let session = Arc::new(Mutex::new(session));

    #[cfg(feature = "dashboard")]
    let broadcaster = oilwatch::dashboard::WebSocketBroadcaster::new(config.dashboard.ws_capacity);

    let poller = if config.poll.auto_refresh {
        #[cfg(feature = "dashboard")]
        let on_snapshot = {
            let broadcaster = broadcaster.clone();
            move |snapshot: &DashboardSnapshot| {
                log_snapshot(snapshot);
                broadcaster.broadcast_snapshot(snapshot);
            }
        };
        #[cfg(not(feature = "dashboard"))]
        let on_snapshot = log_snapshot;

        Some(spawn_poller(
            session.clone(),
            config.poll_interval(),
            on_snapshot,
        ))
    } else {
        // Auto-refresh off: one cycle now, later ones on demand
        let snapshot = session.lock().await.run_cycle(CycleTrigger::Scheduled).await;
        log_snapshot(&snapshot);
        None
    };

    #[cfg(feature = "dashboard")]
    let outcome = {
        let state = oilwatch::dashboard::DashboardState::new(
            session.clone(),
            oilwatch::flows::Fleet::default(),
            broadcaster,
        );
        oilwatch::dashboard::serve(state, &config.dashboard.bind, shutdown_signal()).await
    };

    #[cfg(not(feature = "dashboard"))]
    let outcome: Result<()> = {
        if poller.is_some() {
            shutdown_signal().await;
        }
        Ok(())
    };

    if let Some(poller) = poller {
        poller.stop().await;
    }

    tracing::info!("OilWatch stopped");
    outcome
}

fn init_tracing(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn log_snapshot(snapshot: &DashboardSnapshot) {
    for view in &snapshot.series {
        match (&view.current_display, &view.error) {
            (Some(price), _) => tracing::info!(
                series = %view.series,
                price = %price,
                change = ?view.change,
                points = view.history.len(),
                "Price update"
            ),
            (None, Some(error)) => tracing::warn!(series = %view.series, error = %error, "No price"),
            (None, None) => {}
        }
    }
    if let Some(spread) = &snapshot.spread_display {
        tracing::info!(spread = %spread, "Brent-WTI spread");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Shutdown signal received");
}
