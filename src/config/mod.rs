//! Configuration management for OilWatch
//!
//! Loads from YAML/TOML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::types::SeriesId;

/// Upper bound on synthetic back-filled points
pub const MAX_BACKFILL_POINTS: usize = 10_000;

/// Upper bound on the back-fill step, one week
pub const MAX_BACKFILL_STEP_SECS: u64 = 7 * 86_400;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub source: SourceConfig,
    pub synthetic: SyntheticConfig,
    pub poll: PollConfig,
    pub history: HistoryConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Commodities-API `latest` endpoint
    pub base_url: String,
    /// Access key (falls back to COMMODITIES_API_KEY)
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Response cache TTL in seconds
    pub cache_ttl_secs: u64,
    /// One request for all symbols instead of one per symbol
    pub batch_symbols: bool,
    /// Retry once on transport failures
    pub retry_on_network: bool,
    /// Series codes to fetch (WTI, BRENT)
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// "live" or "synthetic"
    pub mode: SourceMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub wti_base: f64,
    pub brent_base: f64,
    /// Maximum jitter around the base price
    pub amplitude: f64,
    /// Points back-filled into a new session (0 disables)
    pub backfill_points: usize,
    /// Spacing of back-filled points in seconds
    pub backfill_step_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Run the periodic fetch cycle
    pub auto_refresh: bool,
    /// Seconds between cycles
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Samples kept per series
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Listen address of the dashboard API
    pub bind: String,
    /// WebSocket broadcast channel capacity
    pub ws_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let builder = Self::defaults()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (OILWATCH__*)
            .add_source(Environment::with_prefix("OILWATCH").separator("__"));

        let mut app_config: AppConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if app_config.api.api_key.as_deref().map_or(true, str::is_empty) {
            app_config.api.api_key = std::env::var("COMMODITIES_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty());
        }

        app_config.validate()?;
        Ok(app_config)
    }

    /// Built-in defaults only (no files, no environment)
    pub fn from_defaults() -> Result<Self> {
        Self::defaults()?
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    fn defaults() -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            // API defaults
            .set_default("api.base_url", crate::oracle::sources::COMMODITIES_API_BASE_URL)?
            .set_default("api.timeout_secs", 10)?
            .set_default("api.cache_ttl_secs", 60)?
            .set_default("api.batch_symbols", true)?
            .set_default("api.retry_on_network", false)?
            .set_default("api.symbols", vec!["WTI", "BRENT"])?
            // Source defaults
            .set_default("source.mode", "live")?
            // Synthetic defaults
            .set_default("synthetic.seed", 42)?
            .set_default("synthetic.wti_base", 75.50)?
            .set_default("synthetic.brent_base", 78.30)?
            .set_default("synthetic.amplitude", 2.0)?
            .set_default("synthetic.backfill_points", 24)?
            .set_default("synthetic.backfill_step_secs", 3600)?
            // Poll defaults
            .set_default("poll.auto_refresh", true)?
            .set_default("poll.interval_secs", 60)?
            // History defaults
            .set_default("history.max_entries", crate::history::MAX_HISTORY as u64)?
            // Dashboard defaults
            .set_default("dashboard.bind", "127.0.0.1:8080")?
            .set_default("dashboard.ws_capacity", 100)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?)
    }

    /// Parsed series set from `api.symbols`
    pub fn symbols(&self) -> Result<Vec<SeriesId>> {
        self.api
            .symbols
            .iter()
            .map(|code| {
                SeriesId::from_code(code).with_context(|| format!("Unknown series symbol {}", code))
            })
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.api.cache_ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.history.max_entries == 0 {
            bail!("history.max_entries must be at least 1");
        }
        if self.api.timeout_secs == 0 {
            bail!("api.timeout_secs must be at least 1");
        }
        if self.poll.auto_refresh && self.poll.interval_secs == 0 {
            bail!("poll.interval_secs must be at least 1 when auto_refresh is on");
        }
        if self.symbols()?.is_empty() {
            bail!("api.symbols must name at least one series");
        }
        if self.source.mode == SourceMode::Live
            && self.api.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            bail!("An API key is required in live mode (api.api_key or COMMODITIES_API_KEY)");
        }
        if self.synthetic.wti_base <= 0.0 || self.synthetic.brent_base <= 0.0 {
            bail!("synthetic base prices must be positive");
        }
        if self.synthetic.backfill_points > MAX_BACKFILL_POINTS {
            bail!("synthetic.backfill_points must be at most {MAX_BACKFILL_POINTS}");
        }
        if self.synthetic.backfill_step_secs == 0
            || self.synthetic.backfill_step_secs > MAX_BACKFILL_STEP_SECS
        {
            bail!("synthetic.backfill_step_secs must be between 1 and {MAX_BACKFILL_STEP_SECS}");
        }
        Ok(())
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "source={} symbols={:?} interval={}s auto_refresh={} cache_ttl={}s max_history={} key_set={}",
            self.source.mode,
            self.api.symbols,
            self.poll.interval_secs,
            self.poll.auto_refresh,
            self.api.cache_ttl_secs,
            self.history.max_entries,
            self.api.api_key.is_some()
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
