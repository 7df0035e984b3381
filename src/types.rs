//! Core types used throughout OilWatch
//!
//! Defines the price series, samples and the tagged fetch result shared by
//! the oracle, the history buffer and the dashboard.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Tracked crude benchmarks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeriesId {
    /// West Texas Intermediate
    #[serde(rename = "WTI")]
    Wti,
    /// Brent Crude
    #[serde(rename = "BRENT")]
    Brent,
}

impl SeriesId {
    pub const ALL: [SeriesId; 2] = [SeriesId::Wti, SeriesId::Brent];

    /// Symbol code used by the Commodities-API (`symbols=WTI,BRENT`)
    pub fn code(&self) -> &'static str {
        match self {
            SeriesId::Wti => "WTI",
            SeriesId::Brent => "BRENT",
        }
    }

    /// Human readable benchmark name
    pub fn display_name(&self) -> &'static str {
        match self {
            SeriesId::Wti => "WTI Crude Oil",
            SeriesId::Brent => "Brent Crude Oil",
        }
    }

    /// Parse from string
    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "WTI" => Some(SeriesId::Wti),
            "BRENT" => Some(SeriesId::Brent),
            _ => None,
        }
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One observed price for one series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    pub series: SeriesId,
    /// USD per barrel, always positive
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(series: SeriesId, price: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            series,
            price,
            observed_at,
        }
    }
}

/// Reason a fetch (or one series of a fetch) failed
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum FetchError {
    /// Transport-level failure, including timeouts
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream answered with a non-2xx status
    #[error("HTTP error: status {0}")]
    Http(u16),

    /// Body was malformed or an expected field was missing
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request rejected before any network I/O
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Short machine-friendly label for logs and the dashboard
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Http(_) => "http",
            FetchError::Parse(_) => "parse",
            FetchError::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return FetchError::Http(status.as_u16());
        }
        if err.is_decode() {
            return FetchError::Parse(err.to_string());
        }
        FetchError::Network(err.to_string())
    }
}

/// Outcome of one fetch cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchResult {
    /// Both series were requested and both succeeded
    Success { wti: PriceSample, brent: PriceSample },
    /// Exactly one series was requested and it succeeded
    Single(PriceSample),
    /// One of two requested series failed
    PartialFailure {
        succeeded: PriceSample,
        failed: SeriesId,
        reason: FetchError,
    },
    /// Nothing usable came back
    TotalFailure { reason: FetchError },
}

impl FetchResult {
    /// Successful sample for a series, if this result carries one
    pub fn sample(&self, series: SeriesId) -> Option<&PriceSample> {
        match self {
            FetchResult::Success { wti, brent } => match series {
                SeriesId::Wti => Some(wti),
                SeriesId::Brent => Some(brent),
            },
            FetchResult::Single(sample) | FetchResult::PartialFailure { succeeded: sample, .. } => {
                (sample.series == series).then_some(sample)
            }
            FetchResult::TotalFailure { .. } => None,
        }
    }

    /// All successful samples in series order
    pub fn samples(&self) -> Vec<&PriceSample> {
        SeriesId::ALL
            .iter()
            .filter_map(|&series| self.sample(series))
            .collect()
    }

    /// Failure reason for a series (a total failure applies to every series)
    pub fn failure(&self, series: SeriesId) -> Option<&FetchError> {
        match self {
            FetchResult::PartialFailure { failed, reason, .. } if *failed == series => Some(reason),
            FetchResult::TotalFailure { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. } | FetchResult::Single(_))
    }

    /// Short label for logs
    pub fn status_label(&self) -> &'static str {
        match self {
            FetchResult::Success { .. } => "success",
            FetchResult::Single(_) => "single",
            FetchResult::PartialFailure { .. } => "partial_failure",
            FetchResult::TotalFailure { .. } => "total_failure",
        }
    }
}

/// Format a USD price with two decimals, e.g. `$75.00`
pub fn format_price(price: Decimal) -> String {
    format!("${}", format_amount(price))
}

/// Two-decimal amount without the currency sign, e.g. `75.00`
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}
