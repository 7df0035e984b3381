//! Configuration enums and conversions

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;

use super::SyntheticConfig;
use crate::oracle::SyntheticParams;

/// Where prices come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Live,
    Synthetic,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Live => write!(f, "live"),
            SourceMode::Synthetic => write!(f, "synthetic"),
        }
    }
}

impl From<&SyntheticConfig> for SyntheticParams {
    fn from(cfg: &SyntheticConfig) -> Self {
        let defaults = SyntheticParams::default();
        let to_decimal = |v: f64, fallback: Decimal| {
            Decimal::from_f64(v).map(|d| d.round_dp(2)).unwrap_or(fallback)
        };
        Self {
            seed: cfg.seed,
            wti_base: to_decimal(cfg.wti_base, defaults.wti_base),
            brent_base: to_decimal(cfg.brent_base, defaults.brent_base),
            amplitude: to_decimal(cfg.amplitude, defaults.amplitude),
        }
    }
}
