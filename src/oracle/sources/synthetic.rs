//! Synthetic crude prices
//!
//! Seedable generator used by demo mode and tests. Current prices jitter
//! uniformly around a base; back-filled history adds a slight upward trend.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Mutex;

use crate::oracle::{combine_outcomes, validate_symbols, PriceSource};
use crate::types::{FetchResult, PriceSample, SeriesId};

/// Per-point drift applied by [`SyntheticSource::history`]
const HISTORY_TREND_PER_POINT: f64 = 0.1;
/// Noise amplitude of back-filled history
const HISTORY_NOISE: f64 = 3.0;
const MIN_PRICE: Decimal = dec!(0.01);

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticParams {
    pub seed: u64,
    pub wti_base: Decimal,
    pub brent_base: Decimal,
    /// Maximum distance from the base price
    pub amplitude: Decimal,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            seed: 42,
            wti_base: dec!(75.50),
            brent_base: dec!(78.30),
            amplitude: dec!(2.0),
        }
    }
}

pub struct SyntheticSource {
    params: SyntheticParams,
    rng: Mutex<StdRng>,
}

impl SyntheticSource {
    pub fn new(params: SyntheticParams) -> Self {
        let rng = StdRng::seed_from_u64(params.seed);
        Self {
            params,
            rng: Mutex::new(rng),
        }
    }

    pub fn params(&self) -> &SyntheticParams {
        &self.params
    }

    fn base(&self, series: SeriesId) -> Decimal {
        match series {
            SeriesId::Wti => self.params.wti_base,
            SeriesId::Brent => self.params.brent_base,
        }
    }

    /// `base + noise`, rounded to cents and kept strictly positive
    fn jitter(&self, base: Decimal, noise: f64) -> Decimal {
        let offset = if noise > 0.0 {
            let draw = self
                .rng
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .gen_range(-noise..=noise);
            Decimal::from_f64(draw).unwrap_or_default()
        } else {
            Decimal::ZERO
        };
        (base + offset).round_dp(2).max(MIN_PRICE)
    }

    /// Current price of one series
    pub fn next_price(&self, series: SeriesId) -> Decimal {
        let amplitude = self.params.amplitude.abs().to_f64().unwrap_or(0.0);
        self.jitter(self.base(series), amplitude)
    }

    /// Back-filled history of `points` pairs ending at `end`, `step` apart.
    ///
    /// Each entry is a successful fetch result stamped at its sample time.
    /// Points whose timestamp falls outside chrono's range are skipped.
    pub fn history(
        &self,
        points: usize,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Vec<(DateTime<Utc>, FetchResult)> {
        (0..points)
            .filter_map(|i| {
                let at = i32::try_from(points - 1 - i)
                    .ok()
                    .and_then(|n| step.checked_mul(n))
                    .and_then(|offset| end.checked_sub_signed(offset))?;
                let trend = Decimal::from_f64(i as f64 * HISTORY_TREND_PER_POINT)
                    .unwrap_or_default();
                let wti = self.jitter(self.params.wti_base + trend, HISTORY_NOISE);
                let brent = self.jitter(self.params.brent_base + trend, HISTORY_NOISE);
                Some((
                    at,
                    FetchResult::Success {
                        wti: PriceSample::new(SeriesId::Wti, wti, at),
                        brent: PriceSample::new(SeriesId::Brent, brent, at),
                    },
                ))
            })
            .collect()
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(SyntheticParams::default())
    }
}

#[async_trait]
impl PriceSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "Synthetic"
    }

    fn endpoint(&self) -> String {
        format!("synthetic:{}", self.params.seed)
    }

    /// The API key is not used; only the symbol set is validated.
    async fn fetch(&self, _api_key: &str, symbols: &[SeriesId]) -> FetchResult {
        let symbols = match validate_symbols(symbols) {
            Ok(symbols) => symbols,
            Err(reason) => return FetchResult::TotalFailure { reason },
        };

        let now = Utc::now();
        combine_outcomes(
            symbols
                .into_iter()
                .map(|series| {
                    let sample = PriceSample::new(series, self.next_price(series), now);
                    (series, Ok(sample))
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::spread;

    #[test]
    fn test_same_seed_same_prices() {
        let a = SyntheticSource::default();
        let b = SyntheticSource::default();
        for _ in 0..20 {
            assert_eq!(a.next_price(SeriesId::Wti), b.next_price(SeriesId::Wti));
        }
    }

    #[test]
    fn test_prices_stay_within_amplitude() {
        let source = SyntheticSource::new(SyntheticParams {
            seed: 7,
            ..SyntheticParams::default()
        });
        for _ in 0..500 {
            let wti = source.next_price(SeriesId::Wti);
            let brent = source.next_price(SeriesId::Brent);
            assert!(wti >= dec!(73.50) && wti <= dec!(77.50), "wti {}", wti);
            assert!(brent >= dec!(76.30) && brent <= dec!(80.30), "brent {}", brent);
            assert_eq!(wti.round_dp(2), wti);
        }
    }

    #[test]
    fn test_zero_amplitude_returns_base() {
        let source = SyntheticSource::new(SyntheticParams {
            amplitude: Decimal::ZERO,
            ..SyntheticParams::default()
        });
        assert_eq!(source.next_price(SeriesId::Wti), dec!(75.50));
    }

    #[test]
    fn test_history_is_ordered_and_complete() {
        let source = SyntheticSource::default();
        let end = Utc::now();
        let history = source.history(24, end, Duration::hours(1));

        assert_eq!(history.len(), 24);
        assert_eq!(history.last().map(|(at, _)| *at), Some(end));
        assert_eq!(history[0].0, end - Duration::hours(23));
        assert!(history.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(history.iter().all(|(_, r)| spread(r).is_some()));
    }

    #[test]
    fn test_history_skips_points_out_of_time_range() {
        let source = SyntheticSource::default();
        let end = Utc::now();

        // One step back already leaves chrono's range; two overflow the offset
        let history = source.history(3, end, Duration::days(100_000_000));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].0, end);

        let history = source.history(500, end, Duration::days(1_000_000));
        assert!(!history.is_empty() && history.len() < 500);
        assert_eq!(history.last().map(|(at, _)| *at), Some(end));
        assert!(history.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[tokio::test]
    async fn test_fetch_answers_requested_symbols() {
        let source = SyntheticSource::default();

        let both = source.fetch("", &[SeriesId::Wti, SeriesId::Brent]).await;
        assert!(matches!(both, FetchResult::Success { .. }));

        let one = source.fetch("", &[SeriesId::Brent]).await;
        assert!(one.sample(SeriesId::Brent).is_some());
        assert!(one.sample(SeriesId::Wti).is_none());

        let none = source.fetch("", &[]).await;
        assert_eq!(none.status_label(), "total_failure");
    }
}
