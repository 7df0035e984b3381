//! Rolling price history
//!
//! Bounded per-series buffers fed by successful fetches, plus the derived
//! metrics the dashboard shows: Brent-WTI spread, price change and the
//! positional table merge.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::types::{FetchResult, PriceSample, SeriesId};

/// Default number of samples kept per series
pub const MAX_HISTORY: usize = 100;

/// Per-series rolling buffer owned by one dashboard session
#[derive(Debug, Clone)]
pub struct PriceHistory {
    series: BTreeMap<SeriesId, VecDeque<PriceSample>>,
    capacity: usize,
}

/// One row of the merged history table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub timestamp: DateTime<Utc>,
    pub wti_price: Option<Decimal>,
    pub brent_price: Option<Decimal>,
}

/// Direction of the latest price move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn from_change(change: Decimal) -> Self {
        if change > Decimal::ZERO {
            Trend::Up
        } else if change < Decimal::ZERO {
            Trend::Down
        } else {
            Trend::Flat
        }
    }
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY)
    }

    /// Buffer keeping at most `capacity` samples per series (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            series: SeriesId::ALL
                .iter()
                .map(|&s| (s, VecDeque::with_capacity(capacity.max(1))))
                .collect(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append every successful sample of `result`, stamped with `now`.
    ///
    /// Failed or absent series are left untouched. Returns the series that
    /// received a new sample.
    pub fn record(&mut self, result: &FetchResult, now: DateTime<Utc>) -> Vec<SeriesId> {
        let mut appended = Vec::new();

        for sample in result.samples() {
            let buffer = self.series.entry(sample.series).or_default();

            if let Some(last) = buffer.back() {
                if now < last.observed_at {
                    tracing::warn!(
                        series = %sample.series,
                        now = %now,
                        last = %last.observed_at,
                        "Skipping out-of-order sample"
                    );
                    continue;
                }
            }

            buffer.push_back(PriceSample::new(sample.series, sample.price, now));
            while buffer.len() > self.capacity {
                buffer.pop_front();
            }
            appended.push(sample.series);
        }

        appended
    }

    /// Samples of one series, oldest first
    pub fn samples(&self, series: SeriesId) -> impl Iterator<Item = &PriceSample> + '_ {
        self.series.get(&series).into_iter().flatten()
    }

    pub fn latest(&self, series: SeriesId) -> Option<&PriceSample> {
        self.series.get(&series).and_then(|b| b.back())
    }

    pub fn len(&self, series: SeriesId) -> usize {
        self.series.get(&series).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(VecDeque::is_empty)
    }

    pub fn clear(&mut self) {
        self.series.values_mut().for_each(VecDeque::clear);
    }

    /// Latest price minus the one before it
    pub fn change(&self, series: SeriesId) -> Option<Decimal> {
        let buffer = self.series.get(&series)?;
        let n = buffer.len();
        if n < 2 {
            return None;
        }
        Some(buffer[n - 1].price - buffer[n - 2].price)
    }

    pub fn trend(&self, series: SeriesId) -> Option<Trend> {
        self.change(series).map(Trend::from_change)
    }

    /// Merge both series into table rows by index position.
    ///
    /// Produces `max(len(wti), len(brent))` rows; a row takes WTI's
    /// timestamp when WTI has an entry at that index, otherwise Brent's.
    pub fn as_rows(&self) -> Vec<HistoryRow> {
        let empty = VecDeque::new();
        let wti = self.series.get(&SeriesId::Wti).unwrap_or(&empty);
        let brent = self.series.get(&SeriesId::Brent).unwrap_or(&empty);

        (0..wti.len().max(brent.len()))
            .filter_map(|i| {
                let w = wti.get(i);
                let b = brent.get(i);
                let timestamp = w.or(b)?.observed_at;
                Some(HistoryRow {
                    timestamp,
                    wti_price: w.map(|s| s.price),
                    brent_price: b.map(|s| s.price),
                })
            })
            .collect()
    }
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Brent minus WTI, only when both series succeeded in the same result
pub fn spread(result: &FetchResult) -> Option<Decimal> {
    match result {
        FetchResult::Success { wti, brent } => Some(brent.price - wti.price),
        _ => None,
    }
}
