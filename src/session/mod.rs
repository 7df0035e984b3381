//! Dashboard session
//!
//! One [`DashboardSession`] per dashboard: it owns the rolling history and
//! the latest fetch result, runs one fetch → record cycle at a time and hands
//! out read-only [`DashboardSnapshot`]s for rendering.

mod poller;

pub use poller::{spawn_poller, PollerHandle};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::history::{spread, HistoryRow, PriceHistory, Trend};
use crate::oracle::{CacheStatus, CachedFetcher};
use crate::types::{format_price, FetchResult, PriceSample, SeriesId};

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    /// Periodic poll, served from the cache when fresh
    Scheduled,
    /// User-requested refresh, bypasses the cache
    Manual,
}

/// Current view of one series
#[derive(Debug, Clone, Serialize)]
pub struct SeriesView {
    pub series: SeriesId,
    pub name: &'static str,
    /// Sample from the latest fetch, if that series succeeded
    pub current: Option<PriceSample>,
    pub current_display: Option<String>,
    /// Failure reason from the latest fetch
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
    pub change: Option<Decimal>,
    pub trend: Option<Trend>,
    /// Chart points, oldest first
    pub history: Vec<PriceSample>,
}

/// Everything a renderer needs after a cycle
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub latest: Option<FetchResult>,
    pub spread: Option<Decimal>,
    pub spread_display: Option<String>,
    pub series: Vec<SeriesView>,
    pub rows: Vec<HistoryRow>,
    pub last_updated: Option<DateTime<Utc>>,
    pub cycles: u64,
}

/// Per-dashboard state and the fetch-record cycle
pub struct DashboardSession {
    fetcher: Arc<CachedFetcher>,
    api_key: String,
    symbols: Vec<SeriesId>,
    history: PriceHistory,
    latest: Option<FetchResult>,
    last_updated: Option<DateTime<Utc>>,
    cycles: u64,
}

impl DashboardSession {
    pub fn new(
        fetcher: Arc<CachedFetcher>,
        api_key: impl Into<String>,
        symbols: Vec<SeriesId>,
        max_history: usize,
    ) -> Result<Self> {
        if symbols.is_empty() {
            bail!("A session needs at least one series");
        }
        Ok(Self {
            fetcher,
            api_key: api_key.into(),
            symbols,
            history: PriceHistory::with_capacity(max_history),
            latest: None,
            last_updated: None,
            cycles: 0,
        })
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn latest(&self) -> Option<&FetchResult> {
        self.latest.as_ref()
    }

    pub fn symbols(&self) -> &[SeriesId] {
        &self.symbols
    }

    pub fn fetcher(&self) -> &Arc<CachedFetcher> {
        &self.fetcher
    }

    /// Pre-load history (synthetic back-fill); does not touch `latest`
    pub fn seed_history(&mut self, points: impl IntoIterator<Item = (DateTime<Utc>, FetchResult)>) {
        let mut seeded = 0usize;
        for (at, result) in points {
            seeded += self.history.record(&result, at).len();
        }
        tracing::debug!(samples = seeded, "Seeded session history");
    }

    /// Run one fetch → record cycle stamped with the current time
    pub async fn run_cycle(&mut self, trigger: CycleTrigger) -> DashboardSnapshot {
        self.run_cycle_at(trigger, Utc::now()).await
    }

    /// Run one fetch → record cycle stamped with `now`
    pub async fn run_cycle_at(
        &mut self,
        trigger: CycleTrigger,
        now: DateTime<Utc>,
    ) -> DashboardSnapshot {
        let (result, cache) = match trigger {
            CycleTrigger::Scheduled => self.fetcher.fetch(&self.api_key, &self.symbols).await,
            CycleTrigger::Manual => self.fetcher.refresh(&self.api_key, &self.symbols).await,
        };

        let appended = self.history.record(&result, now);
        self.cycles += 1;

        match &result {
            FetchResult::TotalFailure { reason } => tracing::warn!(
                source = %self.fetcher.source_name(),
                kind = reason.kind(),
                error = %reason,
                "Fetch cycle failed, history unchanged"
            ),
            FetchResult::PartialFailure { failed, reason, .. } => tracing::warn!(
                source = %self.fetcher.source_name(),
                series = %failed,
                kind = reason.kind(),
                error = %reason,
                "Series fetch failed, its history unchanged"
            ),
            _ => {}
        }

        if cache != CacheStatus::Hit || self.latest.is_none() {
            tracing::info!(
                trigger = ?trigger,
                cache = ?cache,
                status = result.status_label(),
                appended = appended.len(),
                spread = ?spread(&result),
                "Cycle complete"
            );
        }

        self.latest = Some(result);
        self.last_updated = Some(now);
        self.snapshot()
    }

    /// Read-only view for rendering
    pub fn snapshot(&self) -> DashboardSnapshot {
        let spread = self.latest.as_ref().and_then(spread);

        let series = self
            .symbols
            .iter()
            .map(|&series| {
                let current = self
                    .latest
                    .as_ref()
                    .and_then(|r| r.sample(series))
                    .cloned();
                let failure = self.latest.as_ref().and_then(|r| r.failure(series));
                SeriesView {
                    series,
                    name: series.display_name(),
                    current_display: current.as_ref().map(|s| format_price(s.price)),
                    current,
                    error: failure.map(ToString::to_string),
                    error_kind: failure.map(|e| e.kind()),
                    change: self.history.change(series),
                    trend: self.history.trend(series),
                    history: self.history.samples(series).cloned().collect(),
                }
            })
            .collect();

        DashboardSnapshot {
            latest: self.latest.clone(),
            spread,
            spread_display: spread.map(format_price),
            series,
            rows: self.history.as_rows(),
            last_updated: self.last_updated,
            cycles: self.cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{MockPriceSource, ResponseCache};
    use crate::types::FetchError;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use std::time::Duration;

    const BOTH: [SeriesId; 2] = [SeriesId::Wti, SeriesId::Brent];

    fn success(wti: Decimal, brent: Decimal) -> FetchResult {
        FetchResult::Success {
            wti: PriceSample::new(SeriesId::Wti, wti, Utc::now()),
            brent: PriceSample::new(SeriesId::Brent, brent, Utc::now()),
        }
    }

    /// Session over a mock source that replays `results` in order
    fn session(results: Vec<FetchResult>, ttl_secs: u64) -> DashboardSession {
        let queue = Mutex::new(results.into_iter());
        let mut source = MockPriceSource::new();
        source.expect_name().return_const("Mock");
        source
            .expect_endpoint()
            .returning(|| "mock".to_string());
        source.expect_fetch().returning(move |_, _| {
            queue
                .lock()
                .unwrap()
                .next()
                .expect("no more scripted results")
        });

        let fetcher = CachedFetcher::new(
            Arc::new(source),
            Arc::new(ResponseCache::new(Duration::from_secs(ttl_secs))),
        );
        DashboardSession::new(Arc::new(fetcher), "key", BOTH.to_vec(), 100).unwrap()
    }

    #[tokio::test]
    async fn test_cycle_records_and_reports_spread() {
        let mut session = session(vec![success(dec!(75.00), dec!(78.50))], 0);
        let snapshot = session.run_cycle(CycleTrigger::Scheduled).await;

        assert_eq!(snapshot.spread, Some(dec!(3.50)));
        assert_eq!(snapshot.spread_display.as_deref(), Some("$3.50"));
        assert_eq!(snapshot.rows.len(), 1);
        assert_eq!(snapshot.series[0].current_display.as_deref(), Some("$75.00"));
        assert_eq!(snapshot.cycles, 1);
    }

    #[tokio::test]
    async fn test_http_failure_leaves_history_untouched() {
        let mut session = session(
            vec![
                success(dec!(75), dec!(78)),
                FetchResult::TotalFailure {
                    reason: FetchError::Http(500),
                },
            ],
            0,
        );
        session.run_cycle(CycleTrigger::Scheduled).await;
        let snapshot = session.run_cycle(CycleTrigger::Scheduled).await;

        assert_eq!(session.history().len(SeriesId::Wti), 1);
        assert_eq!(snapshot.spread, None);
        assert_eq!(snapshot.series[0].error_kind, Some("http"));
        assert_eq!(
            snapshot.latest,
            Some(FetchResult::TotalFailure {
                reason: FetchError::Http(500)
            })
        );
        assert!(snapshot
            .series
            .iter()
            .flat_map(|s| s.history.iter())
            .all(|s| s.price > Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_partial_failure_updates_one_series() {
        let mut session = session(
            vec![
                success(dec!(75), dec!(78)),
                FetchResult::PartialFailure {
                    succeeded: PriceSample::new(SeriesId::Brent, dec!(79), Utc::now()),
                    failed: SeriesId::Wti,
                    reason: FetchError::Parse("missing rate for WTI".into()),
                },
            ],
            0,
        );
        let start = Utc::now();
        session.run_cycle_at(CycleTrigger::Scheduled, start).await;
        let snapshot = session
            .run_cycle_at(CycleTrigger::Scheduled, start + ChronoDuration::seconds(60))
            .await;

        assert_eq!(session.history().len(SeriesId::Wti), 1);
        assert_eq!(session.history().len(SeriesId::Brent), 2);
        assert_eq!(snapshot.series[1].trend, Some(Trend::Up));
        assert_eq!(snapshot.series[0].error_kind, Some("parse"));
        assert!(snapshot.series[0].current.is_none());
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.rows[1].wti_price, None);
    }

    #[tokio::test]
    async fn test_cached_cycles_still_append() {
        // Within the TTL the same result is replayed and appended again
        let mut session = session(vec![success(dec!(75), dec!(78))], 60);
        let start = Utc::now();
        session.run_cycle_at(CycleTrigger::Scheduled, start).await;
        session
            .run_cycle_at(CycleTrigger::Scheduled, start + ChronoDuration::seconds(1))
            .await;

        assert_eq!(session.history().len(SeriesId::Wti), 2);
    }

    #[tokio::test]
    async fn test_manual_refresh_fetches_again() {
        let mut session = session(
            vec![success(dec!(75), dec!(78)), success(dec!(76), dec!(80))],
            60,
        );
        session.run_cycle(CycleTrigger::Scheduled).await;
        let snapshot = session.run_cycle(CycleTrigger::Manual).await;

        assert_eq!(snapshot.spread, Some(dec!(4)));
    }

    #[tokio::test]
    async fn test_seed_history_does_not_set_latest() {
        let mut session = session(vec![], 0);
        let now = Utc::now();
        session.seed_history(vec![
            (now - ChronoDuration::hours(1), success(dec!(74), dec!(77))),
            (now, success(dec!(75), dec!(78))),
        ]);

        let snapshot = session.snapshot();
        assert!(snapshot.latest.is_none());
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.series[0].change, Some(dec!(1)));
    }

    #[test]
    fn test_session_requires_symbols() {
        let source = MockPriceSource::new();
        let fetcher = CachedFetcher::new(
            Arc::new(source),
            Arc::new(ResponseCache::new(Duration::from_secs(1))),
        );
        assert!(DashboardSession::new(Arc::new(fetcher), "key", vec![], 100).is_err());
    }
}
