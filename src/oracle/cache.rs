//! Response cache for price fetches
//!
//! Results are kept for a short TTL per request key so a dashboard that
//! re-renders or polls quickly does not hammer the upstream API. Each key has
//! its own async lock: concurrent misses for the same key wait for a single
//! upstream call, while different keys never block each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use crate::oracle::{normalize_symbols, validate_symbols, PriceSource};
use crate::types::{FetchError, FetchResult, SeriesId};

/// Cache key: endpoint, credentials and the normalized symbol set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub endpoint: String,
    pub api_key: String,
    pub symbols: Vec<SeriesId>,
}

impl RequestKey {
    pub fn new(endpoint: impl Into<String>, api_key: &str, symbols: &[SeriesId]) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.to_string(),
            symbols: normalize_symbols(symbols),
        }
    }
}

/// Whether a result came from the cache or from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

#[derive(Debug, Clone)]
struct CachedEntry {
    result: FetchResult,
    fetched_at: Instant,
}

type Slot = Arc<AsyncMutex<Option<CachedEntry>>>;

/// Entries this close to expiry count as expired, absorbing scheduler jitter
/// between a poll tick and the lookup it triggers
const EXPIRY_SLACK: Duration = Duration::from_millis(500);

/// Process-wide TTL cache of fetch results
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    slots: Mutex<HashMap<RequestKey, Slot>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self, key: &RequestKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots.entry(key.clone()).or_default().clone()
    }

    fn existing_slots(&self) -> Vec<Slot> {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots.values().cloned().collect()
    }

    fn is_fresh(&self, entry: &CachedEntry) -> bool {
        entry.fetched_at.elapsed() + EXPIRY_SLACK < self.ttl
    }

    /// Return the cached result for `key` if still fresh, otherwise run
    /// `fetch` and store its result.
    ///
    /// Entries are stamped when the upstream call starts, so a poll interval
    /// equal to the TTL always finds the previous entry expired.
    pub async fn get_or_fetch<F, Fut>(&self, key: &RequestKey, fetch: F) -> (FetchResult, CacheStatus)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = FetchResult>,
    {
        let slot = self.slot(key);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if self.is_fresh(cached) {
                return (cached.result.clone(), CacheStatus::Hit);
            }
        }

        let started = Instant::now();
        let result = fetch().await;
        *entry = Some(CachedEntry {
            result: result.clone(),
            fetched_at: started,
        });
        (result, CacheStatus::Miss)
    }

    /// Run `fetch` regardless of freshness and store its result.
    ///
    /// Holds the key's lock, so it never overlaps another fetch of the
    /// same key.
    pub async fn fetch_fresh<F, Fut>(&self, key: &RequestKey, fetch: F) -> FetchResult
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = FetchResult>,
    {
        let slot = self.slot(key);
        let mut entry = slot.lock().await;

        let started = Instant::now();
        let result = fetch().await;
        *entry = Some(CachedEntry {
            result: result.clone(),
            fetched_at: started,
        });
        result
    }

    /// Drop the entry for one key, waiting for an in-flight fetch of it
    pub async fn invalidate(&self, key: &RequestKey) {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            slots.get(key).cloned()
        };
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }

    /// Drop every entry
    pub async fn clear(&self) {
        for slot in self.existing_slots() {
            *slot.lock().await = None;
        }
    }

    /// Number of keys holding a result (a key being filled counts)
    pub fn len(&self) -> usize {
        self.existing_slots()
            .iter()
            .filter(|slot| slot.try_lock().map_or(true, |entry| entry.is_some()))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A price source behind the response cache
pub struct CachedFetcher {
    source: Arc<dyn PriceSource>,
    cache: Arc<ResponseCache>,
    /// Retry once when the first attempt fails at the transport level
    retry_on_network: bool,
}

impl CachedFetcher {
    pub fn new(source: Arc<dyn PriceSource>, cache: Arc<ResponseCache>) -> Self {
        Self {
            source,
            cache,
            retry_on_network: false,
        }
    }

    pub fn with_network_retry(mut self, enabled: bool) -> Self {
        self.retry_on_network = enabled;
        self
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn key(&self, api_key: &str, symbols: &[SeriesId]) -> RequestKey {
        RequestKey::new(self.source.endpoint(), api_key, symbols)
    }

    /// Fetch through the cache
    pub async fn fetch(&self, api_key: &str, symbols: &[SeriesId]) -> (FetchResult, CacheStatus) {
        if let Err(reason) = validate_symbols(symbols) {
            return (FetchResult::TotalFailure { reason }, CacheStatus::Bypass);
        }
        let key = self.key(api_key, symbols);
        let (result, status) = self
            .cache
            .get_or_fetch(&key, || self.fetch_uncached(api_key, &key.symbols))
            .await;

        tracing::debug!(
            source = %self.source.name(),
            cache = ?status,
            status = result.status_label(),
            "Fetch completed"
        );
        (result, status)
    }

    /// Fetch fresh data and replace the cached entry (manual refresh)
    pub async fn refresh(&self, api_key: &str, symbols: &[SeriesId]) -> (FetchResult, CacheStatus) {
        if let Err(reason) = validate_symbols(symbols) {
            return (FetchResult::TotalFailure { reason }, CacheStatus::Bypass);
        }
        let key = self.key(api_key, symbols);
        tracing::info!(source = %self.source.name(), "Manual refresh, bypassing cache");

        let result = self
            .cache
            .fetch_fresh(&key, || self.fetch_uncached(api_key, &key.symbols))
            .await;
        (result, CacheStatus::Bypass)
    }

    async fn fetch_uncached(&self, api_key: &str, symbols: &[SeriesId]) -> FetchResult {
        let result = self.source.fetch(api_key, symbols).await;

        match &result {
            FetchResult::TotalFailure {
                reason: FetchError::Network(error),
            } if self.retry_on_network => {
                tracing::warn!(
                    source = %self.source.name(),
                    error = %error,
                    "Network failure, retrying once"
                );
                self.source.fetch(api_key, symbols).await
            }
            _ => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::SlowSource;
    use crate::oracle::MockPriceSource;
    use crate::types::PriceSample;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BOTH: [SeriesId; 2] = [SeriesId::Wti, SeriesId::Brent];

    fn success() -> FetchResult {
        FetchResult::Success {
            wti: PriceSample::new(SeriesId::Wti, dec!(75), Utc::now()),
            brent: PriceSample::new(SeriesId::Brent, dec!(78.5), Utc::now()),
        }
    }

    fn mock_source(calls: usize, result: FetchResult) -> MockPriceSource {
        let mut source = MockPriceSource::new();
        source.expect_name().return_const("Mock");
        source
            .expect_endpoint()
            .returning(|| "http://mock/v1/latest".to_string());
        source
            .expect_fetch()
            .times(calls)
            .returning(move |_, _| result.clone());
        source
    }

    fn fetcher(source: MockPriceSource, ttl_secs: u64) -> CachedFetcher {
        CachedFetcher::new(
            Arc::new(source),
            Arc::new(ResponseCache::new(Duration::from_secs(ttl_secs))),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_fetch_within_ttl_is_cached() {
        let fetcher = fetcher(mock_source(1, success()), 60);

        let (_, first) = fetcher.fetch("key", &BOTH).await;
        tokio::time::advance(Duration::from_secs(59)).await;
        let (result, second) = fetcher.fetch("key", &[SeriesId::Brent, SeriesId::Wti]).await;

        assert_eq!(first, CacheStatus::Miss);
        assert_eq!(second, CacheStatus::Hit);
        assert!(result.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_refetches() {
        let fetcher = fetcher(mock_source(2, success()), 60);

        fetcher.fetch("key", &BOTH).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        let (_, status) = fetcher.fetch("key", &BOTH).await;

        assert_eq!(status, CacheStatus::Miss);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_bypasses_cache() {
        let fetcher = fetcher(mock_source(2, success()), 60);

        fetcher.fetch("key", &BOTH).await;
        let (_, status) = fetcher.refresh("key", &BOTH).await;

        assert_eq!(status, CacheStatus::Bypass);
    }

    #[tokio::test]
    async fn test_keys_are_scoped_by_api_key_and_symbols() {
        let fetcher = fetcher(mock_source(3, success()), 60);

        fetcher.fetch("key-a", &BOTH).await;
        fetcher.fetch("key-b", &BOTH).await;
        fetcher.fetch("key-a", &[SeriesId::Wti]).await;

        assert_eq!(fetcher.cache().len(), 3);
    }

    #[tokio::test]
    async fn test_failures_are_cached_too() {
        let failure = FetchResult::TotalFailure {
            reason: FetchError::Http(500),
        };
        let fetcher = fetcher(mock_source(1, failure.clone()), 60);

        fetcher.fetch("key", &BOTH).await;
        let (result, status) = fetcher.fetch("key", &BOTH).await;

        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(result, failure);
    }

    #[tokio::test]
    async fn test_network_failure_retried_once() {
        let failure = FetchResult::TotalFailure {
            reason: FetchError::Network("connection refused".into()),
        };
        let fetcher = fetcher(mock_source(2, failure), 60).with_network_retry(true);

        let (result, _) = fetcher.fetch("key", &BOTH).await;
        assert_eq!(result.failure(SeriesId::Wti).map(|e| e.kind()), Some("network"));
    }

    #[tokio::test]
    async fn test_empty_symbols_skip_source() {
        let fetcher = fetcher(mock_source(0, success()), 60);
        let (result, status) = fetcher.fetch("key", &[]).await;

        assert_eq!(status, CacheStatus::Bypass);
        assert!(matches!(
            result,
            FetchResult::TotalFailure {
                reason: FetchError::InvalidRequest(_)
            }
        ));
        assert!(fetcher.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_age_counts_from_fetch_start() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(300)));
        let fetcher = CachedFetcher::new(
            source.clone(),
            Arc::new(ResponseCache::new(Duration::from_secs(60))),
        );

        let (_, first) = fetcher.fetch("key", &BOTH).await;
        // One full TTL after the first call started
        tokio::time::advance(Duration::from_millis(59_700)).await;
        let (_, second) = fetcher.fetch("key", &BOTH).await;

        assert_eq!(first, CacheStatus::Miss);
        assert_eq!(second, CacheStatus::Miss);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_waits_for_in_flight_fetch() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(300)));
        let fetcher = CachedFetcher::new(
            source.clone(),
            Arc::new(ResponseCache::new(Duration::from_secs(60))),
        );

        let (polled, refreshed) = tokio::join!(
            fetcher.fetch("key", &BOTH),
            fetcher.refresh("key", &BOTH)
        );

        assert_eq!(refreshed.1, CacheStatus::Bypass);
        // Whichever runs second waits for the first; a poll after the
        // refresh is served from its fresh entry
        let expected_calls = if polled.1 == CacheStatus::Miss { 2 } else { 1 };
        assert_eq!(source.calls(), expected_calls);
        assert_eq!(source.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_and_clear_drop_entries() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(10)));
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60)));
        let fetcher = CachedFetcher::new(source.clone(), cache.clone());

        fetcher.fetch("key-a", &BOTH).await;
        fetcher.fetch("key-b", &BOTH).await;
        assert_eq!(cache.len(), 2);

        cache.invalidate(&fetcher.key("key-a", &BOTH)).await;
        assert_eq!(cache.len(), 1);
        let (_, status) = fetcher.fetch("key-a", &BOTH).await;
        assert_eq!(status, CacheStatus::Miss);

        cache.clear().await;
        assert!(cache.is_empty());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let key = RequestKey::new("endpoint", "key", &BOTH);
        let calls = AtomicUsize::new(0);

        let calls_ref = &calls;
        let fetch = move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            success()
        };

        let (a, b) = tokio::join!(cache.get_or_fetch(&key, fetch), cache.get_or_fetch(&key, fetch));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(a.0.is_success() && b.0.is_success());
        assert_ne!(a.1, b.1);
    }
}
