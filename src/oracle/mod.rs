//! Oracle module - crude price fetching
//!
//! A [`PriceSource`] answers one `fetch(api_key, symbols)` call with a
//! [`FetchResult`]. Sources never return `Err`: every failure is carried as a
//! typed reason inside the result so a dashboard can show it. The
//! [`CachedFetcher`] in front of a source debounces rapid refreshes.

mod cache;
pub mod sources;

pub use cache::{CacheStatus, CachedFetcher, RequestKey, ResponseCache};
pub use sources::{CommoditiesApiClient, SyntheticParams, SyntheticSource};

use async_trait::async_trait;

use crate::types::{FetchError, FetchResult, PriceSample, SeriesId};

/// Trait for crude price sources
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Endpoint identity used to scope cache keys
    fn endpoint(&self) -> String {
        self.name().to_string()
    }

    /// Fetch the latest price of each requested series
    async fn fetch(&self, api_key: &str, symbols: &[SeriesId]) -> FetchResult;
}

/// Sorted, de-duplicated symbol set
pub fn normalize_symbols(symbols: &[SeriesId]) -> Vec<SeriesId> {
    let mut out = symbols.to_vec();
    out.sort();
    out.dedup();
    out
}

/// Check the request preconditions before touching the network
pub fn validate_request(api_key: &str, symbols: &[SeriesId]) -> Result<Vec<SeriesId>, FetchError> {
    if api_key.trim().is_empty() {
        return Err(FetchError::InvalidRequest("API key is empty".to_string()));
    }
    validate_symbols(symbols)
}

pub(crate) fn validate_symbols(symbols: &[SeriesId]) -> Result<Vec<SeriesId>, FetchError> {
    let symbols = normalize_symbols(symbols);
    if symbols.is_empty() {
        return Err(FetchError::InvalidRequest("no symbols requested".to_string()));
    }
    Ok(symbols)
}

/// Fold per-series outcomes into a single [`FetchResult`].
///
/// `outcomes` must hold one entry per requested series. When every series
/// failed, the first failure in series order (WTI before Brent) becomes the
/// total-failure reason.
pub fn combine_outcomes(
    mut outcomes: Vec<(SeriesId, Result<PriceSample, FetchError>)>,
) -> FetchResult {
    outcomes.sort_by_key(|(series, _)| *series);

    let mut succeeded: Vec<PriceSample> = Vec::new();
    let mut failed: Vec<(SeriesId, FetchError)> = Vec::new();
    for (series, outcome) in outcomes {
        match outcome {
            Ok(sample) => succeeded.push(sample),
            Err(reason) => failed.push((series, reason)),
        }
    }

    if succeeded.is_empty() && failed.len() > 1 {
        let summary: Vec<String> = failed
            .iter()
            .map(|(series, reason)| format!("{}: {}", series, reason))
            .collect();
        tracing::warn!(failures = %summary.join(", "), "All series failed");
    }

    let mut ok = succeeded.into_iter();
    let mut failures = failed.into_iter();
    match (ok.next(), ok.next(), failures.next()) {
        (Some(wti), Some(brent), None) => FetchResult::Success { wti, brent },
        (Some(sample), None, None) => FetchResult::Single(sample),
        (Some(succeeded), None, Some((failed, reason))) => FetchResult::PartialFailure {
            succeeded,
            failed,
            reason,
        },
        (None, _, Some((_, reason))) => FetchResult::TotalFailure { reason },
        _ => FetchResult::TotalFailure {
            reason: FetchError::InvalidRequest("unexpected series set".to_string()),
        },
    }
}
