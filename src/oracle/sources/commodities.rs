//! Commodities-API REST client
//!
//! `GET /v1/latest?access_key=..&base=USD&symbols=WTI,BRENT`, answered with
//! `{ "data": { "rates": { "WTI": 75.0, ... }, "timestamp": 1700000000 } }`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::future::join_all;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

use crate::oracle::{combine_outcomes, validate_request, PriceSource};
use crate::types::{FetchError, FetchResult, PriceSample, SeriesId};

pub const COMMODITIES_API_BASE_URL: &str = "https://api.commodities-api.com/v1/latest";

type SeriesOutcome = (SeriesId, std::result::Result<PriceSample, FetchError>);

/// REST client for the Commodities-API `latest` endpoint
#[derive(Debug, Clone)]
pub struct CommoditiesApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    /// One request for all symbols instead of one per symbol
    batch_symbols: bool,
}

impl CommoditiesApiClient {
    /// Create a new client with a bounded request timeout
    pub fn new(base_url: &str, timeout: Duration, batch_symbols: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            batch_symbols,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one request for `symbols` and parse every requested rate.
    ///
    /// `Err` means the whole request failed (transport, status, body);
    /// per-series problems come back inside the vector.
    async fn request(
        &self,
        api_key: &str,
        symbols: &[SeriesId],
    ) -> std::result::Result<Vec<SeriesOutcome>, FetchError> {
        let joined = symbols
            .iter()
            .map(SeriesId::code)
            .collect::<Vec<_>>()
            .join(",");

        tracing::debug!(
            source = %"Commodities-API",
            url = %self.base_url,
            symbols = %joined,
            "Requesting latest rates"
        );

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("access_key", api_key), ("base", "USD"), ("symbols", joined.as_str())])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                source = %"Commodities-API",
                symbols = %joined,
                status = status.as_u16(),
                "Upstream returned error status"
            );
            return Err(FetchError::Http(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        parse_rates(&body, symbols, Utc::now())
    }

    fn transport_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Network(format!("request timed out after {:?}", self.timeout))
        } else {
            FetchError::from(err)
        }
    }

    async fn fetch_batched(&self, api_key: &str, symbols: &[SeriesId]) -> FetchResult {
        match self.request(api_key, symbols).await {
            Ok(outcomes) => combine_outcomes(outcomes),
            Err(reason) => FetchResult::TotalFailure { reason },
        }
    }

    /// One request per series. A series missing from its own 2xx response
    /// fails alone; any failed request fails the whole cycle.
    async fn fetch_per_symbol(&self, api_key: &str, symbols: &[SeriesId]) -> FetchResult {
        let requests = symbols.iter().map(|&series| async move {
            (series, self.request(api_key, &[series]).await)
        });

        let mut outcomes: Vec<SeriesOutcome> = Vec::with_capacity(symbols.len());
        let mut request_failures: Vec<(SeriesId, FetchError)> = Vec::new();
        for (series, response) in join_all(requests).await {
            match response {
                Ok(mut parsed) => outcomes.push(parsed.pop().unwrap_or_else(|| {
                    (
                        series,
                        Err(FetchError::Parse(format!("no rate for {}", series))),
                    )
                })),
                Err(reason) => request_failures.push((series, reason)),
            }
        }

        if request_failures.is_empty() {
            return combine_outcomes(outcomes);
        }

        request_failures.sort_by_key(|(series, _)| *series);
        let summary: Vec<String> = request_failures
            .iter()
            .map(|(series, reason)| format!("{}: {}", series, reason))
            .collect();
        tracing::warn!(
            source = %"Commodities-API",
            failures = %summary.join(", "),
            discarded = outcomes.len(),
            "Per-symbol request failed, discarding cycle"
        );

        let (_, reason) = request_failures.remove(0);
        FetchResult::TotalFailure { reason }
    }
}

#[async_trait]
impl PriceSource for CommoditiesApiClient {
    fn name(&self) -> &'static str {
        "Commodities-API"
    }

    fn endpoint(&self) -> String {
        self.base_url.clone()
    }

    async fn fetch(&self, api_key: &str, symbols: &[SeriesId]) -> FetchResult {
        let symbols = match validate_request(api_key, symbols) {
            Ok(symbols) => symbols,
            Err(reason) => return FetchResult::TotalFailure { reason },
        };

        let result = if self.batch_symbols {
            self.fetch_batched(api_key, &symbols).await
        } else {
            self.fetch_per_symbol(api_key, &symbols).await
        };

        if let FetchResult::TotalFailure { reason } = &result {
            tracing::warn!(
                source = %"Commodities-API",
                kind = reason.kind(),
                error = %reason,
                "Fetch failed"
            );
        }

        result
    }
}

/// Parse a `latest` response body into one outcome per requested series.
///
/// A body that is not JSON or lacks `data.rates` fails the whole request. A
/// missing, non-numeric or non-positive rate fails only its own series.
/// `data.timestamp` (unix seconds) stamps the samples when present,
/// otherwise `fetched_at` does.
pub fn parse_rates(
    body: &str,
    symbols: &[SeriesId],
    fetched_at: DateTime<Utc>,
) -> std::result::Result<Vec<SeriesOutcome>, FetchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Parse(format!("invalid JSON body: {}", e)))?;

    let data = value
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::Parse("missing `data` object".to_string()))?;

    let rates = match data.get("rates").and_then(Value::as_object) {
        Some(rates) => rates,
        None => {
            let upstream = data
                .get("error")
                .map(|e| format!(" (upstream error: {})", e))
                .unwrap_or_default();
            return Err(FetchError::Parse(format!(
                "missing `data.rates` object{}",
                upstream
            )));
        }
    };

    let observed_at = data
        .get("timestamp")
        .and_then(Value::as_i64)
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or(fetched_at);

    Ok(symbols
        .iter()
        .map(|&series| {
            let outcome = rates
                .get(series.code())
                .ok_or_else(|| FetchError::Parse(format!("missing rate for {}", series)))
                .and_then(parse_price)
                .map(|price| PriceSample::new(series, price, observed_at));
            (series, outcome)
        })
        .collect())
}

fn parse_price(value: &Value) -> std::result::Result<Decimal, FetchError> {
    let number = match value {
        Value::Number(n) => n,
        other => return Err(FetchError::Parse(format!("rate is not a number: {}", other))),
    };
    let text = number.to_string();
    let price = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| FetchError::Parse(format!("rate {} out of range: {}", text, e)))?;

    if price <= Decimal::ZERO {
        return Err(FetchError::Parse(format!("non-positive rate {}", price)));
    }
    Ok(price)
}
