use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::DateTime;
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::SourceError;
use crate::series::RawPriceHistory;
use crate::source::PriceHistorySource;

const SOURCE_NAME: &str = "yahoo";
const USER_AGENT: &str = concat!("wave-forecast/", env!("CARGO_PKG_VERSION"));

/// Daily closes from the Yahoo Finance chart endpoint.
pub struct YahooSource {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    base_url: String,
    range: String,
}

impl YahooSource {
    pub fn new(base_url: &str, range: &str, requests_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(5u32));
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            base_url: base_url.trim_end_matches('/').to_string(),
            range: range.to_string(),
        }
    }
}

impl PriceHistorySource for YahooSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn fetch_history(
        &self,
        ticker: &str,
    ) -> BoxFuture<'_, Result<RawPriceHistory, Report<SourceError>>> {
        let ticker = ticker.to_owned();
        Box::pin(async move {
            // Wait for rate limiter before making the request
            self.rate_limiter.until_ready().await;

            let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
            let params = [("range", self.range.as_str()), ("interval", "1d")];

            debug!(ticker = %ticker, url = %url, "requesting yahoo chart");

            let response = self
                .client
                .get(&url)
                .query(&params)
                .send()
                .await
                .change_context(SourceError::Request {
                    source_name: SOURCE_NAME.into(),
                })?;

            if response.status() == StatusCode::NOT_FOUND {
                return Err(Report::new(SourceError::NotFound { ticker }));
            }
            if !response.status().is_success() {
                return Err(Report::new(SourceError::Request {
                    source_name: SOURCE_NAME.into(),
                })
                .attach(format!("HTTP status: {}", response.status())));
            }

            let chart: ChartResponse =
                response
                    .json()
                    .await
                    .change_context(SourceError::ResponseParse {
                        source_name: SOURCE_NAME.into(),
                    })?;

            let raw = chart.into_raw(&ticker)?;

            info!(
                ticker = %ticker,
                range = %self.range,
                fetched = raw.len(),
                "yahoo history fetch complete"
            );

            Ok(raw)
        })
    }
}

// ── Chart response types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChartErrorBody {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds.
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl ChartResponse {
    /// Key each close by its calendar date at the exchange. Missing closes
    /// stay `null` for the normalizer to drop.
    fn into_raw(self, ticker: &str) -> Result<RawPriceHistory, Report<SourceError>> {
        if let Some(err) = self.chart.error {
            return Err(Report::new(SourceError::NotFound {
                ticker: ticker.to_string(),
            })
            .attach(format!(
                "{}: {}",
                err.code,
                err.description.unwrap_or_default()
            )));
        }

        let Some(result) = self.chart.result.and_then(|r| r.into_iter().next()) else {
            return Err(Report::new(SourceError::NotFound {
                ticker: ticker.to_string(),
            }));
        };

        let closes = result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .unwrap_or_default();

        let offset = result.meta.gmtoffset;
        let mut raw = RawPriceHistory::new();
        for (ts, close) in result.timestamp.iter().zip(closes) {
            let Some(dt) = DateTime::from_timestamp(ts.saturating_add(offset), 0) else {
                continue;
            };
            raw.insert(
                dt.date_naive().to_string(),
                close.map(Value::from).unwrap_or(Value::Null),
            );
        }

        if raw.is_empty() {
            return Err(Report::new(SourceError::NotFound {
                ticker: ticker.to_string(),
            }));
        }

        Ok(raw)
    }
}
