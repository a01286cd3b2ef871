use error_stack::{Report, ResultExt};
use tracing::{debug, info, warn};

use crate::analysis::{self, Analysis};
use crate::config::AnalysisConfig;
use crate::error::PipelineError;
use crate::model::PriceSeries;
use crate::series::normalize;
use crate::source::PriceHistorySource;
use crate::storage::{ForecastRecord, Storage};

/// Most recent stored closes analyzed when the source is unreachable.
///
/// About one year of trading days, the default fetch range.
pub const STORED_HISTORY_LIMIT: usize = 260;

/// What a stored run produced for one ticker.
#[derive(Debug)]
pub enum TickerForecast {
    /// Freshly analyzed and saved.
    Computed(Box<Analysis>),
    /// Already stored for this (ticker, as-of date) and served as-is.
    Stored(ForecastRecord),
}

/// Fetch and clean the history of one ticker.
///
/// A failing fetch is tagged `Upstream`, a history that does not clean into
/// `min_history` closes is tagged `Analysis`.
pub async fn fetch_series(
    source: &dyn PriceHistorySource,
    ticker: &str,
    config: &AnalysisConfig,
) -> Result<PriceSeries, Report<PipelineError>> {
    info!(ticker, source = source.name(), "fetching price history");

    let raw = source
        .fetch_history(ticker)
        .await
        .change_context(PipelineError::Upstream {
            ticker: ticker.to_string(),
        })?;

    normalize(&raw, config.min_history).change_context(PipelineError::Analysis {
        ticker: ticker.to_string(),
    })
}

/// Fetch, clean and analyze one ticker.
///
/// A failing fetch is tagged `Upstream`; everything after it, including a
/// history too short to analyze, is tagged `Analysis`. The cleaned series is
/// returned next to the result so callers can persist it.
pub async fn forecast_ticker(
    source: &dyn PriceHistorySource,
    ticker: &str,
    config: &AnalysisConfig,
) -> Result<(PriceSeries, Analysis), Report<PipelineError>> {
    let series = fetch_series(source, ticker, config).await?;
    let analysis = analysis::run(ticker, &series, config).change_context(PipelineError::Analysis {
        ticker: ticker.to_string(),
    })?;
    Ok((series, analysis))
}

/// Forecast one ticker against the store.
///
/// Fetched closes are upserted. When the fetch fails, the latest stored closes
/// are analyzed instead if there are at least `min_history` of them. A
/// forecast already stored for the as-of date is served unless `refresh`;
/// every computed forecast is saved, so the store always holds what was
/// reported.
pub async fn forecast_with_store(
    source: &dyn PriceHistorySource,
    storage: &dyn Storage,
    ticker: &str,
    config: &AnalysisConfig,
    refresh: bool,
) -> Result<TickerForecast, Report<PipelineError>> {
    let series = match fetch_series(source, ticker, config).await {
        Ok(series) => {
            if let Err(e) = storage.upsert_prices(ticker, &series).await {
                warn!(ticker, error = ?e, "failed to store prices");
            }
            series
        }
        Err(report) if matches!(report.current_context(), PipelineError::Upstream { .. }) => {
            stored_series(storage, ticker, config, report).await?
        }
        Err(report) => return Err(report),
    };

    if !refresh && let Some(last) = series.last() {
        match storage.find_forecast(ticker, last.date).await {
            Ok(Some(record)) => {
                debug!(ticker, as_of = %last.date, id = %record.id, "serving stored forecast");
                return Ok(TickerForecast::Stored(record));
            }
            Ok(None) => {}
            Err(e) => warn!(ticker, error = ?e, "forecast lookup failed"),
        }
    }

    let analysis = analysis::run(ticker, &series, config).change_context(PipelineError::Analysis {
        ticker: ticker.to_string(),
    })?;

    if let Err(e) = storage
        .save_forecast(&ForecastRecord::from_analysis(&analysis))
        .await
    {
        warn!(ticker, error = ?e, "failed to store forecast");
    }

    Ok(TickerForecast::Computed(Box::new(analysis)))
}

/// Stored closes to fall back on, or the upstream failure when there are too few.
async fn stored_series(
    storage: &dyn Storage,
    ticker: &str,
    config: &AnalysisConfig,
    upstream: Report<PipelineError>,
) -> Result<PriceSeries, Report<PipelineError>> {
    let stored = match storage.load_prices(ticker, STORED_HISTORY_LIMIT).await {
        Ok(series) => series,
        Err(e) => {
            warn!(ticker, error = ?e, "failed to load stored prices");
            return Err(upstream);
        }
    };

    if stored.is_empty() {
        debug!(ticker, "no stored prices to fall back on");
        return Err(upstream);
    }
    if stored.len() < config.min_history {
        warn!(
            ticker,
            stored = stored.len(),
            required = config.min_history,
            "too few stored prices to fall back on"
        );
        return Err(upstream);
    }

    warn!(
        ticker,
        stored = stored.len(),
        error = ?upstream,
        "upstream fetch failed, analyzing stored prices"
    );
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AnalysisError, SourceError};
    use crate::model::{Phase, PricePoint};
    use crate::series::RawPriceHistory;
    use crate::storage::sqlite::SqliteStorage;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use futures::future::BoxFuture;
    use serde_json::json;

    enum StubSource {
        Fails,
        Returns(RawPriceHistory),
    }

    impl PriceHistorySource for StubSource {
        fn name(&self) -> &str {
            "stub"
        }

        fn fetch_history(
            &self,
            ticker: &str,
        ) -> BoxFuture<'_, Result<RawPriceHistory, Report<SourceError>>> {
            let ticker = ticker.to_owned();
            Box::pin(async move {
                match self {
                    StubSource::Fails => Err(Report::new(SourceError::Request {
                        source_name: format!("stub for {ticker}"),
                    })),
                    StubSource::Returns(raw) => Ok(raw.clone()),
                }
            })
        }
    }

    fn day(offset: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + chrono::Duration::days(offset as i64)
    }

    fn raw_closes(closes: impl IntoIterator<Item = f64>) -> RawPriceHistory {
        let mut raw = RawPriceHistory::new();
        for (i, close) in closes.into_iter().enumerate() {
            raw.insert(day(i).to_string(), json!(close));
        }
        raw
    }

    fn linear(from: f64, to: f64, len: usize) -> Vec<f64> {
        let step = (to - from) / (len - 1) as f64;
        (0..len).map(|i| from + step * i as f64).collect()
    }

    fn series_of(closes: &[f64]) -> PriceSeries {
        PriceSeries::from_points(
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| PricePoint::new(day(i), c))
                .collect(),
        )
        .unwrap()
    }

    async fn scratch_storage() -> (SqliteStorage, PathBuf) {
        let dir = std::env::temp_dir().join(format!("wave-forecast-{}", uuid::Uuid::new_v4()));
        let storage = SqliteStorage::open(&dir.join("forecast.db")).await.unwrap();
        (storage, dir)
    }

    fn computed(outcome: TickerForecast) -> Analysis {
        match outcome {
            TickerForecast::Computed(analysis) => *analysis,
            TickerForecast::Stored(record) => panic!("expected a computed forecast, got {record:?}"),
        }
    }

    #[tokio::test]
    async fn upstream_failure_is_tagged_upstream() {
        let report = forecast_ticker(&StubSource::Fails, "ERR", &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            report.current_context(),
            PipelineError::Upstream { ticker } if ticker == "ERR"
        ));
        assert!(report.downcast_ref::<SourceError>().is_some());
    }

    #[tokio::test]
    async fn short_history_is_tagged_analysis() {
        let source = StubSource::Returns(raw_closes((0..30).map(|i| 10.0 + i as f64)));
        let report = forecast_ticker(&source, "SHORT", &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            report.current_context(),
            PipelineError::Analysis { .. }
        ));
        assert!(matches!(
            report.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::InsufficientData {
                required: 60,
                available: 30
            })
        ));
    }

    #[tokio::test]
    async fn malformed_entries_are_dropped_before_analysis() {
        let mut raw = raw_closes((0..90).map(|i| 100.0 + i as f64 * 0.5));
        raw.insert("not-a-date", json!(12.0));
        raw.insert("2023-12-31", json!(null));
        raw.insert("2023-12-30", json!(-4.0));

        let (series, analysis) =
            forecast_ticker(&StubSource::Returns(raw), "CLEAN", &AnalysisConfig::default())
                .await
                .unwrap();
        assert_eq!(series.len(), 90);
        assert_eq!(analysis.ticker, "CLEAN");
        assert_eq!(analysis.current_phase, Phase::I);
        assert_eq!(analysis.forecast.predicted_phase, Phase::II);
    }

    #[tokio::test]
    async fn stored_forecast_is_served_for_same_as_of() {
        let (storage, dir) = scratch_storage().await;
        let config = AnalysisConfig::default();

        let first = StubSource::Returns(raw_closes(linear(100.0, 145.0, 90)));
        let fresh = computed(
            forecast_with_store(&first, &storage, "AAPL", &config, false)
                .await
                .unwrap(),
        );

        // same last date, different closes
        let second = StubSource::Returns(raw_closes(linear(100.0, 200.0, 90)));
        let outcome = forecast_with_store(&second, &storage, "AAPL", &config, false)
            .await
            .unwrap();
        let TickerForecast::Stored(record) = outcome else {
            panic!("expected the stored forecast");
        };
        assert_eq!(record.as_of, day(89));
        assert_eq!(record.forecast, fresh.forecast);

        let stored = storage.find_forecast("AAPL", day(89)).await.unwrap().unwrap();
        assert_eq!(stored.forecast.target_price, record.forecast.target_price);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn refresh_recomputes_and_replaces_stored_forecast() {
        let (storage, dir) = scratch_storage().await;
        let config = AnalysisConfig::default();

        let first = StubSource::Returns(raw_closes(linear(100.0, 145.0, 90)));
        let old = computed(
            forecast_with_store(&first, &storage, "AAPL", &config, false)
                .await
                .unwrap(),
        );

        let second = StubSource::Returns(raw_closes(linear(100.0, 200.0, 90)));
        let new = computed(
            forecast_with_store(&second, &storage, "AAPL", &config, true)
                .await
                .unwrap(),
        );
        assert!(new.forecast.target_price > old.forecast.target_price);

        let listed = storage.list_forecasts("AAPL", 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].forecast, new.forecast);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn upstream_failure_falls_back_to_stored_prices() {
        let (storage, dir) = scratch_storage().await;
        storage
            .upsert_prices("MSFT", &series_of(&linear(300.0, 330.0, 90)))
            .await
            .unwrap();

        let analysis = computed(
            forecast_with_store(
                &StubSource::Fails,
                &storage,
                "MSFT",
                &AnalysisConfig::default(),
                false,
            )
            .await
            .unwrap(),
        );
        assert_eq!(analysis.as_of, day(89));
        assert_eq!(analysis.price_data.len(), 90);
        assert!(storage.find_forecast("MSFT", day(89)).await.unwrap().is_some());
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn too_few_stored_prices_keep_upstream_failure() {
        let (storage, dir) = scratch_storage().await;
        storage
            .upsert_prices("MSFT", &series_of(&linear(300.0, 330.0, 30)))
            .await
            .unwrap();
        let config = AnalysisConfig::default();

        for ticker in ["MSFT", "NONE"] {
            let report = forecast_with_store(&StubSource::Fails, &storage, ticker, &config, false)
                .await
                .unwrap_err();
            assert!(matches!(
                report.current_context(),
                PipelineError::Upstream { .. }
            ));
        }
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn fetched_prices_are_stored() {
        let (storage, dir) = scratch_storage().await;
        let source = StubSource::Returns(raw_closes(linear(10.0, 20.0, 70)));
        forecast_with_store(&source, &storage, "IBM", &AnalysisConfig::default(), false)
            .await
            .unwrap();

        let stored = storage.load_prices("IBM", STORED_HISTORY_LIMIT).await.unwrap();
        assert_eq!(stored.len(), 70);
        std::fs::remove_dir_all(dir).ok();
    }
}
