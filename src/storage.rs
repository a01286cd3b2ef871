pub mod sqlite;

use chrono::{DateTime, NaiveDate, Utc};
use error_stack::Report;
use futures::future::BoxFuture;
use serde::Serialize;
use uuid::Uuid;

use crate::analysis::Analysis;
use crate::error::StorageError;
use crate::model::{Forecast, Phase, PriceSeries};

/// A persisted analysis result, one per (ticker, as-of date).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRecord {
    pub id: String,
    pub ticker: String,
    pub as_of: NaiveDate,
    pub current_phase: Phase,
    pub trend_score: f64,
    pub avg_indicator: Option<f64>,
    pub forecast: Forecast,
    pub created_at: DateTime<Utc>,
}

impl ForecastRecord {
    pub fn from_analysis(analysis: &Analysis) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ticker: analysis.ticker.clone(),
            as_of: analysis.as_of,
            current_phase: analysis.current_phase,
            trend_score: analysis.trend_score,
            avg_indicator: analysis.avg_indicator,
            forecast: analysis.forecast.clone(),
            created_at: Utc::now(),
        }
    }
}

pub trait Storage: Send + Sync {
    /// Insert or replace the closes of `series` under `ticker`.
    fn upsert_prices(
        &self,
        ticker: &str,
        series: &PriceSeries,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    /// The latest `limit` stored closes for `ticker`, oldest first.
    fn load_prices(
        &self,
        ticker: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<PriceSeries, Report<StorageError>>>;

    /// Store a forecast, replacing any earlier one with the same ticker and as-of date.
    fn save_forecast(
        &self,
        record: &ForecastRecord,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    fn find_forecast(
        &self,
        ticker: &str,
        as_of: NaiveDate,
    ) -> BoxFuture<'_, Result<Option<ForecastRecord>, Report<StorageError>>>;

    /// Most recent forecasts for `ticker`, newest as-of date first.
    fn list_forecasts(
        &self,
        ticker: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<ForecastRecord>, Report<StorageError>>>;
}
