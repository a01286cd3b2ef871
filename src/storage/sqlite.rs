use chrono::{DateTime, NaiveDate, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;
use crate::model::{Forecast, Phase, PricePoint, PriceSeries};
use crate::storage::{ForecastRecord, Storage};

type ForecastRow = (
    String,
    String,
    String,
    String,
    String,
    f64,
    Option<f64>,
    f64,
    f64,
    String,
    String,
);

const FORECAST_COLUMNS: &str = "id, ticker, as_of, current_phase, predicted_phase, trend_score, \
     avg_indicator, anchor_price, target_price, target_date, created_at";

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Migration)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool })
    }
}

impl Storage for SqliteStorage {
    fn upsert_prices(
        &self,
        ticker: &str,
        series: &PriceSeries,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let ticker = ticker.to_string();
        let points = series.points().to_vec();
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .change_context(StorageError::Insert)?;

            for p in &points {
                sqlx::query(
                    "INSERT OR REPLACE INTO price_points (ticker, date, close) VALUES (?, ?, ?)",
                )
                .bind(&ticker)
                .bind(p.date.to_string())
                .bind(p.close)
                .execute(&mut *tx)
                .await
                .change_context(StorageError::Insert)?;
            }

            tx.commit().await.change_context(StorageError::Insert)?;
            Ok(())
        })
    }

    fn load_prices(
        &self,
        ticker: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<PriceSeries, Report<StorageError>>> {
        let ticker = ticker.to_string();
        Box::pin(async move {
            let rows: Vec<(String, f64)> = sqlx::query_as(
                "SELECT date, close FROM \
                 (SELECT date, close FROM price_points WHERE ticker = ? \
                  ORDER BY date DESC LIMIT ?) \
                 ORDER BY date ASC",
            )
            .bind(&ticker)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            let points = rows
                .into_iter()
                .map(|(date, close)| Ok(PricePoint::new(parse_date(&date)?, close)))
                .collect::<Result<Vec<_>, Report<StorageError>>>()?;

            PriceSeries::from_points(points)
                .change_context(StorageError::Query)
                .attach_with(|| format!("ticker: {ticker}"))
        })
    }

    fn save_forecast(
        &self,
        record: &ForecastRecord,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let record = record.clone();
        Box::pin(async move {
            // The id of an existing row is kept on conflict.
            sqlx::query(
                "INSERT INTO forecasts \
                 (id, ticker, as_of, current_phase, predicted_phase, trend_score, \
                  avg_indicator, anchor_price, target_price, target_date, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (ticker, as_of) DO UPDATE SET \
                  current_phase = excluded.current_phase, \
                  predicted_phase = excluded.predicted_phase, \
                  trend_score = excluded.trend_score, \
                  avg_indicator = excluded.avg_indicator, \
                  anchor_price = excluded.anchor_price, \
                  target_price = excluded.target_price, \
                  target_date = excluded.target_date, \
                  created_at = excluded.created_at",
            )
            .bind(&record.id)
            .bind(&record.ticker)
            .bind(record.as_of.to_string())
            .bind(record.current_phase.as_str())
            .bind(record.forecast.predicted_phase.as_str())
            .bind(record.trend_score)
            .bind(record.avg_indicator)
            .bind(record.forecast.anchor_price)
            .bind(record.forecast.target_price)
            .bind(record.forecast.target_date.to_string())
            .bind(record.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .change_context(StorageError::Insert)
            .attach_with(|| format!("ticker: {}, as_of: {}", record.ticker, record.as_of))?;

            Ok(())
        })
    }

    fn find_forecast(
        &self,
        ticker: &str,
        as_of: NaiveDate,
    ) -> BoxFuture<'_, Result<Option<ForecastRecord>, Report<StorageError>>> {
        let ticker = ticker.to_string();
        Box::pin(async move {
            let row: Option<ForecastRow> = sqlx::query_as(&format!(
                "SELECT {FORECAST_COLUMNS} FROM forecasts WHERE ticker = ? AND as_of = ? LIMIT 1"
            ))
            .bind(&ticker)
            .bind(as_of.to_string())
            .fetch_optional(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            row.map(map_forecast_row).transpose()
        })
    }

    fn list_forecasts(
        &self,
        ticker: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<ForecastRecord>, Report<StorageError>>> {
        let ticker = ticker.to_string();
        Box::pin(async move {
            let rows: Vec<ForecastRow> = sqlx::query_as(&format!(
                "SELECT {FORECAST_COLUMNS} FROM forecasts WHERE ticker = ? \
                 ORDER BY as_of DESC LIMIT ?"
            ))
            .bind(&ticker)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            rows.into_iter().map(map_forecast_row).collect()
        })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, Report<StorageError>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .change_context(StorageError::Query)
        .attach_with(|| format!("stored date: {s}"))
}

fn parse_phase(s: &str) -> Result<Phase, Report<StorageError>> {
    Phase::from_str(s)
        .ok_or_else(|| Report::new(StorageError::Query).attach(format!("stored phase: {s}")))
}

fn map_forecast_row(row: ForecastRow) -> Result<ForecastRecord, Report<StorageError>> {
    let (
        id,
        ticker,
        as_of,
        current_phase,
        predicted_phase,
        trend_score,
        avg_indicator,
        anchor_price,
        target_price,
        target_date,
        created_at,
    ) = row;

    let as_of = parse_date(&as_of)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .change_context(StorageError::Query)
        .attach_with(|| format!("stored timestamp: {created_at}"))?;

    Ok(ForecastRecord {
        id,
        ticker,
        as_of,
        current_phase: parse_phase(&current_phase)?,
        trend_score,
        avg_indicator,
        forecast: Forecast {
            anchor_price,
            target_price,
            anchor_date: as_of,
            target_date: parse_date(&target_date)?,
            predicted_phase: parse_phase(&predicted_phase)?,
        },
        created_at,
    })
}
