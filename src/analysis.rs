use chrono::NaiveDate;
use error_stack::{Report, bail};
use serde::Serialize;
use tracing::info;

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::forecast::synthesize;
use crate::indicator::rsi::Rsi;
use crate::indicator::trend::trend_score;
use crate::model::{ChartPoint, Forecast, IndicatorSeries, Phase, PriceSeries};
use crate::regime::{classify, predict_next};
use crate::waves::{WaveProjection, project};

/// Everything one pipeline run produces for a ticker.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub ticker: String,
    pub as_of: NaiveDate,
    pub trend_score: f64,
    pub avg_indicator: Option<f64>,
    pub current_phase: Phase,
    pub rule: Option<&'static str>,
    pub forecast: Forecast,
    pub label: String,
    pub waves: Option<WaveProjection>,
    pub price_data: Vec<ChartPoint>,
    pub indicator_data: Vec<ChartPoint>,
    #[serde(skip)]
    pub indicator: IndicatorSeries,
}

/// Run the full pipeline and keep every intermediate result.
pub fn run(
    ticker: &str,
    series: &PriceSeries,
    config: &AnalysisConfig,
) -> Result<Analysis, Report<AnalysisError>> {
    if series.len() < config.min_history {
        bail!(AnalysisError::InsufficientData {
            required: config.min_history,
            available: series.len(),
        });
    }
    let Some(last) = series.last() else {
        bail!(AnalysisError::EmptyForecast);
    };

    let indicator = Rsi::new(config.indicator_period)?.calculate(series);
    let score = trend_score(series.trailing(config.window));
    let classification = classify(ticker, score, series.len(), &indicator, config);
    let next_phase = predict_next(classification.phase);
    let forecast = synthesize(series, next_phase, config)?;
    let waves = project(series, &indicator);

    info!(
        ticker,
        as_of = %last.date,
        trend_score = score,
        current_phase = %classification.phase,
        predicted_phase = %next_phase,
        target_price = forecast.target_price,
        "analysis complete"
    );

    Ok(Analysis {
        ticker: ticker.to_string(),
        as_of: last.date,
        trend_score: score,
        avg_indicator: classification.avg_indicator,
        current_phase: classification.phase,
        rule: classification.rule,
        label: forecast.label(),
        forecast,
        waves,
        price_data: series.chart_points(),
        indicator_data: indicator.chart_points(),
        indicator,
    })
}

/// Forecast the next phase for `ticker` from a cleaned price series.
#[allow(dead_code)]
pub fn analyze(
    ticker: &str,
    series: &PriceSeries,
    config: &AnalysisConfig,
) -> Result<Forecast, Report<AnalysisError>> {
    run(ticker, series, config).map(|analysis| analysis.forecast)
}
