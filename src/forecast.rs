use chrono::Days;
use error_stack::{Report, bail};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::indicator::trend::trend_score;
use crate::model::{Forecast, Phase, PriceSeries};

/// Share of the trailing range projected when the trend is up.
pub const UPTREND_RATIO: f64 = 0.618;
/// Share of the trailing range projected when the trend is flat or down.
pub const DOWNTREND_RATIO: f64 = 0.382;
/// Calendar days between the last observation and the target date.
pub const HORIZON_DAYS: u32 = 30;

/// Project the next move from the trailing window of `series`.
///
/// The projected delta is the window's price range scaled by the up- or
/// down-trend ratio; ratios above one half project upward, the others
/// downward.
pub fn synthesize(
    series: &PriceSeries,
    predicted_phase: Phase,
    config: &AnalysisConfig,
) -> Result<Forecast, Report<AnalysisError>> {
    let window = series.trailing(config.window);
    if window.len() < config.window {
        bail!(AnalysisError::EmptyForecast);
    }
    let Some(last) = window.last() else {
        bail!(AnalysisError::EmptyForecast);
    };

    let (min, max) = window
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.close), hi.max(p.close))
        });
    let price_range = max - min;

    let trend_factor = if trend_score(window) > 0.0 {
        config.uptrend_ratio
    } else {
        config.downtrend_ratio
    };
    let predicted_delta = price_range * trend_factor;
    let target_price = if trend_factor > 0.5 {
        last.close + predicted_delta
    } else {
        last.close - predicted_delta
    };

    let Some(target_date) = last
        .date
        .checked_add_days(Days::new(u64::from(config.horizon_days)))
    else {
        bail!(AnalysisError::InvalidParameter {
            name: format!("horizon_days {} overflows the calendar", config.horizon_days),
        });
    };

    debug!(
        price_range,
        trend_factor,
        target_price,
        target_date = %target_date,
        "forecast synthesized"
    );

    Ok(Forecast {
        anchor_price: last.close,
        target_price,
        anchor_date: last.date,
        target_date,
        predicted_phase,
    })
}
