use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::model::{IndicatorSeries, Phase, PriceSeries};

/// Days past the last close the fifth leg is drawn to.
pub const WAVE_HORIZON_DAYS: u64 = 80;

const FIRST_LEG_SPAN: f64 = 0.2;
const SECOND_LEG_RETRACE: f64 = 0.5;
const THIRD_LEG_EXTENSION: f64 = 1.61;
const FOURTH_LEG_RETRACE: f64 = 0.38;
const FIFTH_LEG_EXTENSION: f64 = 1.38;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaveLeg {
    pub wave: Phase,
    pub start: f64,
    pub end: f64,
}

/// Five price legs projected from the momentum low.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveProjection {
    pub anchor_date: NaiveDate,
    pub anchor_indicator: f64,
    pub legs: [WaveLeg; 5],
    /// The fifth leg runs from the last observed close to this date.
    pub projection_end: Option<NaiveDate>,
}

impl WaveProjection {
    pub fn fifth(&self) -> &WaveLeg {
        &self.legs[4]
    }
}

/// Project five legs starting at the date of the lowest indicator value.
///
/// Returns `None` when the indicator is empty or its low is not a date of the
/// series.
pub fn project(series: &PriceSeries, indicator: &IndicatorSeries) -> Option<WaveProjection> {
    if indicator.is_empty() || series.is_empty() {
        return None;
    }
    let low = indicator.lowest()?;
    let start = series.position(low.date)?;
    let closes = series.closes();
    let prices = &closes[start..];

    let first_end_idx = ((prices.len() as f64 * FIRST_LEG_SPAN).round() as usize)
        .min(prices.len().saturating_sub(1));

    let w1_start = *prices.first()?;
    let w1_end = prices[first_end_idx];
    let impulse = w1_end - w1_start;
    let w2_end = w1_start + impulse * SECOND_LEG_RETRACE;
    let w3_end = w1_end + impulse * THIRD_LEG_EXTENSION;
    let advance = w3_end - w1_end;
    let w4_end = w3_end - advance * FOURTH_LEG_RETRACE;
    let w5_end = w3_end + advance * FIFTH_LEG_EXTENSION;

    let legs = [
        WaveLeg {
            wave: Phase::I,
            start: w1_start,
            end: w1_end,
        },
        WaveLeg {
            wave: Phase::II,
            start: w1_end,
            end: w2_end,
        },
        WaveLeg {
            wave: Phase::III,
            start: w2_end,
            end: w3_end,
        },
        WaveLeg {
            wave: Phase::IV,
            start: w3_end,
            end: w4_end,
        },
        WaveLeg {
            wave: Phase::V,
            start: w4_end,
            end: w5_end,
        },
    ];

    let projection_end = series
        .last()
        .and_then(|p| p.date.checked_add_days(Days::new(WAVE_HORIZON_DAYS)));

    Some(WaveProjection {
        anchor_date: low.date,
        anchor_indicator: low.value,
        legs,
        projection_end,
    })
}
