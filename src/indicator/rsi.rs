use error_stack::{Report, bail};

use crate::error::AnalysisError;
use crate::model::{IndicatorPoint, IndicatorSeries, PriceSeries};

pub const DEFAULT_PERIOD: usize = 14;

/// RSI over a rolling window of simple average gains and losses.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<AnalysisError>> {
        if period == 0 {
            bail!(AnalysisError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// Minimum number of prices required to produce one value.
    pub fn required_prices(&self) -> usize {
        self.period + 1
    }

    /// One value per price from index `period` onward.
    ///
    /// Returns an empty vector when there are not enough prices; callers treat
    /// that as "no data" rather than a failure.
    pub fn calculate_prices(&self, prices: &[f64]) -> Vec<f64> {
        if prices.len() < self.required_prices() {
            return Vec::new();
        }

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

        deltas
            .windows(self.period)
            .map(|window| {
                let avg_gain =
                    window.iter().map(|&d| d.max(0.0)).sum::<f64>() / self.period as f64;
                let avg_loss =
                    window.iter().map(|&d| (-d).max(0.0)).sum::<f64>() / self.period as f64;
                rsi_value(avg_gain, avg_loss)
            })
            .collect()
    }

    /// Indicator values dated by the close each one ends on.
    pub fn calculate(&self, series: &PriceSeries) -> IndicatorSeries {
        let values = self.calculate_prices(&series.closes());
        let points = series.points()[self.period.min(series.len())..]
            .iter()
            .zip(values)
            .map(|(p, value)| IndicatorPoint {
                date: p.date,
                value,
            })
            .collect();
        IndicatorSeries::new(points)
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
