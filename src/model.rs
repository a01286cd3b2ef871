use std::fmt;

use chrono::NaiveDate;
use error_stack::{Report, bail};
use serde::{Deserialize, Serialize};

use crate::error::SeriesError;

/// One daily close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Daily closes in ascending date order with unique dates.
///
/// Every close is finite and positive. The minimum-length requirement of the
/// analysis is checked by its callers, not here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series from points in any order.
    pub fn from_points(mut points: Vec<PricePoint>) -> Result<Self, Report<SeriesError>> {
        if let Some(bad) = points
            .iter()
            .find(|p| !p.close.is_finite() || p.close <= 0.0)
        {
            bail!(SeriesError::MalformedEntry {
                date: bad.date.to_string(),
            });
        }

        points.sort_by_key(|p| p.date);
        if let Some(dup) = points.windows(2).find(|w| w[0].date == w[1].date) {
            bail!(SeriesError::DuplicateDate {
                date: dup[0].date.to_string(),
            });
        }

        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// The last `n` points (or all of them when the series is shorter).
    pub fn trailing(&self, n: usize) -> &[PricePoint] {
        let start = self.points.len().saturating_sub(n);
        &self.points[start..]
    }

    /// Position of the point dated `date`, if present.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.points.binary_search_by_key(&date, |p| p.date).ok()
    }

    pub fn chart_points(&self) -> Vec<ChartPoint> {
        self.points
            .iter()
            .map(|p| ChartPoint {
                x: p.date,
                y: p.close,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Momentum oscillator values in [0, 100], aligned to the dates they close on.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSeries {
    points: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn new(points: Vec<IndicatorPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[IndicatorPoint] {
        &self.points
    }

    /// The last `n` values (or all of them when the series is shorter).
    pub fn trailing_values(&self, n: usize) -> Vec<f64> {
        let start = self.points.len().saturating_sub(n);
        self.points[start..].iter().map(|p| p.value).collect()
    }

    /// Earliest point holding the minimum value.
    pub fn lowest(&self) -> Option<&IndicatorPoint> {
        self.points.iter().fold(None, |lowest, p| match lowest {
            Some(l) if l.value <= p.value => Some(l),
            _ => Some(p),
        })
    }

    pub fn chart_points(&self) -> Vec<ChartPoint> {
        self.points
            .iter()
            .map(|p| ChartPoint {
                x: p.date,
                y: p.value,
            })
            .collect()
    }
}

/// A `{x, y}` pair as consumed by the charting front end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub x: NaiveDate,
    pub y: f64,
}

/// Position within the five-step cycle.
///
/// `Unknown` marks a classification made without enough history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    I,
    II,
    III,
    IV,
    V,
    Unknown,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::I => "I",
            Self::II => "II",
            Self::III => "III",
            Self::IV => "IV",
            Self::V => "V",
            Self::Unknown => "Unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "I" => Some(Self::I),
            "II" => Some(Self::II),
            "III" => Some(Self::III),
            "IV" => Some(Self::IV),
            "V" => Some(Self::V),
            "Unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Projected price move for the next phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub anchor_price: f64,
    pub target_price: f64,
    pub anchor_date: NaiveDate,
    pub target_date: NaiveDate,
    pub predicted_phase: Phase,
}

impl Forecast {
    pub fn label(&self) -> String {
        format!(
            "Phase {}: {:.2} to {:.2} by {}",
            self.predicted_phase, self.anchor_price, self.target_price, self.target_date
        )
    }
}
