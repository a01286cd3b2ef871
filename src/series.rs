use std::collections::BTreeMap;

use chrono::NaiveDate;
use error_stack::{Report, ResultExt, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AnalysisError, SeriesError};
use crate::model::{PricePoint, PriceSeries};

/// Minimum number of clean closes before any analysis stage runs.
pub const MIN_HISTORY: usize = 60;

/// Date-keyed closes exactly as an upstream source delivered them.
///
/// Keys are `YYYY-MM-DD` dates (a longer timestamp is accepted, its date part
/// is used). Values may be numbers, numeric strings or `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPriceHistory(pub BTreeMap<String, Value>);

impl RawPriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: impl Into<String>, price: Value) {
        self.0.insert(date.into(), price);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Clean a raw history into an ascending `PriceSeries`.
///
/// Entries with an unparseable date or a missing, non-numeric or non-positive
/// price are dropped. Fails when fewer than `min_history` points survive.
pub fn normalize(
    raw: &RawPriceHistory,
    min_history: usize,
) -> Result<PriceSeries, Report<AnalysisError>> {
    let mut cleaned: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut dropped = 0usize;

    for (key, value) in &raw.0 {
        match parse_entry(key, value) {
            Ok(point) => {
                if cleaned.insert(point.date, point.close).is_some() {
                    debug!(date = %point.date, "duplicate date in raw history, keeping latest key");
                    dropped += 1;
                }
            }
            Err(e) => {
                debug!(error = ?e, "dropping price entry");
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        warn!(
            dropped,
            kept = cleaned.len(),
            "dropped malformed price entries"
        );
    }

    if cleaned.len() < min_history {
        bail!(AnalysisError::InsufficientData {
            required: min_history,
            available: cleaned.len(),
        });
    }

    let points = cleaned
        .into_iter()
        .map(|(date, close)| PricePoint::new(date, close))
        .collect();

    PriceSeries::from_points(points).change_context(AnalysisError::InvalidParameter {
        name: "price series".into(),
    })
}

fn parse_entry(key: &str, value: &Value) -> Result<PricePoint, Report<SeriesError>> {
    let malformed = || SeriesError::MalformedEntry {
        date: key.to_string(),
    };

    let Some(date) = parse_date(key) else {
        return Err(Report::new(malformed()).attach("unparseable date"));
    };
    let Some(close) = parse_price(value) else {
        return Err(Report::new(malformed()).attach(format!("price: {value}")));
    };
    Ok(PricePoint::new(date, close))
}

fn parse_date(key: &str) -> Option<NaiveDate> {
    let key = key.trim();
    NaiveDate::parse_from_str(key, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            key.get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        })
}

fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (price.is_finite() && price > 0.0).then_some(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_ascending(days: usize) -> RawPriceHistory {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut raw = RawPriceHistory::new();
        for i in 0..days {
            let date = start + chrono::Duration::days(i as i64);
            raw.insert(date.to_string(), json!(100.0 + i as f64));
        }
        raw
    }

    #[test]
    fn normalize_orders_ascending() {
        let series = normalize(&raw_ascending(60), MIN_HISTORY).unwrap();
        assert_eq!(series.len(), 60);
        let closes = series.closes();
        assert!(closes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn normalize_drops_bad_entries() {
        let mut raw = raw_ascending(64);
        raw.insert("2024-01-01", Value::Null);
        raw.insert("2024-01-02", json!("n/a"));
        raw.insert("2024-01-03", json!(-5.0));
        raw.insert("not-a-date", json!(10.0));
        let series = normalize(&raw, MIN_HISTORY).unwrap();
        assert_eq!(series.len(), 61);
        assert_eq!(
            series.points()[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 4).unwrap()
        );
    }

    #[test]
    fn normalize_accepts_numeric_strings_and_timestamps() {
        let mut raw = raw_ascending(59);
        raw.insert("2024-06-01T00:00:00-04:00", json!("123.5"));
        let series = normalize(&raw, MIN_HISTORY).unwrap();
        assert_eq!(series.len(), 60);
        assert_eq!(series.last().unwrap().close, 123.5);
    }

    #[test]
    fn duplicate_dates_collapse_to_one_point() {
        let mut raw = raw_ascending(60);
        raw.insert("2024-01-05 00:00:00", json!(1.0));
        let series = normalize(&raw, MIN_HISTORY).unwrap();
        assert_eq!(series.len(), 60);
    }

    #[test]
    fn short_history_is_insufficient() {
        let report = normalize(&raw_ascending(40), MIN_HISTORY).unwrap_err();
        assert!(matches!(
            report.current_context(),
            AnalysisError::InsufficientData {
                required: 60,
                available: 40
            }
        ));
    }

    #[test]
    fn cleaning_below_minimum_is_insufficient() {
        let mut raw = raw_ascending(60);
        raw.insert("2024-01-10", json!(0.0));
        assert!(normalize(&raw, MIN_HISTORY).is_err());
    }
}
