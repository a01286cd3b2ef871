use std::io::Write;

use serde::Serialize;

use crate::analysis::Analysis;
use crate::report::Reporter;
use crate::storage::ForecastRecord;

/// Pretty-printed JSON documents on stdout, one per report.
pub struct JsonReporter;

#[derive(Serialize)]
struct History<'a> {
    ticker: &'a str,
    forecasts: &'a [ForecastRecord],
}

impl JsonReporter {
    fn emit<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = writeln!(stdout, "{json}") {
                    tracing::warn!(error = %e, "failed to write report");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize report"),
        }
    }
}

impl Reporter for JsonReporter {
    fn report(&self, analysis: &Analysis) {
        self.emit(analysis);
    }

    fn report_stored(&self, record: &ForecastRecord) {
        self.emit(record);
    }

    fn report_history(&self, ticker: &str, records: &[ForecastRecord]) {
        self.emit(&History {
            ticker,
            forecasts: records,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Forecast, Phase};
    use chrono::{NaiveDate, Utc};

    #[test]
    fn history_document_shape() {
        let as_of = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let record = ForecastRecord {
            id: "0b6a3c9e-0000-4000-8000-000000000000".into(),
            ticker: "AAPL".into(),
            as_of,
            current_phase: Phase::III,
            trend_score: -0.01,
            avg_indicator: Some(61.0),
            forecast: Forecast {
                anchor_price: 180.0,
                target_price: 170.0,
                anchor_date: as_of,
                target_date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
                predicted_phase: Phase::IV,
            },
            created_at: Utc::now(),
        };
        let records = [record];
        let value = serde_json::to_value(History {
            ticker: "AAPL",
            forecasts: &records,
        })
        .unwrap();
        assert_eq!(value["ticker"], "AAPL");
        assert_eq!(value["forecasts"][0]["current_phase"], "III");
        assert_eq!(value["forecasts"][0]["forecast"]["target_date"], "2024-03-02");

        JsonReporter.report_history("AAPL", &records);
    }
}
