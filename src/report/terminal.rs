use tracing::{info, warn};

use crate::analysis::Analysis;
use crate::model::Phase;
use crate::report::Reporter;
use crate::storage::ForecastRecord;

pub struct TerminalReporter;

impl Reporter for TerminalReporter {
    fn report(&self, analysis: &Analysis) {
        if analysis.current_phase == Phase::Unknown {
            warn!(
                ticker = %analysis.ticker,
                "not enough indicator history to classify the current phase"
            );
        }

        info!(
            ticker = %analysis.ticker,
            as_of = %analysis.as_of,
            current_phase = %analysis.current_phase,
            rule = analysis.rule.unwrap_or("-"),
            trend_score = analysis.trend_score,
            avg_indicator = ?analysis.avg_indicator,
            "FORECAST: {}",
            analysis.label,
        );

        if let Some(waves) = &analysis.waves {
            let fifth = waves.fifth();
            info!(
                ticker = %analysis.ticker,
                anchor_date = %waves.anchor_date,
                anchor_indicator = waves.anchor_indicator,
                wave5_start = fifth.start,
                wave5_end = fifth.end,
                projection_end = ?waves.projection_end,
                "wave projection"
            );
        }
    }

    fn report_stored(&self, record: &ForecastRecord) {
        info!(
            ticker = %record.ticker,
            as_of = %record.as_of,
            current_phase = %record.current_phase,
            trend_score = record.trend_score,
            avg_indicator = ?record.avg_indicator,
            stored_at = %record.created_at,
            "FORECAST (stored): {}",
            record.forecast.label(),
        );
    }

    fn report_history(&self, ticker: &str, records: &[ForecastRecord]) {
        if records.is_empty() {
            info!(ticker, "no stored forecasts");
            return;
        }
        for record in records {
            info!(
                ticker,
                id = %record.id,
                as_of = %record.as_of,
                current_phase = %record.current_phase,
                created_at = %record.created_at,
                "{}",
                record.forecast.label(),
            );
        }
    }
}
