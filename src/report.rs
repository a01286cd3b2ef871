pub mod json;
pub mod terminal;

use crate::analysis::Analysis;
use crate::storage::ForecastRecord;

/// Sink for finished analyses and stored forecast history.
pub trait Reporter: Send + Sync {
    fn report(&self, analysis: &Analysis);

    /// A forecast served from the store instead of being recomputed.
    fn report_stored(&self, record: &ForecastRecord);

    fn report_history(&self, ticker: &str, records: &[ForecastRecord]);
}
