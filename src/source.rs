pub mod file;
pub mod yahoo;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::SourceError;
use crate::series::RawPriceHistory;

/// Upstream collaborator that supplies daily closes for a ticker.
///
/// Uses `BoxFuture` instead of `async fn` in trait to keep the trait
/// object-safe (`dyn PriceHistorySource`). Failures are reported as-is;
/// retrying is up to the implementation.
pub trait PriceHistorySource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the raw date -> close mapping for `ticker`.
    fn fetch_history(
        &self,
        ticker: &str,
    ) -> BoxFuture<'_, Result<RawPriceHistory, Report<SourceError>>>;
}
