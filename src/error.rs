use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum SourceError {
    #[display("request to {source_name} failed")]
    Request { source_name: String },
    #[display("failed to parse response from {source_name}")]
    ResponseParse { source_name: String },
    #[display("no price history for {ticker}")]
    NotFound { ticker: String },
}

#[derive(Debug, Display, Error)]
pub enum SeriesError {
    #[display("malformed price entry for {date}")]
    MalformedEntry { date: String },
    #[display("duplicate price point for {date}")]
    DuplicateDate { date: String },
}

#[derive(Debug, Display, Error)]
pub enum AnalysisError {
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("cannot build forecast: price range unavailable")]
    EmptyForecast,
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("database migration failed")]
    Migration,
    #[display("failed to insert data")]
    Insert,
    #[display("failed to query data")]
    Query,
}

/// Failure of an end-to-end forecast request, tagged by the stage that failed.
///
/// The underlying `SourceError` or `AnalysisError` stays in the report and can
/// be recovered with `Report::downcast_ref`.
#[derive(Debug, Display, Error)]
pub enum PipelineError {
    #[display("price history source failed for {ticker}")]
    Upstream { ticker: String },
    #[display("analysis failed for {ticker}")]
    Analysis { ticker: String },
}
