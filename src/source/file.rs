use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use tracing::info;

use crate::error::SourceError;
use crate::series::RawPriceHistory;
use crate::source::PriceHistorySource;

const SOURCE_NAME: &str = "file";

enum Location {
    /// `<dir>/<TICKER>.json`
    Directory(PathBuf),
    /// One history file, whatever ticker is asked for.
    Single(PathBuf),
}

/// Reads JSON objects mapping `"YYYY-MM-DD"` to a close price.
pub struct FileSource {
    location: Location,
}

impl FileSource {
    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::Directory(dir.into()),
        }
    }

    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::Single(path.into()),
        }
    }

    fn path_for(&self, ticker: &str) -> PathBuf {
        match &self.location {
            Location::Directory(dir) => dir.join(format!("{ticker}.json")),
            Location::Single(path) => path.clone(),
        }
    }
}

impl PriceHistorySource for FileSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn fetch_history(
        &self,
        ticker: &str,
    ) -> BoxFuture<'_, Result<RawPriceHistory, Report<SourceError>>> {
        let ticker = ticker.to_owned();
        let path = self.path_for(&ticker);
        Box::pin(async move {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(Report::new(SourceError::NotFound { ticker })
                        .attach(format!("path: {}", path.display())));
                }
                Err(e) => {
                    return Err(Report::new(e)
                        .change_context(SourceError::Request {
                            source_name: SOURCE_NAME.into(),
                        })
                        .attach(format!("path: {}", path.display())));
                }
            };

            let raw = parse_history(&content, &path)?;
            info!(ticker = %ticker, path = %path.display(), entries = raw.len(), "history file loaded");
            Ok(raw)
        })
    }
}

fn parse_history(content: &str, path: &Path) -> Result<RawPriceHistory, Report<SourceError>> {
    serde_json::from_str(content)
        .change_context(SourceError::ResponseParse {
            source_name: SOURCE_NAME.into(),
        })
        .attach_with(|| format!("path: {}", path.display()))
}
