mod analysis;
mod config;
mod error;
mod forecast;
mod indicator;
mod model;
mod pipeline;
mod regime;
mod report;
mod series;
mod source;
mod storage;
mod waves;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::{AnalysisConfig, AppConfig, SourceConfig};
use error::PipelineError;
use pipeline::TickerForecast;
use report::Reporter;
use report::json::JsonReporter;
use report::terminal::TerminalReporter;
use source::PriceHistorySource;
use source::file::FileSource;
use source::yahoo::YahooSource;
use storage::sqlite::SqliteStorage;
use storage::Storage;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("forecast failed for {failed} of {total} tickers")]
    Forecast { failed: usize, total: usize },
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(
    name = "wave-forecast",
    about = "Momentum and trend phase forecaster for daily price series"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify the current phase and forecast the next one
    Analyze {
        #[arg(required = true)]
        tickers: Vec<String>,
        /// Read a single JSON history (date -> close) instead of the configured source
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Replace a stored forecast for the same as-of date
        #[arg(long)]
        refresh: bool,
    },
    /// List stored forecasts for a ticker
    History {
        ticker: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    init_tracing(&config);

    let storage = open_storage(&config).await?;

    match cli.command {
        Command::Analyze {
            tickers,
            file,
            format,
            refresh,
        } => {
            let source: Arc<dyn PriceHistorySource> = match file {
                Some(path) => Arc::new(FileSource::single(path)),
                None => build_source(&config.source),
            };
            analyze_tickers(
                tickers,
                source,
                storage,
                build_reporter(format),
                Arc::new(config.analysis),
                refresh,
            )
            .await
        }
        Command::History {
            ticker,
            limit,
            format,
        } => {
            let Some(storage) = storage else {
                return Err(Report::new(AppError::Config)
                    .attach("history needs storage.enabled = true"));
            };
            let ticker = normalize_ticker(&ticker);
            let records = storage
                .list_forecasts(&ticker, limit)
                .await
                .change_context(AppError::Storage)?;
            build_reporter(format).report_history(&ticker, &records);
            Ok(())
        }
    }
}

/// A missing file at the default path falls back to built-in defaults.
fn load_config(path: &str) -> Result<AppConfig, Report<AppError>> {
    if path == DEFAULT_CONFIG_PATH && !Path::new(path).exists() {
        return Ok(AppConfig::default());
    }
    config::load(Path::new(path)).change_context(AppError::Config)
}

fn init_tracing(config: &AppConfig) {
    // stdout carries JSON reports; logs go to stderr
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

async fn open_storage(config: &AppConfig) -> Result<Option<Arc<dyn Storage>>, Report<AppError>> {
    if !config.storage.enabled {
        debug!("storage disabled");
        return Ok(None);
    }

    let data_dir = &config.general.data_dir;
    std::fs::create_dir_all(data_dir)
        .change_context(AppError::Storage)
        .attach_with(|| format!("data_dir: {data_dir}"))?;

    let db_path = format!("{data_dir}/wave-forecast.db");
    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::open(Path::new(&db_path))
            .await
            .change_context(AppError::Storage)?,
    );
    Ok(Some(storage))
}

fn build_source(config: &SourceConfig) -> Arc<dyn PriceHistorySource> {
    match (config.kind.as_str(), &config.path) {
        ("file", Some(dir)) => Arc::new(FileSource::directory(dir)),
        _ => Arc::new(YahooSource::new(
            &config.base_url,
            &config.range,
            config.requests_per_second,
        )),
    }
}

fn build_reporter(format: OutputFormat) -> Arc<dyn Reporter> {
    match format {
        OutputFormat::Text => Arc::new(TerminalReporter),
        OutputFormat::Json => Arc::new(JsonReporter),
    }
}

fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

async fn analyze_tickers(
    tickers: Vec<String>,
    source: Arc<dyn PriceHistorySource>,
    storage: Option<Arc<dyn Storage>>,
    reporter: Arc<dyn Reporter>,
    config: Arc<AnalysisConfig>,
    refresh: bool,
) -> Result<(), Report<AppError>> {
    let tickers = normalize_tickers(&tickers);
    let total = tickers.len();

    // ── Shutdown ──────────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl+c received, cancelling remaining tickers");
                cancel.cancel();
            }
        })
    };

    // ── Per-ticker jobs ───────────────────────────────────────────────────────
    // The source rate-limits internally, so every ticker is spawned at once.
    let mut handles = Vec::with_capacity(total);
    for ticker in tickers {
        let source = Arc::clone(&source);
        let storage = storage.clone();
        let reporter = Arc::clone(&reporter);
        let config = Arc::clone(&config);
        let cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(ticker = %ticker, "cancelled");
                    false
                }
                result = process_ticker(
                    source.as_ref(),
                    storage.as_deref(),
                    &ticker,
                    &config,
                    refresh,
                ) => match result {
                    Ok(TickerForecast::Computed(analysis)) => {
                        reporter.report(&analysis);
                        true
                    }
                    Ok(TickerForecast::Stored(record)) => {
                        reporter.report_stored(&record);
                        true
                    }
                    Err(e) => {
                        tracing::error!(ticker = %ticker, error = ?e, "forecast failed");
                        false
                    }
                },
            }
        });
        handles.push(handle);
    }

    let mut failed = 0;
    for handle in handles {
        if !handle.await.change_context(AppError::Runtime)? {
            failed += 1;
        }
    }
    ctrl_c.abort();

    info!(total, failed, "batch complete");

    if failed > 0 {
        bail!(AppError::Forecast { failed, total });
    }
    Ok(())
}

/// Forecast one ticker, through the store when storage is on.
async fn process_ticker(
    source: &dyn PriceHistorySource,
    storage: Option<&dyn Storage>,
    ticker: &str,
    config: &AnalysisConfig,
    refresh: bool,
) -> Result<TickerForecast, Report<PipelineError>> {
    match storage {
        Some(storage) => {
            pipeline::forecast_with_store(source, storage, ticker, config, refresh).await
        }
        None => pipeline::forecast_ticker(source, ticker, config)
            .await
            .map(|(_, analysis)| TickerForecast::Computed(Box::new(analysis))),
    }
}

/// Trim, upper-case and de-duplicate tickers, keeping them sorted.
fn normalize_tickers(tickers: &[String]) -> Vec<String> {
    let mut tickers: Vec<String> = tickers
        .iter()
        .map(|t| normalize_ticker(t))
        .filter(|t| !t.is_empty())
        .collect();
    tickers.sort();
    tickers.dedup();
    tickers
}
