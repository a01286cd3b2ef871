use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::forecast::{DOWNTREND_RATIO, HORIZON_DAYS, UPTREND_RATIO};
use crate::indicator::rsi::DEFAULT_PERIOD;
use crate::indicator::trend::TREND_WINDOW;
use crate::regime::{OVERBOUGHT, OVERSOLD, STRONG_TREND_THRESHOLD};
use crate::series::MIN_HISTORY;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_source_kind() -> String {
    "yahoo".into()
}

fn default_base_url() -> String {
    "https://query1.finance.yahoo.com".into()
}

fn default_range() -> String {
    "1y".into()
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            data_dir: default_data_dir(),
        }
    }
}

/// Heuristic parameters of the forecasting pipeline.
///
/// Every field defaults to the named constant next to the stage that uses it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub min_history: usize,
    pub window: usize,
    pub indicator_period: usize,
    pub strong_trend_threshold: f64,
    pub overbought: f64,
    pub oversold: f64,
    pub uptrend_ratio: f64,
    pub downtrend_ratio: f64,
    pub horizon_days: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_history: MIN_HISTORY,
            window: TREND_WINDOW,
            indicator_period: DEFAULT_PERIOD,
            strong_trend_threshold: STRONG_TREND_THRESHOLD,
            overbought: OVERBOUGHT,
            oversold: OVERSOLD,
            uptrend_ratio: UPTREND_RATIO,
            downtrend_ratio: DOWNTREND_RATIO,
            horizon_days: HORIZON_DAYS,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    /// Accepted values: `"yahoo"` | `"file"`
    #[serde(default = "default_source_kind")]
    pub kind: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_range")]
    pub range: String,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    /// Directory holding `<TICKER>.json` histories, for `kind = "file"`.
    pub path: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            base_url: default_base_url(),
            range: default_range(),
            requests_per_second: default_requests_per_second(),
            path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];
const VALID_SOURCE_KINDS: &[&str] = &["yahoo", "file"];

pub fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(&config.general)?;
    validate_analysis(&config.analysis)?;
    validate_source(&config.source)?;
    Ok(())
}

fn invalid(field: impl Into<String>) -> Report<ConfigError> {
    Report::new(ConfigError::Validation {
        field: field.into(),
    })
}

fn validate_general(general: &GeneralConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_LOG_FORMATS.contains(&general.log_format.as_str()) {
        return Err(invalid(format!(
            "general.log_format \"{}\" is not valid",
            general.log_format
        )));
    }
    Ok(())
}

fn validate_analysis(analysis: &AnalysisConfig) -> Result<(), Report<ConfigError>> {
    if analysis.indicator_period == 0 {
        return Err(invalid("analysis.indicator_period must be > 0"));
    }
    if analysis.window < 2 {
        return Err(invalid("analysis.window must be >= 2"));
    }
    if analysis.window > analysis.min_history {
        return Err(invalid(format!(
            "analysis.window ({}) must not exceed analysis.min_history ({})",
            analysis.window, analysis.min_history
        )));
    }
    if analysis.oversold >= analysis.overbought {
        return Err(invalid(format!(
            "analysis.oversold ({}) must be below analysis.overbought ({})",
            analysis.oversold, analysis.overbought
        )));
    }
    if !(0.0..=100.0).contains(&analysis.oversold) || !(0.0..=100.0).contains(&analysis.overbought)
    {
        return Err(invalid("analysis.oversold/overbought must lie in [0, 100]"));
    }
    if analysis.strong_trend_threshold < 0.0 {
        return Err(invalid("analysis.strong_trend_threshold must be >= 0"));
    }
    for (name, ratio) in [
        ("uptrend_ratio", analysis.uptrend_ratio),
        ("downtrend_ratio", analysis.downtrend_ratio),
    ] {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(invalid(format!("analysis.{name} must lie in (0, 1)")));
        }
    }
    // the synthesizer projects upward only for ratios above one half
    if analysis.uptrend_ratio <= 0.5 {
        return Err(invalid(format!(
            "analysis.uptrend_ratio ({}) must be above 0.5",
            analysis.uptrend_ratio
        )));
    }
    if analysis.downtrend_ratio > 0.5 {
        return Err(invalid(format!(
            "analysis.downtrend_ratio ({}) must not exceed 0.5",
            analysis.downtrend_ratio
        )));
    }
    if analysis.horizon_days == 0 {
        return Err(invalid("analysis.horizon_days must be > 0"));
    }
    Ok(())
}

fn validate_source(source: &SourceConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_SOURCE_KINDS.contains(&source.kind.as_str()) {
        return Err(invalid(format!(
            "source.kind \"{}\" is not valid",
            source.kind
        )));
    }
    if source.requests_per_second == 0 {
        return Err(invalid("source.requests_per_second must be > 0"));
    }
    if source.kind == "file" && source.path.is_none() {
        return Err(invalid("source.path is required for kind \"file\""));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"
data_dir = "/tmp/data"

[analysis]
window = 50
indicator_period = 10
horizon_days = 45

[source]
kind = "file"
path = "./prices"

[storage]
enabled = false
"#;
        let config = parse(toml);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.analysis.window, 50);
        assert_eq!(config.analysis.indicator_period, 10);
        assert_eq!(config.analysis.horizon_days, 45);
        // untouched keys keep their defaults
        assert_eq!(config.analysis.overbought, OVERBOUGHT);
        assert_eq!(config.source.path.as_deref(), Some("./prices"));
        assert!(!config.storage.enabled);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn defaults_applied_when_fields_omitted() {
        let config = parse("");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.general.data_dir, "./data");
        assert_eq!(config.analysis, AnalysisConfig::default());
        assert_eq!(config.analysis.min_history, 60);
        assert_eq!(config.analysis.window, 60);
        assert_eq!(config.analysis.indicator_period, 14);
        assert_eq!(config.analysis.horizon_days, 30);
        assert_eq!(config.source.kind, "yahoo");
        assert!(config.storage.enabled);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn inverted_momentum_bounds_rejected() {
        let config = parse(
            r#"
[analysis]
overbought = 40.0
oversold = 60.0
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn window_larger_than_min_history_rejected() {
        let config = parse(
            r#"
[analysis]
window = 90
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn ratio_outside_unit_interval_rejected() {
        let config = parse(
            r#"
[analysis]
uptrend_ratio = 1.5
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn ratio_on_wrong_side_of_half_rejected() {
        for table in [
            "[analysis]\nuptrend_ratio = 0.4\n",
            "[analysis]\nuptrend_ratio = 0.5\n",
            "[analysis]\ndowntrend_ratio = 0.7\n",
        ] {
            let config = parse(table);
            assert!(validate(&config).is_err(), "accepted: {table}");
        }

        let config = parse("[analysis]\nuptrend_ratio = 0.7\ndowntrend_ratio = 0.5\n");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn unknown_source_kind_rejected() {
        let config = parse(
            r#"
[source]
kind = "bloomberg"
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn file_source_requires_path() {
        let config = parse(
            r#"
[source]
kind = "file"
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_log_format_rejected() {
        let config = parse(
            r#"
[general]
log_format = "xml"
"#,
        );
        assert!(validate(&config).is_err());
    }
}
