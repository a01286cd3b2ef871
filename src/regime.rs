use tracing::debug;

use crate::config::AnalysisConfig;
use crate::indicator::mean;
use crate::model::{IndicatorSeries, Phase};

/// Trend score beyond which a move counts as strong, in either direction.
pub const STRONG_TREND_THRESHOLD: f64 = 0.002;
/// Average momentum above this is overbought.
pub const OVERBOUGHT: f64 = 55.0;
/// Average momentum below this is oversold.
pub const OVERSOLD: f64 = 45.0;

/// Boolean readings the rule chain decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signals {
    pub strong_up: bool,
    pub strong_down: bool,
    pub overbought: bool,
    pub oversold: bool,
}

impl Signals {
    pub fn evaluate(trend_score: f64, avg_indicator: f64, config: &AnalysisConfig) -> Self {
        Self {
            strong_up: trend_score > config.strong_trend_threshold,
            strong_down: trend_score < -config.strong_trend_threshold,
            overbought: avg_indicator > config.overbought,
            oversold: avg_indicator < config.oversold,
        }
    }
}

struct Rule {
    name: &'static str,
    applies: fn(&Signals) -> bool,
    phase: Phase,
}

// Evaluated top to bottom; the first match wins. Rules 1 and 2 overlap on
// strong-up + oversold, as do 3 and 4 on strong-down + overbought.
const RULES: &[Rule] = &[
    Rule {
        name: "strong_up_oversold",
        applies: |s| s.strong_up && s.oversold,
        phase: Phase::III,
    },
    Rule {
        name: "strong_up_not_overbought",
        applies: |s| s.strong_up && !s.overbought,
        phase: Phase::V,
    },
    Rule {
        name: "strong_down_overbought",
        applies: |s| s.strong_down && s.overbought,
        phase: Phase::IV,
    },
    Rule {
        name: "strong_down_not_oversold",
        applies: |s| s.strong_down && !s.oversold,
        phase: Phase::II,
    },
];

/// Outcome of one classification call.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub phase: Phase,
    /// Mean of the trailing indicator window; `None` when history was short.
    pub avg_indicator: Option<f64>,
    /// Name of the rule that fired; `None` for the default and for `Unknown`.
    pub rule: Option<&'static str>,
}

/// Run the rule chain, falling back to `Phase::I`.
pub fn resolve(signals: &Signals) -> (Phase, Option<&'static str>) {
    RULES
        .iter()
        .find(|rule| (rule.applies)(signals))
        .map_or((Phase::I, None), |rule| (rule.phase, Some(rule.name)))
}

/// Classify the current phase from the trend score and momentum history.
///
/// Returns `Phase::Unknown` when fewer than `min_history` prices or fewer than
/// `window` indicator values are available.
pub fn classify(
    ticker: &str,
    trend_score: f64,
    price_count: usize,
    indicator: &IndicatorSeries,
    config: &AnalysisConfig,
) -> Classification {
    if price_count < config.min_history || indicator.len() < config.window {
        debug!(
            ticker,
            price_count,
            indicator_count = indicator.len(),
            "not enough history to classify"
        );
        return Classification {
            phase: Phase::Unknown,
            avg_indicator: None,
            rule: None,
        };
    }

    let Some(avg_indicator) = mean(&indicator.trailing_values(config.window)) else {
        return Classification {
            phase: Phase::Unknown,
            avg_indicator: None,
            rule: None,
        };
    };

    let signals = Signals::evaluate(trend_score, avg_indicator, config);
    let (phase, rule) = resolve(&signals);

    debug!(
        ticker,
        trend_score,
        avg_indicator,
        ?signals,
        phase = %phase,
        rule = rule.unwrap_or("default"),
        "phase classified"
    );

    Classification {
        phase,
        avg_indicator: Some(avg_indicator),
        rule,
    }
}

/// Cyclic successor: I -> II -> III -> IV -> V -> I. `Unknown` restarts at I.
pub fn predict_next(phase: Phase) -> Phase {
    match phase {
        Phase::I => Phase::II,
        Phase::II => Phase::III,
        Phase::III => Phase::IV,
        Phase::IV => Phase::V,
        Phase::V => Phase::I,
        Phase::Unknown => Phase::I,
    }
}
