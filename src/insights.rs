use itertools::{Itertools, MinMaxResult};

use crate::dto::{
    KeyLevels, MarketInsight, ModelPaths, RiskAssessment, RiskLevel, TrendDirection, TrendInsight,
    VolatilityInsight, VolatilityLevel,
};
use crate::helpers;

const STRONG_TREND_PCT: f64 = 2.0;
const TREND_PCT: f64 = 0.5;
const HIGH_VOLATILITY_PCT: f64 = 3.0;
const MEDIUM_VOLATILITY_PCT: f64 = 1.5;
const FALLBACK_LEVEL_BAND: f64 = 0.02;
const RISK_FACTORS: [&str; 3] = ["Market uncertainty", "Economic indicators", "Technical patterns"];

/// Classify a horizon-end percent change. Thresholds are exclusive: exactly
/// `+2.0` is "Bullish", exactly `+0.5` is "Neutral".
pub fn classify_trend(change_percent: f64) -> TrendDirection {
    if change_percent > STRONG_TREND_PCT {
        TrendDirection::StronglyBullish
    } else if change_percent > TREND_PCT {
        TrendDirection::Bullish
    } else if change_percent < -STRONG_TREND_PCT {
        TrendDirection::StronglyBearish
    } else if change_percent < -TREND_PCT {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    }
}

pub fn classify_volatility(mean_abs_change_percent: f64) -> VolatilityLevel {
    if mean_abs_change_percent > HIGH_VOLATILITY_PCT {
        VolatilityLevel::High
    } else if mean_abs_change_percent > MEDIUM_VOLATILITY_PCT {
        VolatilityLevel::Medium
    } else {
        VolatilityLevel::Low
    }
}

/// Mean absolute day-over-day percent change of a path, with day 0
/// measured against the current price.
fn mean_abs_change_percent(current_price: f64, path: &[f64]) -> f64 {
    let changes: Vec<f64> = std::iter::once(current_price)
        .chain(path.iter().copied())
        .tuple_windows()
        .map(|(previous, next)| helpers::pct_change(next, previous).abs())
        .collect();
    helpers::mean(&changes) * 100.0
}

fn trend_insight(current_price: f64, ensemble: Option<&[f64]>) -> TrendInsight {
    match ensemble.and_then(|path| path.last()) {
        Some(week_end) => {
            let change_percent = helpers::pct_change(*week_end, current_price) * 100.0;
            let direction = classify_trend(change_percent);
            TrendInsight {
                direction,
                class: direction.class(),
                change_percent,
            }
        }
        None => TrendInsight {
            direction: TrendDirection::Unknown,
            class: TrendDirection::Unknown.class(),
            change_percent: 0.0,
        },
    }
}

fn volatility_insight(current_price: f64, ensemble: Option<&[f64]>) -> VolatilityInsight {
    match ensemble.filter(|path| !path.is_empty()) {
        Some(path) => {
            let value = mean_abs_change_percent(current_price, path);
            VolatilityInsight {
                level: classify_volatility(value),
                value,
            }
        }
        None => VolatilityInsight {
            level: VolatilityLevel::Unknown,
            value: 0.0,
        },
    }
}

/// Support and resistance across every model's projected prices.
fn key_levels(current_price: f64, paths: &ModelPaths) -> KeyLevels {
    match paths.values().flatten().copied().minmax() {
        MinMaxResult::MinMax(support, resistance) => KeyLevels {
            resistance,
            support,
        },
        MinMaxResult::OneElement(level) => KeyLevels {
            resistance: level,
            support: level,
        },
        MinMaxResult::NoElements => KeyLevels {
            resistance: current_price * (1.0 + FALLBACK_LEVEL_BAND),
            support: current_price * (1.0 - FALLBACK_LEVEL_BAND),
        },
    }
}

/// Derive trend, volatility, key levels and risk from the projected paths.
///
/// Trend and volatility read the ensemble path; key levels pool all models.
/// Values are unrounded.
pub fn generate_insights(current_price: f64, paths: &ModelPaths, ensemble_model: &str) -> MarketInsight {
    let ensemble = paths.get(ensemble_model).map(Vec::as_slice);

    let trend = trend_insight(current_price, ensemble);
    let volatility = volatility_insight(current_price, ensemble);
    let risk_level = if volatility.value > MEDIUM_VOLATILITY_PCT {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    MarketInsight {
        trend,
        volatility,
        key_levels: key_levels(current_price, paths),
        risk_assessment: RiskAssessment {
            level: risk_level,
            factors: RISK_FACTORS.iter().map(|factor| factor.to_string()).collect(),
        },
    }
}
