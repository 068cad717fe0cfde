use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Name of the combined model whose path averages the other generators.
pub const ENSEMBLE_MODEL: &str = "ensemble";

/// Daily OHLCV observation consumed by the pipeline.
///
/// * `date` is the trading day (ISO `YYYY-MM-DD` on the wire).
/// * `volume` is optional upstream; a missing or `null` value is read as `0.0`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, deserialize_with = "volume_or_zero")]
    pub volume: f64,
}

fn volume_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// Price history plus the scalar current price handed over by the
/// data-acquisition collaborator.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub current_price: Option<f64>,
    pub history: Vec<PriceRecord>,
}

/// Column identifiers of a [`FeatureRow`].
///
/// Serialized with the indicator names used in the market-data artifacts
/// (e.g. `"sma_20"`, `"price_change_5d"`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureColumn {
    #[serde(rename = "close")]
    Close,
    #[serde(rename = "volume")]
    Volume,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "sma_5")]
    Sma5,
    #[serde(rename = "sma_20")]
    Sma20,
    #[serde(rename = "sma_50")]
    Sma50,
    #[serde(rename = "rsi")]
    Rsi,
    #[serde(rename = "macd")]
    Macd,
    #[serde(rename = "macd_signal")]
    MacdSignal,
    #[serde(rename = "volatility")]
    Volatility,
    #[serde(rename = "price_change_1d")]
    PriceChange1d,
    #[serde(rename = "price_change_5d")]
    PriceChange5d,
    #[serde(rename = "price_change_20d")]
    PriceChange20d,
}

impl FeatureColumn {
    /// Raw OHLCV columns that are always part of the feature matrix.
    pub const BASE: [FeatureColumn; 5] = [
        FeatureColumn::Close,
        FeatureColumn::Volume,
        FeatureColumn::High,
        FeatureColumn::Low,
        FeatureColumn::Open,
    ];

    /// Indicator columns appended to the base set by default.
    pub const INDICATORS: [FeatureColumn; 5] = [
        FeatureColumn::Sma5,
        FeatureColumn::Sma20,
        FeatureColumn::Rsi,
        FeatureColumn::Macd,
        FeatureColumn::Volatility,
    ];
}

/// One row of derived features. Values that need more trailing history than
/// is available are `0.0`, never NaN.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureRow {
    pub date: Option<NaiveDate>,
    pub close: f64,
    pub volume: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub sma_5: f64,
    pub sma_20: f64,
    pub sma_50: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub volatility: f64,
    pub price_change_1d: f64,
    pub price_change_5d: f64,
    pub price_change_20d: f64,
}

impl FeatureRow {
    pub fn value(&self, column: FeatureColumn) -> f64 {
        match column {
            FeatureColumn::Close => self.close,
            FeatureColumn::Volume => self.volume,
            FeatureColumn::High => self.high,
            FeatureColumn::Low => self.low,
            FeatureColumn::Open => self.open,
            FeatureColumn::Sma5 => self.sma_5,
            FeatureColumn::Sma20 => self.sma_20,
            FeatureColumn::Sma50 => self.sma_50,
            FeatureColumn::Rsi => self.rsi,
            FeatureColumn::Macd => self.macd,
            FeatureColumn::MacdSignal => self.macd_signal,
            FeatureColumn::Volatility => self.volatility,
            FeatureColumn::PriceChange1d => self.price_change_1d,
            FeatureColumn::PriceChange5d => self.price_change_5d,
            FeatureColumn::PriceChange20d => self.price_change_20d,
        }
    }
}

/// Min-max scaled feature matrix, fitted on the batch it was built from.
///
/// `rows[r][c]` is the scaled value of `columns[c]` on day `r`; every value
/// lies in `[0.0, 1.0]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedFeatureMatrix {
    pub columns: Vec<FeatureColumn>,
    pub rows: Vec<Vec<f64>>,
}

impl NormalizedFeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Trailing `length` rows used as the input window of a sequence model.
    /// Returns fewer rows when the matrix is shorter than `length`.
    pub fn last_sequence(&self, length: usize) -> &[Vec<f64>] {
        let start = self.rows.len().saturating_sub(length);
        &self.rows[start..]
    }
}

/// Model name → projected price per forecast day.
pub type ModelPaths = BTreeMap<String, Vec<f64>>;

/// Per-model calibration of a projected path.
///
/// * `confidence_scores` are percentages in `[0, 100]`, non-increasing with the day index.
/// * `lower_bounds[i] <= price[i] <= upper_bounds[i]` for every day.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceEntry {
    pub confidence_scores: Vec<f64>,
    pub lower_bounds: Vec<f64>,
    pub upper_bounds: Vec<f64>,
    pub avg_confidence: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrendDirection {
    #[serde(rename = "Strongly Bullish")]
    StronglyBullish,
    Bullish,
    Neutral,
    Bearish,
    #[serde(rename = "Strongly Bearish")]
    StronglyBearish,
    Unknown,
}

impl TrendDirection {
    pub fn class(self) -> TrendClass {
        match self {
            TrendDirection::StronglyBullish | TrendDirection::Bullish => TrendClass::Bullish,
            TrendDirection::StronglyBearish | TrendDirection::Bearish => TrendClass::Bearish,
            TrendDirection::Neutral | TrendDirection::Unknown => TrendClass::Neutral,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TrendDirection::StronglyBullish => "Strongly Bullish",
            TrendDirection::Bullish => "Bullish",
            TrendDirection::Neutral => "Neutral",
            TrendDirection::Bearish => "Bearish",
            TrendDirection::StronglyBearish => "Strongly Bearish",
            TrendDirection::Unknown => "Unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrendClass {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum VolatilityLevel {
    High,
    Medium,
    Low,
    Unknown,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskLevel {
    Medium,
    Low,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrendInsight {
    pub direction: TrendDirection,
    pub class: TrendClass,
    pub change_percent: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VolatilityInsight {
    pub level: VolatilityLevel,
    pub value: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeyLevels {
    pub resistance: f64,
    pub support: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub factors: Vec<String>,
}

/// Trend, volatility, key levels and risk derived from the projected paths.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MarketInsight {
    pub trend: TrendInsight,
    pub volatility: VolatilityInsight,
    pub key_levels: KeyLevels,
    pub risk_assessment: RiskAssessment,
}

/// Yesterday's one-day-ahead ensemble prediction scored against today's price.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRecord {
    pub date: NaiveDate,
    pub yesterday_pred: f64,
    pub today_actual: f64,
    pub mae: f64,
    pub mape: f64,
}

/// Naive one-step baseline point: `predicted` is the previous day's close.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BacktestPoint {
    pub date: NaiveDate,
    pub predicted: f64,
    pub actual: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ForecastPredictions {
    pub dates: Vec<NaiveDate>,
    pub models: ModelPaths,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ForecastMetadata {
    pub features_used: usize,
    pub data_points: usize,
    pub prediction_date: String,
}

/// Output of one pipeline run. Numeric fields are already rounded for
/// presentation; the next run supersedes the whole record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ForecastRecord {
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub forecast_horizon: usize,
    pub predictions: ForecastPredictions,
    pub confidence: BTreeMap<String, ConfidenceEntry>,
    pub insights: MarketInsight,
    pub model_performance: BTreeMap<String, f64>,
    pub metadata: ForecastMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationRecord>,
    #[serde(default)]
    pub prediction_vs_actual: Vec<BacktestPoint>,
}

impl ForecastRecord {
    pub fn ensemble_path(&self) -> Option<&[f64]> {
        self.predictions
            .models
            .get(ENSEMBLE_MODEL)
            .map(Vec::as_slice)
            .filter(|path| !path.is_empty())
    }

    pub fn first_forecast_date(&self) -> Option<NaiveDate> {
        self.predictions.dates.first().copied()
    }
}

#[derive(Debug, Error, PartialEq)]
/// Errors returned while preparing features or assembling a forecast.
pub enum PredictionError {
    #[error("insufficient price history: need {required} points, got {available}")]
    InsufficientHistory { required: usize, available: usize },
    #[error("no usable feature columns in price history")]
    NoFeaturesAvailable,
    #[error("no market data available")]
    NoData,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("time conversion failed")]
    TimeConversion,
    #[error("invalid price: {0}")]
    InvalidPrice(String),
    #[error("failed to (de)serialize: {0}")]
    Serialization(String),
    #[error("i/o failure: {0}")]
    Io(String),
}
