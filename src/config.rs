use std::collections::BTreeMap;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::dto::{FeatureColumn, PredictionError};

const MAX_RETENTION_DAYS: i64 = 36_500;

/// Tunables of a forecast run.
///
/// Every field has a default, so a TOML file only needs the keys it
/// overrides:
///
/// ```toml
/// horizon = 5
/// base_volatility = 0.015
///
/// [model_accuracies]
/// ensemble = 93.0
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum number of daily records required, and the model input window.
    pub sequence_length: usize,
    /// Number of forecast days per model.
    pub horizon: usize,
    /// Daily volatility the simulated generators scale their noise from.
    pub base_volatility: f64,
    /// Geometric per-day decay applied to the base accuracy.
    pub confidence_decay: f64,
    /// Base accuracy for models missing from `model_accuracies`.
    pub default_accuracy: f64,
    /// Static per-model base accuracy (percent).
    pub model_accuracies: BTreeMap<String, f64>,
    /// Number of trailing days stitched into the backtest series.
    pub backtest_window: usize,
    /// Floor for the MAPE denominator.
    pub mape_epsilon: f64,
    /// Columns of the normalized feature matrix, appended after the OHLCV
    /// base columns, which are always present.
    pub feature_columns: Vec<FeatureColumn>,
    /// Days of history kept in the performance log.
    pub performance_retention_days: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let model_accuracies = [
            ("bi_gru", 87.5),
            ("tcn", 85.2),
            ("transformer", 89.1),
            ("ensemble", 91.8),
        ]
        .into_iter()
        .map(|(name, accuracy)| (name.to_string(), accuracy))
        .collect();

        let feature_columns = FeatureColumn::BASE
            .into_iter()
            .chain(FeatureColumn::INDICATORS)
            .collect();

        Self {
            sequence_length: 60,
            horizon: 7,
            base_volatility: 0.02,
            confidence_decay: 0.95,
            default_accuracy: 85.0,
            model_accuracies,
            backtest_window: 30,
            mape_epsilon: 1e-6,
            feature_columns,
            performance_retention_days: 30,
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document, filling absent keys from [`Default`].
    pub fn from_toml_str(source: &str) -> Result<Self, PredictionError> {
        let config: PipelineConfig = toml::from_str(source)
            .map_err(|err| PredictionError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PredictionError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|err| PredictionError::Io(format!("{}: {}", path.display(), err)))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), PredictionError> {
        if self.sequence_length == 0 {
            return Err(PredictionError::InvalidConfig(
                "sequence_length must be positive".to_string(),
            ));
        }
        if self.horizon == 0 {
            return Err(PredictionError::InvalidConfig(
                "horizon must be positive".to_string(),
            ));
        }
        if !self.base_volatility.is_finite() || self.base_volatility < 0.0 {
            return Err(PredictionError::InvalidConfig(format!(
                "base_volatility must be a non-negative number, got {}",
                self.base_volatility
            )));
        }
        if !(self.confidence_decay > 0.0 && self.confidence_decay <= 1.0) {
            return Err(PredictionError::InvalidConfig(format!(
                "confidence_decay must lie in (0, 1], got {}",
                self.confidence_decay
            )));
        }
        let accuracies = std::iter::once(("default", self.default_accuracy)).chain(
            self.model_accuracies
                .iter()
                .map(|(name, accuracy)| (name.as_str(), *accuracy)),
        );
        for (name, accuracy) in accuracies {
            if !(0.0..=100.0).contains(&accuracy) {
                return Err(PredictionError::InvalidConfig(format!(
                    "accuracy for {name} must lie in [0, 100], got {accuracy}"
                )));
            }
        }
        if !(0..=MAX_RETENTION_DAYS).contains(&self.performance_retention_days) {
            return Err(PredictionError::InvalidConfig(format!(
                "performance_retention_days must lie in [0, {MAX_RETENTION_DAYS}], got {}",
                self.performance_retention_days
            )));
        }
        if !self.mape_epsilon.is_finite() || self.mape_epsilon <= 0.0 {
            return Err(PredictionError::InvalidConfig(
                "mape_epsilon must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Base columns followed by the configured columns, without duplicates.
    pub fn matrix_columns(&self) -> Vec<FeatureColumn> {
        FeatureColumn::BASE
            .into_iter()
            .chain(self.feature_columns.iter().copied())
            .unique()
            .collect()
    }

    pub fn accuracy_for(&self, model: &str) -> f64 {
        self.model_accuracies
            .get(model)
            .copied()
            .unwrap_or(self.default_accuracy)
    }
}
