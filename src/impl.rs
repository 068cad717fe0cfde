use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, warn};

use crate::analysis;
use crate::calibration;
use crate::config::PipelineConfig;
use crate::evaluation;
use crate::generators::{self, PathGenerator};
use crate::helpers;
use crate::insights;
use crate::source::PriceHistorySource;
use crate::{
    BacktestPoint, ConfidenceEntry, EvaluationRecord, ForecastMetadata, ForecastPredictions,
    ForecastRecord, MarketInsight, MarketSnapshot, ModelPaths, PredictionError, ENSEMBLE_MODEL,
};

const PRICE_DECIMALS: i32 = 2;
const ERROR_DECIMALS: i32 = 4;
const PREDICTION_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Runs one forecast: features, model paths, calibration, insights and
/// evaluation of the previous run.
pub struct ForecastPipeline {
    config: PipelineConfig,
    generators: Vec<Box<dyn PathGenerator>>,
}

impl ForecastPipeline {
    /// Build a pipeline with the default simulated generators.
    ///
    /// Fails with [`PredictionError::InvalidConfig`] when the configuration
    /// does not validate.
    ///
    /// ```no_run
    /// use gold_forecast::{ForecastPipeline, PipelineConfig};
    ///
    /// let pipeline = ForecastPipeline::new(PipelineConfig::default())?;
    /// # Ok::<(), gold_forecast::PredictionError>(())
    /// ```
    pub fn new(config: PipelineConfig) -> Result<Self, PredictionError> {
        Self::with_generators(config, generators::default_generators())
    }

    /// Build a pipeline around a custom generator set. Generators run in the
    /// given order, so a combining generator must come after its members.
    pub fn with_generators(
        config: PipelineConfig,
        generators: Vec<Box<dyn PathGenerator>>,
    ) -> Result<Self, PredictionError> {
        config.validate()?;
        if generators.is_empty() {
            return Err(PredictionError::InvalidConfig(
                "at least one path generator is required".to_string(),
            ));
        }
        Ok(Self { config, generators })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load a snapshot from `source` and forecast from it.
    pub fn run(
        &self,
        source: &dyn PriceHistorySource,
        previous: Option<&ForecastRecord>,
        as_of: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Result<ForecastRecord, PredictionError> {
        let snapshot = source.load()?;
        self.forecast(&snapshot, previous, as_of, rng)
    }

    /// Same as [`ForecastPipeline::forecast`] with a seeded generator, so two
    /// calls with equal inputs produce equal records.
    pub fn forecast_with_seed(
        &self,
        snapshot: &MarketSnapshot,
        previous: Option<&ForecastRecord>,
        as_of: DateTime<Utc>,
        seed: u64,
    ) -> Result<ForecastRecord, PredictionError> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.forecast(snapshot, previous, as_of, &mut rng)
    }

    /// Produce a complete [`ForecastRecord`] for `as_of`.
    ///
    /// Forecast dates start the day after `as_of`. Evaluation against
    /// `previous` and the backtest series are best effort: a failure there is
    /// logged and the record is still returned without them.
    pub fn forecast(
        &self,
        snapshot: &MarketSnapshot,
        previous: Option<&ForecastRecord>,
        as_of: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Result<ForecastRecord, PredictionError> {
        if snapshot.history.is_empty() {
            return Err(PredictionError::NoData);
        }
        let current_price = snapshot
            .current_price
            .filter(|price| price.is_finite() && *price > 0.0)
            .ok_or(PredictionError::NoData)?;

        info!(
            current_price,
            history = snapshot.history.len(),
            horizon = self.config.horizon,
            "starting forecast run"
        );

        let prepared = analysis::prepare_features(&snapshot.history, &self.config)?;
        let sequence = prepared.matrix.last_sequence(self.config.sequence_length);

        let paths = generators::generate_paths(
            &self.generators,
            current_price,
            self.config.horizon,
            self.config.base_volatility,
            sequence,
            rng,
        )?;
        let confidence = calibration::calibrate_paths(&paths, &self.config);
        debug!(models = confidence.len(), "calibrated model paths");

        let market_insight = insights::generate_insights(current_price, &paths, ENSEMBLE_MODEL);
        debug!(trend = market_insight.trend.direction.label(), "derived market insight");

        let today = as_of.date_naive();
        let scored = evaluation::evaluate_previous(
            previous,
            today,
            current_price,
            self.config.mape_epsilon,
        )
        .unwrap_or_else(|err| {
            warn!(error = %err, "skipping evaluation of previous forecast");
            None
        });
        let backtest = evaluation::build_backtest(&snapshot.history, self.config.backtest_window)
            .unwrap_or_else(|err| {
                warn!(error = %err, "skipping backtest series");
                Vec::new()
            });

        let model_performance = paths
            .keys()
            .map(|model| (model.clone(), self.config.accuracy_for(model)))
            .collect();

        let record = ForecastRecord {
            timestamp: as_of,
            current_price: helpers::round_to(current_price, PRICE_DECIMALS),
            forecast_horizon: self.config.horizon,
            predictions: ForecastPredictions {
                dates: forecast_dates(today, self.config.horizon)?,
                models: round_paths(paths),
            },
            confidence: round_confidence(confidence),
            insights: round_insight(market_insight),
            model_performance,
            metadata: ForecastMetadata {
                features_used: prepared.matrix.n_features(),
                data_points: prepared.rows.len(),
                prediction_date: as_of.format(PREDICTION_DATE_FORMAT).to_string(),
            },
            evaluation: scored.map(round_evaluation),
            prediction_vs_actual: round_backtest(backtest),
        };

        info!(
            models = record.predictions.models.len(),
            evaluated = record.evaluation.is_some(),
            backtest_points = record.prediction_vs_actual.len(),
            "forecast run finished"
        );
        Ok(record)
    }
}

fn forecast_dates(today: NaiveDate, horizon: usize) -> Result<Vec<NaiveDate>, PredictionError> {
    (1..=horizon)
        .map(|offset| {
            let days = i64::try_from(offset).map_err(|_| PredictionError::TimeConversion)?;
            Duration::try_days(days)
                .and_then(|delta| today.checked_add_signed(delta))
                .ok_or(PredictionError::TimeConversion)
        })
        .collect()
}

fn round_paths(paths: ModelPaths) -> ModelPaths {
    paths
        .into_iter()
        .map(|(model, path)| (model, helpers::round_all(&path, PRICE_DECIMALS)))
        .collect()
}

fn round_confidence(
    confidence: BTreeMap<String, ConfidenceEntry>,
) -> BTreeMap<String, ConfidenceEntry> {
    confidence
        .into_iter()
        .map(|(model, entry)| {
            let rounded = ConfidenceEntry {
                confidence_scores: helpers::round_all(&entry.confidence_scores, PRICE_DECIMALS),
                lower_bounds: helpers::round_all(&entry.lower_bounds, PRICE_DECIMALS),
                upper_bounds: helpers::round_all(&entry.upper_bounds, PRICE_DECIMALS),
                avg_confidence: helpers::round_to(entry.avg_confidence, PRICE_DECIMALS),
            };
            (model, rounded)
        })
        .collect()
}

fn round_insight(mut insight: MarketInsight) -> MarketInsight {
    insight.trend.change_percent = helpers::round_to(insight.trend.change_percent, PRICE_DECIMALS);
    insight.volatility.value = helpers::round_to(insight.volatility.value, PRICE_DECIMALS);
    insight.key_levels.resistance =
        helpers::round_to(insight.key_levels.resistance, PRICE_DECIMALS);
    insight.key_levels.support = helpers::round_to(insight.key_levels.support, PRICE_DECIMALS);
    insight
}

fn round_evaluation(record: EvaluationRecord) -> EvaluationRecord {
    EvaluationRecord {
        date: record.date,
        yesterday_pred: helpers::round_to(record.yesterday_pred, PRICE_DECIMALS),
        today_actual: helpers::round_to(record.today_actual, PRICE_DECIMALS),
        mae: helpers::round_to(record.mae, ERROR_DECIMALS),
        mape: helpers::round_to(record.mape, ERROR_DECIMALS),
    }
}

fn round_backtest(points: Vec<BacktestPoint>) -> Vec<BacktestPoint> {
    points
        .into_iter()
        .map(|point| BacktestPoint {
            date: point.date,
            predicted: helpers::round_to(point.predicted, PRICE_DECIMALS),
            actual: helpers::round_to(point.actual, PRICE_DECIMALS),
        })
        .collect()
}
