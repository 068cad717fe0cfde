use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::{
    ForecastPipeline, ForecastRecord, MarketSnapshot, PipelineConfig, PredictionError,
    PriceRecord,
};

/// Single-payload description of a forecast run.
///
/// Only `history` and `current_price` are required. Missing `as_of` means
/// "now", a missing `seed` draws fresh entropy, and a missing `config` uses
/// [`PipelineConfig::default`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ForecastRequest {
    pub history: Vec<PriceRecord>,
    pub current_price: Option<f64>,
    #[serde(default)]
    pub previous: Option<ForecastRecord>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
    #[serde(default)]
    pub config: Option<PipelineConfig>,
}

/// Execute a forecast described by a [`ForecastRequest`], returning the
/// serialized [`ForecastRecord`].
///
/// Intended for HTTP or job-runner entry points that hand over one JSON
/// payload and persist the JSON that comes back.
///
/// # Examples
///
/// ```no_run
/// use gold_forecast::{ForecastRequest, PriceRecord};
///
/// # fn main() -> Result<(), gold_forecast::PredictionError> {
/// let history: Vec<PriceRecord> = Vec::new(); // at least 60 daily records
/// let request = ForecastRequest {
///     history,
///     current_price: Some(2_034.5),
///     previous: None,
///     seed: Some(7),
///     as_of: None,
///     config: None,
/// };
///
/// let json = gold_forecast::run_forecast_handler(request)?;
/// println!("{json}");
/// # Ok(())
/// # }
/// ```
pub fn run_forecast_handler(request: ForecastRequest) -> Result<String, PredictionError> {
    let pipeline = ForecastPipeline::new(request.config.unwrap_or_default())?;
    let snapshot = MarketSnapshot {
        current_price: request.current_price,
        history: request.history,
    };
    let as_of = request.as_of.unwrap_or_else(Utc::now);

    let record = match request.seed {
        Some(seed) => {
            pipeline.forecast_with_seed(&snapshot, request.previous.as_ref(), as_of, seed)
        }
        None => {
            let mut rng = StdRng::from_entropy();
            pipeline.forecast(&snapshot, request.previous.as_ref(), as_of, &mut rng)
        }
    }?;

    serde_json::to_string(&record).map_err(|err| PredictionError::Serialization(err.to_string()))
}

/// Parse a JSON [`ForecastRequest`] and run it through [`run_forecast_handler`].
pub fn run_forecast_handler_json(payload: &str) -> Result<String, PredictionError> {
    let request: ForecastRequest = serde_json::from_str(payload)
        .map_err(|err| PredictionError::Serialization(err.to_string()))?;
    run_forecast_handler(request)
}
