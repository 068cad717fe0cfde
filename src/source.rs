use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::dto::{MarketSnapshot, PredictionError, PriceRecord};

/// Supplies the ordered daily history and current price for a run.
pub trait PriceHistorySource {
    fn load(&self) -> Result<MarketSnapshot, PredictionError>;
}

/// Source backed by an already-assembled snapshot.
#[derive(Clone, Debug, Default)]
pub struct StaticSource {
    snapshot: MarketSnapshot,
}

impl StaticSource {
    pub fn new(current_price: Option<f64>, history: Vec<PriceRecord>) -> Self {
        Self {
            snapshot: MarketSnapshot {
                current_price,
                history,
            },
        }
    }
}

impl PriceHistorySource for StaticSource {
    fn load(&self) -> Result<MarketSnapshot, PredictionError> {
        Ok(self.snapshot.clone())
    }
}

#[derive(Deserialize)]
struct MarketDataFile {
    gold_price: Option<PriceSection>,
}

#[derive(Deserialize)]
struct PriceSection {
    current: Option<f64>,
    #[serde(default)]
    data: Vec<PriceRecord>,
}

/// Reads the market-data artifact written by the acquisition job:
///
/// ```json
/// { "gold_price": { "current": 2034.5, "data": [ { "date": "2025-01-02", "open": ..., "close": ... } ] } }
/// ```
///
/// Records are sorted by date and de-duplicated on load. A missing file,
/// a missing `gold_price` section or empty `data` is
/// [`PredictionError::NoData`].
#[derive(Clone, Debug)]
pub struct JsonMarketDataSource {
    path: PathBuf,
}

impl JsonMarketDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PriceHistorySource for JsonMarketDataSource {
    fn load(&self) -> Result<MarketSnapshot, PredictionError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(PredictionError::NoData);
            }
            Err(err) => {
                return Err(PredictionError::Io(format!("{}: {}", self.path.display(), err)));
            }
        };
        let file: MarketDataFile = serde_json::from_str(&raw)
            .map_err(|err| PredictionError::Serialization(err.to_string()))?;
        let section = file.gold_price.ok_or(PredictionError::NoData)?;

        let mut history = section.data;
        history.sort_by_key(|record| record.date);
        history.dedup_by_key(|record| record.date);
        if history.is_empty() {
            return Err(PredictionError::NoData);
        }
        debug!(path = %self.path.display(), points = history.len(), "loaded market data");

        Ok(MarketSnapshot {
            current_price: section.current,
            history,
        })
    }
}
