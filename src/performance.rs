use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dto::{ForecastRecord, PredictionError};

/// Day-one prediction and average confidence of every model for one run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PerformanceEntry {
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub predictions: BTreeMap<String, f64>,
    pub confidence: BTreeMap<String, f64>,
}

impl PerformanceEntry {
    pub fn from_record(record: &ForecastRecord) -> Self {
        let predictions = record
            .predictions
            .models
            .iter()
            .map(|(model, path)| (model.clone(), path.first().copied().unwrap_or(0.0)))
            .collect();
        let confidence = record
            .confidence
            .iter()
            .map(|(model, entry)| (model.clone(), entry.avg_confidence))
            .collect();

        Self {
            date: record.timestamp.date_naive(),
            timestamp: record.timestamp,
            current_price: record.current_price,
            predictions,
            confidence,
        }
    }
}

/// Rolling log of past runs, persisted as `{"entries": [...]}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceLog {
    #[serde(default)]
    pub entries: Vec<PerformanceEntry>,
}

impl PerformanceLog {
    /// Read a log file; a missing file is an empty log.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PredictionError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(PredictionError::Io(format!("{}: {}", path.display(), err))),
        };
        serde_json::from_str(&raw).map_err(|err| PredictionError::Serialization(err.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PredictionError> {
        let path = path.as_ref();
        let body = serde_json::to_string_pretty(self)
            .map_err(|err| PredictionError::Serialization(err.to_string()))?;
        std::fs::write(path, body)
            .map_err(|err| PredictionError::Io(format!("{}: {}", path.display(), err)))
    }

    /// Append the run described by `record`, then drop entries older than
    /// `retention_days` relative to `now`.
    pub fn record(&mut self, record: &ForecastRecord, now: DateTime<Utc>, retention_days: i64) {
        self.entries.push(PerformanceEntry::from_record(record));
        self.prune(now, retention_days);
    }

    /// Keep only entries whose timestamp is strictly after `now - retention_days`.
    /// A window reaching past the representable calendar keeps every entry.
    pub fn prune(&mut self, now: DateTime<Utc>, retention_days: i64) {
        let Some(cutoff) = Duration::try_days(retention_days)
            .and_then(|window| now.checked_sub_signed(window))
        else {
            debug!(retention_days, "retention window out of range, keeping all entries");
            return;
        };
        let before = self.entries.len();
        self.entries.retain(|entry| entry.timestamp > cutoff);
        debug!(
            kept = self.entries.len(),
            dropped = before - self.entries.len(),
            "pruned performance log"
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{
        ConfidenceEntry, ForecastMetadata, ForecastPredictions, KeyLevels, MarketInsight,
        ModelPaths, RiskAssessment, RiskLevel, TrendClass, TrendDirection, TrendInsight,
        VolatilityInsight, VolatilityLevel,
    };
    use chrono::TimeZone;

    fn record_at(timestamp: DateTime<Utc>) -> ForecastRecord {
        let mut models = ModelPaths::new();
        models.insert("ensemble".to_string(), vec![2_012.25, 2_015.0]);
        models.insert("tcn".to_string(), Vec::new());
        let mut confidence = BTreeMap::new();
        confidence.insert(
            "ensemble".to_string(),
            ConfidenceEntry {
                confidence_scores: vec![91.8, 87.21],
                lower_bounds: vec![2_000.0, 1_998.0],
                upper_bounds: vec![2_020.0, 2_030.0],
                avg_confidence: 89.51,
            },
        );

        ForecastRecord {
            timestamp,
            current_price: 2_005.5,
            forecast_horizon: 2,
            predictions: ForecastPredictions {
                dates: Vec::new(),
                models,
            },
            confidence,
            insights: MarketInsight {
                trend: TrendInsight {
                    direction: TrendDirection::Neutral,
                    class: TrendClass::Neutral,
                    change_percent: 0.47,
                },
                volatility: VolatilityInsight {
                    level: VolatilityLevel::Low,
                    value: 0.3,
                },
                key_levels: KeyLevels {
                    resistance: 2_015.0,
                    support: 2_012.25,
                },
                risk_assessment: RiskAssessment {
                    level: RiskLevel::Low,
                    factors: Vec::new(),
                },
            },
            model_performance: BTreeMap::new(),
            metadata: ForecastMetadata {
                features_used: 10,
                data_points: 90,
                prediction_date: timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            },
            evaluation: None,
            prediction_vs_actual: Vec::new(),
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, 6, 0, 0).unwrap()
    }

    #[test]
    fn entry_takes_first_prediction_and_average_confidence() {
        let entry = PerformanceEntry::from_record(&record_at(at(3)));

        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2025, 6, 3).unwrap());
        assert_eq!(entry.current_price, 2_005.5);
        assert_eq!(entry.predictions["ensemble"], 2_012.25);
        assert_eq!(entry.predictions["tcn"], 0.0);
        assert_eq!(entry.confidence["ensemble"], 89.51);
    }

    #[test]
    fn prunes_entries_outside_retention() {
        let mut log = PerformanceLog::default();
        log.record(&record_at(at(1)), at(1), 30);
        log.record(&record_at(at(10)), at(10), 30);
        assert_eq!(log.len(), 2);

        log.prune(at(30), 20);

        assert_eq!(log.len(), 1);
        assert_eq!(log.entries[0].timestamp, at(10));
    }

    #[test]
    fn entry_exactly_at_cutoff_is_dropped() {
        let mut log = PerformanceLog::default();
        log.record(&record_at(at(1)), at(1), 30);

        log.prune(at(8), 7);

        assert!(log.is_empty());
    }

    #[test]
    fn oversized_retention_keeps_everything() {
        let mut log = PerformanceLog::default();
        log.record(&record_at(at(1)), at(1), 30);

        log.prune(at(2), 200_000_000);
        log.prune(at(2), i64::MAX);

        assert_eq!(log.len(), 1);
    }

    #[test]
    fn save_and_load_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("performance_log.json");
        let mut log = PerformanceLog::load(&path).unwrap();
        assert!(log.is_empty());

        log.record(&record_at(at(4)), at(4), 30);
        log.save(&path).unwrap();

        assert_eq!(PerformanceLog::load(&path).unwrap(), log);
    }

    #[test]
    fn corrupt_log_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("performance_log.json");
        std::fs::write(&path, "[1, 2").unwrap();

        assert!(matches!(
            PerformanceLog::load(&path),
            Err(PredictionError::Serialization(_))
        ));
    }
}
