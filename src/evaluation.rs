use chrono::NaiveDate;

use crate::dto::{BacktestPoint, EvaluationRecord, ForecastRecord, PredictionError, PriceRecord};

/// Score the previous run's first-day ensemble prediction against today's
/// price.
///
/// Returns `Ok(None)` when there is no previous record, when its first
/// forecast date is not `today`, or when it carries no ensemble path.
/// Values are unrounded.
pub fn evaluate_previous(
    previous: Option<&ForecastRecord>,
    today: NaiveDate,
    current_price: f64,
    mape_epsilon: f64,
) -> Result<Option<EvaluationRecord>, PredictionError> {
    let Some(previous) = previous else {
        return Ok(None);
    };
    if previous.first_forecast_date() != Some(today) {
        return Ok(None);
    }
    let Some(predicted) = previous.ensemble_path().and_then(|path| path.first().copied()) else {
        return Ok(None);
    };

    if !predicted.is_finite() {
        return Err(PredictionError::InvalidPrice(format!(
            "previous ensemble prediction for {today} is not finite"
        )));
    }
    if !current_price.is_finite() {
        return Err(PredictionError::InvalidPrice(format!(
            "current price {current_price} is not finite"
        )));
    }

    let mae = (current_price - predicted).abs();
    let mape = mae / current_price.max(mape_epsilon) * 100.0;

    Ok(Some(EvaluationRecord {
        date: today,
        yesterday_pred: predicted,
        today_actual: current_price,
        mae,
        mape,
    }))
}

/// Stitch the trailing `min(window, N - 1)` days of history into
/// predicted-vs-actual points using the naive baseline
/// `predicted(day i) = close(day i - 1)`.
///
/// The input is not modified; a date-sorted copy is used.
pub fn build_backtest(
    history: &[PriceRecord],
    window: usize,
) -> Result<Vec<BacktestPoint>, PredictionError> {
    let mut ordered = history.to_vec();
    ordered.sort_by_key(|record| record.date);

    if let Some(record) = ordered.iter().find(|record| !record.close.is_finite()) {
        return Err(PredictionError::InvalidPrice(format!(
            "close on {} is not finite",
            record.date
        )));
    }

    let start = ordered.len().saturating_sub(window).max(1);
    let points = (start..ordered.len())
        .map(|idx| {
            let baseline = idx.checked_sub(1).unwrap_or(idx);
            BacktestPoint {
                date: ordered[idx].date,
                predicted: ordered[baseline].close,
                actual: ordered[idx].close,
            }
        })
        .collect();

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{
        ConfidenceEntry, ForecastMetadata, ForecastPredictions, KeyLevels, MarketInsight,
        ModelPaths, RiskAssessment, RiskLevel, TrendClass, TrendDirection, TrendInsight,
        VolatilityInsight, VolatilityLevel, ENSEMBLE_MODEL,
    };
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap() + Duration::days(offset)
    }

    fn previous_record(first_date: NaiveDate, ensemble: Vec<f64>) -> ForecastRecord {
        let mut models = ModelPaths::new();
        models.insert(ENSEMBLE_MODEL.to_string(), ensemble);
        let mut confidence = BTreeMap::new();
        confidence.insert(
            ENSEMBLE_MODEL.to_string(),
            ConfidenceEntry {
                confidence_scores: vec![91.8],
                lower_bounds: vec![1_980.0],
                upper_bounds: vec![2_000.0],
                avg_confidence: 91.8,
            },
        );

        ForecastRecord {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap(),
            current_price: 1_985.0,
            forecast_horizon: 1,
            predictions: ForecastPredictions {
                dates: vec![first_date],
                models,
            },
            confidence,
            insights: MarketInsight {
                trend: TrendInsight {
                    direction: TrendDirection::Neutral,
                    class: TrendClass::Neutral,
                    change_percent: 0.25,
                },
                volatility: VolatilityInsight {
                    level: VolatilityLevel::Low,
                    value: 0.25,
                },
                key_levels: KeyLevels {
                    resistance: 1_990.0,
                    support: 1_990.0,
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
                prediction_date: "2025-03-01 06:00:00 UTC".to_string(),
            },
            evaluation: None,
            prediction_vs_actual: Vec::new(),
        }
    }

    fn history(count: usize) -> Vec<PriceRecord> {
        (0..count)
            .map(|idx| {
                let close = 1_900.0 + idx as f64 * 3.0;
                PriceRecord {
                    date: day(idx as i64 - count as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 0.0,
                }
            })
            .collect()
    }

    #[test]
    fn scores_matching_previous_prediction() {
        let previous = previous_record(day(1), vec![1_990.0, 2_001.0]);

        let evaluation = evaluate_previous(Some(&previous), day(1), 2_000.0, 1e-6)
            .unwrap()
            .expect("evaluation should be present");

        assert_eq!(evaluation.date, day(1));
        assert_eq!(evaluation.yesterday_pred, 1_990.0);
        assert_eq!(evaluation.today_actual, 2_000.0);
        assert_relative_eq!(evaluation.mae, 10.0, epsilon = 1e-9);
        assert_relative_eq!(evaluation.mape, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn skips_when_dates_do_not_line_up() {
        let previous = previous_record(day(2), vec![1_990.0]);

        assert_eq!(evaluate_previous(Some(&previous), day(1), 2_000.0, 1e-6), Ok(None));
        assert_eq!(evaluate_previous(None, day(1), 2_000.0, 1e-6), Ok(None));
    }

    #[test]
    fn skips_without_ensemble_prediction() {
        let previous = previous_record(day(1), Vec::new());

        assert_eq!(evaluate_previous(Some(&previous), day(1), 2_000.0, 1e-6), Ok(None));
    }

    #[test]
    fn mape_denominator_is_floored() {
        let previous = previous_record(day(1), vec![1.0]);

        let evaluation = evaluate_previous(Some(&previous), day(1), 0.0, 1e-6)
            .unwrap()
            .unwrap();

        assert!(evaluation.mape.is_finite());
        assert_relative_eq!(evaluation.mape, 1.0 / 1e-6 * 100.0, max_relative = 1e-9);
    }

    #[test]
    fn backtest_uses_previous_close_as_prediction() {
        let history = history(35);

        let points = build_backtest(&history, 30).unwrap();

        assert_eq!(points.len(), 30);
        assert_eq!(points[0].date, history[5].date);
        for point in &points {
            let idx = history.iter().position(|r| r.date == point.date).unwrap();
            assert_eq!(point.actual, history[idx].close);
            assert_eq!(point.predicted, history[idx - 1].close);
        }
    }

    #[test]
    fn short_history_backtest_covers_all_but_first_day() {
        let points = build_backtest(&history(10), 30).unwrap();

        assert_eq!(points.len(), 9);
        assert!(build_backtest(&history(1), 30).unwrap().is_empty());
        assert!(build_backtest(&[], 30).unwrap().is_empty());
    }

    #[test]
    fn backtest_sorts_a_copy_of_unordered_history() {
        let mut shuffled = history(5);
        shuffled.reverse();

        let points = build_backtest(&shuffled, 30).unwrap();

        assert_eq!(points.len(), 4);
        assert!(points.windows(2).all(|pair| pair[0].date < pair[1].date));
        assert!(shuffled[0].date > shuffled[4].date);
    }

    #[test]
    fn backtest_rejects_non_finite_close() {
        let mut records = history(5);
        records[2].close = f64::NAN;

        assert!(matches!(
            build_backtest(&records, 30),
            Err(PredictionError::InvalidPrice(_))
        ));
    }
}
