use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};

use crate::dto::{
    BacktestPoint, ConfidenceEntry, EvaluationRecord, ForecastPredictions, ForecastRecord,
    MarketInsight, PriceRecord, TrendDirection, ENSEMBLE_MODEL,
};
use crate::helpers;

/// Trailing days of price history bundled into [`WebData`].
pub const WEB_HISTORY_DAYS: usize = 30;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TodayPrediction {
    pub ensemble: f64,
    /// Day-one ensemble confidence, one decimal place.
    pub confidence: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeekOutlook {
    pub high: f64,
    pub low: f64,
    pub end_price: f64,
    pub trend: TrendDirection,
}

/// Compact view of a [`ForecastRecord`] for dashboards.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ForecastSummary {
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub today_prediction: TodayPrediction,
    pub week_outlook: WeekOutlook,
    pub last_updated: String,
}

impl ForecastSummary {
    /// Summarize the ensemble path of `record`. Returns `None` when the
    /// record carries no ensemble prediction.
    pub fn from_record(record: &ForecastRecord) -> Option<Self> {
        let path = record.ensemble_path()?;
        let (low, high) = match path.iter().copied().minmax() {
            MinMaxResult::MinMax(low, high) => (low, high),
            MinMaxResult::OneElement(price) => (price, price),
            MinMaxResult::NoElements => return None,
        };
        let day_one = *path.first()?;
        let end_price = *path.last()?;
        let confidence = record
            .confidence
            .get(ENSEMBLE_MODEL)
            .and_then(|entry| entry.confidence_scores.first().copied())
            .unwrap_or(0.0);

        Some(Self {
            timestamp: record.timestamp,
            current_price: record.current_price,
            today_prediction: TodayPrediction {
                ensemble: helpers::round_to(day_one, 2),
                confidence: helpers::round_to(confidence, 1),
            },
            week_outlook: WeekOutlook {
                high: helpers::round_to(high, 2),
                low: helpers::round_to(low, 2),
                end_price: helpers::round_to(end_price, 2),
                trend: record.insights.trend.direction,
            },
            last_updated: record.metadata.prediction_date.clone(),
        })
    }
}

/// Everything a dashboard needs in one document: the forecast plus the
/// recent price history it was made from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WebData {
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub predictions: ForecastPredictions,
    pub confidence: BTreeMap<String, ConfidenceEntry>,
    pub insights: MarketInsight,
    pub model_performance: BTreeMap<String, f64>,
    pub historical_data: Vec<PriceRecord>,
    #[serde(default)]
    pub prediction_vs_actual: Vec<BacktestPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationRecord>,
    pub last_updated: String,
}

impl WebData {
    /// Bundle `record` with the last [`WEB_HISTORY_DAYS`] records of
    /// `history`, taken in date order.
    pub fn from_record(record: &ForecastRecord, history: &[PriceRecord]) -> Self {
        let mut ordered = history.to_vec();
        ordered.sort_by_key(|price| price.date);
        let recent = ordered.split_off(ordered.len().saturating_sub(WEB_HISTORY_DAYS));

        Self {
            timestamp: record.timestamp,
            current_price: record.current_price,
            predictions: record.predictions.clone(),
            confidence: record.confidence.clone(),
            insights: record.insights.clone(),
            model_performance: record.model_performance.clone(),
            historical_data: recent,
            prediction_vs_actual: record.prediction_vs_actual.clone(),
            evaluation: record.evaluation.clone(),
            last_updated: record.metadata.prediction_date.clone(),
        }
    }
}

/// Three-line plain-text brief: current price, tomorrow's ensemble
/// prediction (omitted without an ensemble path) and trend.
pub fn render_brief(record: &ForecastRecord) -> String {
    let mut brief = format!("Current Price: ${:.2}\n", record.current_price);
    if let Some(tomorrow) = record.ensemble_path().and_then(|path| path.first()) {
        let _ = writeln!(brief, "Tomorrow Prediction: ${tomorrow:.2}");
    }
    let _ = writeln!(brief, "Trend: {}", record.insights.trend.direction.label());
    brief
}

/// Markdown run report: market data, first-day prediction per model,
/// insights and static model accuracies.
pub fn render_markdown_summary(record: &ForecastRecord) -> String {
    let mut out = String::new();
    let insights = &record.insights;

    let _ = writeln!(out, "### Market Data");
    let _ = writeln!(out, "- **Current Price**: ${:.2}", record.current_price);
    let _ = writeln!(
        out,
        "- **Data Source**: {} historical points",
        record.metadata.data_points
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "### Tomorrow Predictions");
    let firsts: Vec<(&String, f64)> = record
        .predictions
        .models
        .iter()
        .filter_map(|(model, path)| path.first().map(|price| (model, *price)))
        .collect();
    if firsts.is_empty() {
        let _ = writeln!(out, "- No predictions available.");
    }
    for (model, price) in firsts {
        let _ = writeln!(out, "- **{}**: ${price:.2}", model.to_uppercase());
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "### Market Insights");
    let _ = writeln!(
        out,
        "- **Trend**: {} ({:.2}%)",
        insights.trend.direction.label(),
        insights.trend.change_percent
    );
    let _ = writeln!(out, "- **Volatility**: {:?}", insights.volatility.level);
    let _ = writeln!(out, "- **Support**: ${:.2}", insights.key_levels.support);
    let _ = writeln!(out, "- **Resistance**: ${:.2}", insights.key_levels.resistance);
    let _ = writeln!(out);

    let _ = writeln!(out, "### Model Performance");
    if record.model_performance.is_empty() {
        let _ = writeln!(out, "- No performance data available.");
    }
    for (model, accuracy) in &record.model_performance {
        let _ = writeln!(out, "- **{}**: {accuracy:.1}% accuracy", model.to_uppercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{
        ConfidenceEntry, ForecastMetadata, ForecastPredictions, KeyLevels, MarketInsight,
        ModelPaths, RiskAssessment, RiskLevel, TrendInsight, VolatilityInsight, VolatilityLevel,
    };
    use chrono::{NaiveDate, TimeZone};
    use std::collections::BTreeMap;

    fn record(ensemble: Vec<f64>) -> ForecastRecord {
        let mut models = ModelPaths::new();
        models.insert("tcn".to_string(), vec![2_001.5, 2_003.0]);
        models.insert(ENSEMBLE_MODEL.to_string(), ensemble);
        let mut confidence = BTreeMap::new();
        confidence.insert(
            ENSEMBLE_MODEL.to_string(),
            ConfidenceEntry {
                confidence_scores: vec![91.8, 87.21],
                lower_bounds: vec![1_990.0, 1_985.0],
                upper_bounds: vec![2_020.0, 2_030.0],
                avg_confidence: 89.51,
            },
        );
        let mut model_performance = BTreeMap::new();
        model_performance.insert(ENSEMBLE_MODEL.to_string(), 91.8);
        model_performance.insert("tcn".to_string(), 85.2);

        ForecastRecord {
            timestamp: Utc.with_ymd_and_hms(2025, 5, 6, 6, 0, 0).unwrap(),
            current_price: 2_000.0,
            forecast_horizon: 2,
            predictions: ForecastPredictions {
                dates: vec![
                    NaiveDate::from_ymd_opt(2025, 5, 7).unwrap(),
                    NaiveDate::from_ymd_opt(2025, 5, 8).unwrap(),
                ],
                models,
            },
            confidence,
            insights: MarketInsight {
                trend: TrendInsight {
                    direction: TrendDirection::Bullish,
                    class: TrendDirection::Bullish.class(),
                    change_percent: 1.2,
                },
                volatility: VolatilityInsight {
                    level: VolatilityLevel::Low,
                    value: 0.6,
                },
                key_levels: KeyLevels {
                    resistance: 2_030.0,
                    support: 1_995.0,
                },
                risk_assessment: RiskAssessment {
                    level: RiskLevel::Low,
                    factors: Vec::new(),
                },
            },
            model_performance,
            metadata: ForecastMetadata {
                features_used: 10,
                data_points: 120,
                prediction_date: "2025-05-06 06:00:00 UTC".to_string(),
            },
            evaluation: None,
            prediction_vs_actual: Vec::new(),
        }
    }

    #[test]
    fn summarizes_the_ensemble_week() {
        let summary = ForecastSummary::from_record(&record(vec![2_010.0, 2_024.0])).unwrap();

        assert_eq!(summary.today_prediction.ensemble, 2_010.0);
        assert_eq!(summary.today_prediction.confidence, 91.8);
        assert_eq!(summary.week_outlook.high, 2_024.0);
        assert_eq!(summary.week_outlook.low, 2_010.0);
        assert_eq!(summary.week_outlook.end_price, 2_024.0);
        assert_eq!(summary.week_outlook.trend, TrendDirection::Bullish);
        assert_eq!(summary.last_updated, "2025-05-06 06:00:00 UTC");
    }

    #[test]
    fn no_summary_without_ensemble() {
        assert!(ForecastSummary::from_record(&record(Vec::new())).is_none());
    }

    #[test]
    fn brief_has_three_lines() {
        let brief = render_brief(&record(vec![2_010.456, 2_024.0]));

        assert_eq!(
            brief,
            "Current Price: $2000.00\nTomorrow Prediction: $2010.46\nTrend: Bullish\n"
        );
    }

    #[test]
    fn brief_skips_missing_prediction() {
        let brief = render_brief(&record(Vec::new()));

        assert_eq!(brief.lines().count(), 2);
        assert!(brief.contains("Trend: Bullish"));
    }

    #[test]
    fn web_data_keeps_the_last_thirty_days_in_order() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let mut history: Vec<PriceRecord> = (0..45)
            .map(|idx| PriceRecord {
                date: start + chrono::Duration::days(idx),
                open: 2_000.0,
                high: 2_010.0,
                low: 1_990.0,
                close: 2_000.0 + idx as f64,
                volume: 0.0,
            })
            .collect();
        history.reverse();
        let source = record(vec![2_010.0, 2_024.0]);

        let web = WebData::from_record(&source, &history);

        assert_eq!(web.historical_data.len(), WEB_HISTORY_DAYS);
        assert_eq!(web.historical_data[0].close, 2_015.0);
        assert_eq!(web.historical_data[29].close, 2_044.0);
        assert_eq!(web.predictions, source.predictions);
        assert_eq!(web.last_updated, "2025-05-06 06:00:00 UTC");
        assert!(serde_json::to_value(&web).unwrap().get("evaluation").is_none());
    }

    #[test]
    fn web_data_with_short_history_keeps_everything() {
        let history = vec![PriceRecord {
            date: NaiveDate::from_ymd_opt(2025, 5, 5).unwrap(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0.0,
        }];

        let web = WebData::from_record(&record(vec![2_010.0]), &history);

        assert_eq!(web.historical_data, history);
    }

    #[test]
    fn markdown_lists_every_model() {
        let report = render_markdown_summary(&record(vec![2_010.0, 2_024.0]));

        assert!(report.contains("- **ENSEMBLE**: $2010.00"));
        assert!(report.contains("- **TCN**: $2001.50"));
        assert!(report.contains("- **Trend**: Bullish (1.20%)"));
        assert!(report.contains("- **TCN**: 85.2% accuracy"));
        assert!(report.contains("120 historical points"));
    }
}
