use chrono::{Duration, NaiveDate, TimeZone, Utc};
use gold_forecast::{
    run_forecast_handler, run_forecast_handler_json, ForecastRecord, ForecastRequest,
    PredictionError, PriceRecord,
};

fn build_history(count: usize) -> Vec<PriceRecord> {
    let first_day = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
    (0..count)
        .map(|idx| {
            let close = 2_650.0 + (idx as f64 * 0.2).sin() * 30.0;
            PriceRecord {
                date: first_day + Duration::days(idx as i64),
                open: close,
                high: close + 5.0,
                low: close - 5.0,
                close,
                volume: 0.0,
            }
        })
        .collect()
}

fn request(seed: Option<u64>) -> ForecastRequest {
    let history = build_history(70);
    ForecastRequest {
        current_price: history.last().map(|record| record.close),
        history,
        previous: None,
        seed,
        as_of: Some(Utc.with_ymd_and_hms(2025, 3, 17, 6, 0, 0).unwrap()),
        config: None,
    }
}

#[test]
fn handler_returns_serialized_record() {
    let json = run_forecast_handler(request(Some(12))).expect("handler should succeed");

    let record: ForecastRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(record.forecast_horizon, 7);
    assert_eq!(
        record.first_forecast_date(),
        NaiveDate::from_ymd_opt(2025, 3, 18)
    );
    assert!(record.ensemble_path().is_some());
}

#[test]
fn seeded_handler_output_is_stable() {
    let first = run_forecast_handler(request(Some(99))).unwrap();
    let second = run_forecast_handler(request(Some(99))).unwrap();

    assert_eq!(first, second);
}

#[test]
fn unseeded_handler_still_produces_a_record() {
    let json = run_forecast_handler(request(None)).unwrap();

    let record: ForecastRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(record.predictions.models.len(), 4);
}

#[test]
fn json_payload_with_minimal_fields() {
    let history = build_history(65);
    let payload = serde_json::json!({
        "history": history,
        "current_price": 2_655.0,
        "seed": 3,
        "as_of": "2025-03-17T06:00:00Z",
        "config": { "horizon": 3 }
    });

    let json = run_forecast_handler_json(&payload.to_string()).unwrap();

    let record: ForecastRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(record.predictions.dates.len(), 3);
    assert_eq!(record.current_price, 2_655.0);
}

#[test]
fn handler_reports_pipeline_failures() {
    let mut short = request(Some(1));
    short.history.truncate(10);
    assert_eq!(
        run_forecast_handler(short),
        Err(PredictionError::InsufficientHistory {
            required: 60,
            available: 10
        })
    );

    let mut missing_price = request(Some(1));
    missing_price.current_price = None;
    assert_eq!(run_forecast_handler(missing_price), Err(PredictionError::NoData));

    assert!(matches!(
        run_forecast_handler_json("{\"history\": 5}"),
        Err(PredictionError::Serialization(_))
    ));
}
