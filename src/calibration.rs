use std::collections::BTreeMap;

use crate::config::PipelineConfig;
use crate::dto::{ConfidenceEntry, ModelPaths};
use crate::helpers;

/// Calibrate one projected path.
///
/// Day `i` gets confidence `base_accuracy * decay^i / 100` (clamped to
/// `[0, 1]`) and a symmetric margin of `2 * std(path) * (1 - confidence)`
/// around the projected price. The lower bound never drops below zero; a
/// zero price collapses both bounds onto the price.
pub fn calibrate_model(path: &[f64], base_accuracy: f64, decay: f64) -> ConfidenceEntry {
    let spread = helpers::population_std_dev(path);

    let mut confidence_scores = Vec::with_capacity(path.len());
    let mut lower_bounds = Vec::with_capacity(path.len());
    let mut upper_bounds = Vec::with_capacity(path.len());

    for (day, price) in path.iter().enumerate() {
        let confidence = helpers::normalize_confidence(base_accuracy * decay.powi(day as i32) / 100.0);
        let margin = spread * (1.0 - confidence) * 2.0;

        let (lower, upper) = if price.abs() < f64::EPSILON {
            (*price, *price)
        } else {
            (
                (price * (1.0 - margin / price)).max(0.0),
                price * (1.0 + margin / price),
            )
        };

        confidence_scores.push(confidence * 100.0);
        lower_bounds.push(lower);
        upper_bounds.push(upper);
    }

    let avg_confidence = helpers::mean(&confidence_scores);

    ConfidenceEntry {
        confidence_scores,
        lower_bounds,
        upper_bounds,
        avg_confidence,
    }
}

/// Calibrate every model path with its configured base accuracy.
pub fn calibrate_paths(
    paths: &ModelPaths,
    config: &PipelineConfig,
) -> BTreeMap<String, ConfidenceEntry> {
    paths
        .iter()
        .map(|(model, path)| {
            let entry = calibrate_model(path, config.accuracy_for(model), config.confidence_decay);
            (model.clone(), entry)
        })
        .collect()
}
