use statrs::statistics::Statistics;

/// Round half away from zero to `decimals` places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub(crate) fn round_all(values: &[f64], decimals: i32) -> Vec<f64> {
    values.iter().map(|value| round_to(*value, decimals)).collect()
}

/// Relative change from `previous` to `current`. A zero or non-finite base
/// yields `0.0` instead of an infinite ratio.
pub(crate) fn pct_change(current: f64, previous: f64) -> f64 {
    if previous.abs() < f64::EPSILON || !previous.is_finite() || !current.is_finite() {
        return 0.0;
    }
    (current - previous) / previous
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().mean()
}

/// Population standard deviation (divides by `n`); `0.0` for fewer than two values.
pub(crate) fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().population_std_dev()
}

/// Sample standard deviation (divides by `n - 1`); `0.0` for fewer than two values.
pub(crate) fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().std_dev()
}

pub(crate) fn normalize_confidence(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Replace NaN and infinities with `0.0`.
pub(crate) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
