use itertools::Itertools;
use ta::indicators::SimpleMovingAverage;
use ta::Next;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::dto::{FeatureColumn, FeatureRow, NormalizedFeatureMatrix, PredictionError, PriceRecord};
use crate::helpers;

const SMA_SHORT_WINDOW: usize = 5;
const SMA_MEDIUM_WINDOW: usize = 20;
const SMA_LONG_WINDOW: usize = 50;
const RSI_WINDOW: usize = 14;
const MACD_FAST_SPAN: usize = 12;
const MACD_SLOW_SPAN: usize = 26;
const MACD_SIGNAL_SPAN: usize = 9;
const VOLATILITY_WINDOW: usize = 20;

/// Feature rows for a history together with their normalized matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedFeatures {
    pub rows: Vec<FeatureRow>,
    pub matrix: NormalizedFeatureMatrix,
}

/// Simple moving average that reports `0.0` until a full window is available.
fn sma_series(closes: &[f64], window: usize) -> Result<Vec<f64>, PredictionError> {
    let mut sma = SimpleMovingAverage::new(window)
        .map_err(|err| PredictionError::InvalidConfig(format!("sma({window}): {err}")))?;
    Ok(closes
        .iter()
        .enumerate()
        .map(|(idx, close)| {
            let value = sma.next(*close);
            if idx + 1 >= window { value } else { 0.0 }
        })
        .collect())
}

/// Bias-adjusted exponential average with `alpha = 2 / (span + 1)`: every
/// output is the `(1 - alpha)^k`-weighted mean of all inputs seen so far, so
/// early values are not pulled toward the first observation.
fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let decay = 1.0 - 2.0 / (span as f64 + 1.0);
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    values
        .iter()
        .map(|value| {
            weighted_sum = value + decay * weighted_sum;
            weight_total = 1.0 + decay * weight_total;
            weighted_sum / weight_total
        })
        .collect()
}

/// Relative strength index from simple rolling means of close-to-close gains
/// and losses. The first delta counts as zero. A window without losses
/// saturates at 100.
fn rsi_series(closes: &[f64], window: usize) -> Vec<f64> {
    let deltas: Vec<f64> = std::iter::once(0.0)
        .chain(closes.iter().tuple_windows().map(|(prev, next)| next - prev))
        .collect();
    let gains: Vec<f64> = deltas.iter().map(|delta| delta.max(0.0)).collect();
    let losses: Vec<f64> = deltas.iter().map(|delta| (-delta).max(0.0)).collect();

    (0..closes.len())
        .map(|idx| {
            if idx + 1 < window {
                return 0.0;
            }
            let start = idx + 1 - window;
            let avg_gain = helpers::mean(&gains[start..=idx]);
            let avg_loss = helpers::mean(&losses[start..=idx]);
            if avg_loss <= f64::EPSILON {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
            }
        })
        .collect()
}

/// Rolling sample standard deviation of day-over-day returns; `0.0` until
/// `window` returns exist.
fn volatility_series(closes: &[f64], window: usize) -> Vec<f64> {
    let returns: Vec<f64> = std::iter::once(0.0)
        .chain(
            closes
                .iter()
                .tuple_windows()
                .map(|(prev, next)| helpers::pct_change(*next, *prev)),
        )
        .collect();

    (0..closes.len())
        .map(|idx| {
            if idx < window {
                return 0.0;
            }
            helpers::sample_std_dev(&returns[idx + 1 - window..=idx])
        })
        .collect()
}

fn lagged_change(closes: &[f64], idx: usize, lag: usize) -> f64 {
    if idx < lag {
        return 0.0;
    }
    helpers::pct_change(closes[idx], closes[idx - lag])
}

/// Derive one [`FeatureRow`] per price record. Indicators lacking enough
/// trailing history are zero-filled, as is any non-finite value.
pub fn compute_feature_rows(history: &[PriceRecord]) -> Result<Vec<FeatureRow>, PredictionError> {
    if history.is_empty() {
        return Ok(Vec::new());
    }

    let closes: Vec<f64> = history.iter().map(|record| record.close).collect();

    let sma_5 = sma_series(&closes, SMA_SHORT_WINDOW)?;
    let sma_20 = sma_series(&closes, SMA_MEDIUM_WINDOW)?;
    let sma_50 = sma_series(&closes, SMA_LONG_WINDOW)?;
    let rsi = rsi_series(&closes, RSI_WINDOW);

    let ema_fast = ema_series(&closes, MACD_FAST_SPAN);
    let ema_slow = ema_series(&closes, MACD_SLOW_SPAN);
    let macd: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(fast, slow)| fast - slow)
        .collect();
    let macd_signal = ema_series(&macd, MACD_SIGNAL_SPAN);

    let volatility = volatility_series(&closes, VOLATILITY_WINDOW);

    let zero = helpers::finite_or_zero;
    let rows = history
        .iter()
        .enumerate()
        .map(|(idx, record)| FeatureRow {
            date: Some(record.date),
            close: zero(record.close),
            volume: zero(record.volume),
            high: zero(record.high),
            low: zero(record.low),
            open: zero(record.open),
            sma_5: zero(sma_5[idx]),
            sma_20: zero(sma_20[idx]),
            sma_50: zero(sma_50[idx]),
            rsi: zero(rsi[idx]),
            macd: zero(macd[idx]),
            macd_signal: zero(macd_signal[idx]),
            volatility: zero(volatility[idx]),
            price_change_1d: zero(lagged_change(&closes, idx, 1)),
            price_change_5d: zero(lagged_change(&closes, idx, 5)),
            price_change_20d: zero(lagged_change(&closes, idx, 20)),
        })
        .collect();

    Ok(rows)
}

/// Min-max scale the selected columns independently to `[0, 1]`, fitted on
/// this batch only. Constant columns scale to `0.0`.
pub fn normalize_features(
    rows: &[FeatureRow],
    columns: &[FeatureColumn],
) -> Result<NormalizedFeatureMatrix, PredictionError> {
    let usable: Vec<FeatureColumn> = columns
        .iter()
        .copied()
        .unique()
        .filter(|column| rows.iter().all(|row| row.value(*column).is_finite()))
        .collect();

    if usable.is_empty() || rows.is_empty() {
        return Err(PredictionError::NoFeaturesAvailable);
    }

    let ranges: Vec<(f64, f64)> = usable
        .iter()
        .map(|column| {
            rows.iter()
                .map(|row| row.value(*column))
                .minmax()
                .into_option()
                .unwrap_or((0.0, 0.0))
        })
        .collect();

    let scaled = rows
        .iter()
        .map(|row| {
            usable
                .iter()
                .zip(ranges.iter())
                .map(|(column, (min, max))| {
                    let span = max - min;
                    if span <= f64::EPSILON {
                        0.0
                    } else {
                        ((row.value(*column) - min) / span).clamp(0.0, 1.0)
                    }
                })
                .collect()
        })
        .collect();

    Ok(NormalizedFeatureMatrix {
        columns: usable,
        rows: scaled,
    })
}

/// Build feature rows and the normalized matrix for a forecast run.
///
/// Returns [`PredictionError::InsufficientHistory`] when fewer than
/// `config.sequence_length` records are supplied and
/// [`PredictionError::NoFeaturesAvailable`] when no column is usable. The
/// OHLCV base columns always lead the matrix, followed by the configured
/// indicator columns.
pub fn prepare_features(
    history: &[PriceRecord],
    config: &PipelineConfig,
) -> Result<PreparedFeatures, PredictionError> {
    if history.len() < config.sequence_length {
        return Err(PredictionError::InsufficientHistory {
            required: config.sequence_length,
            available: history.len(),
        });
    }

    let rows = compute_feature_rows(history)?;
    let matrix = normalize_features(&rows, &config.matrix_columns())?;
    debug!(
        rows = matrix.n_rows(),
        features = matrix.n_features(),
        "prepared feature matrix"
    );

    Ok(PreparedFeatures { rows, matrix })
}
