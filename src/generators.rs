//! Price-path generators.
//!
//! Every model is a [`PathGenerator`]: given the current price, the shared
//! noise scale and a random source, it produces one projected price per
//! forecast day. The generators shipped here are simulated stand-ins; a
//! trained model can implement the same trait and consume
//! [`PathContext::sequence`] without any change to calibration or insights.

use rand::{Rng, RngCore};
use rand_distr::Normal;
use tracing::debug;

use crate::dto::{ModelPaths, PredictionError, ENSEMBLE_MODEL};

/// Lower bound on a single day's growth factor, keeping every projected price positive.
const MIN_GROWTH_FACTOR: f64 = 1e-3;

/// Inputs shared by all generators of one run.
pub struct PathContext<'a> {
    pub current_price: f64,
    pub horizon: usize,
    pub base_volatility: f64,
    /// Trailing normalized feature rows (model input window).
    pub sequence: &'a [Vec<f64>],
    /// Paths produced by generators that ran earlier in this run.
    pub prior_paths: &'a ModelPaths,
}

impl<'a> PathContext<'a> {
    pub fn new(
        current_price: f64,
        horizon: usize,
        base_volatility: f64,
        sequence: &'a [Vec<f64>],
        prior_paths: &'a ModelPaths,
    ) -> Self {
        Self {
            current_price,
            horizon,
            base_volatility,
            sequence,
            prior_paths,
        }
    }

    pub fn without_features(
        current_price: f64,
        horizon: usize,
        base_volatility: f64,
        prior_paths: &'a ModelPaths,
    ) -> Self {
        Self::new(current_price, horizon, base_volatility, &[], prior_paths)
    }
}

/// Produces a horizon-length price path.
pub trait PathGenerator {
    fn name(&self) -> &str;

    fn generate(
        &self,
        context: &PathContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f64>, PredictionError>;
}

fn noise(base_volatility: f64, scale: f64) -> Result<Normal<f64>, PredictionError> {
    Normal::new(0.0, base_volatility * scale)
        .map_err(|err| PredictionError::InvalidConfig(format!("noise distribution: {err}")))
}

fn validate_start(current_price: f64) -> Result<(), PredictionError> {
    if !current_price.is_finite() || current_price <= 0.0 {
        return Err(PredictionError::InvalidPrice(format!(
            "current price must be positive, got {current_price}"
        )));
    }
    Ok(())
}

/// Random walk from the current price where day `d` grows by
/// `1 + drift(d) + noise`.
fn compound_walk(
    context: &PathContext<'_>,
    noise_scale: f64,
    rng: &mut dyn RngCore,
    drift: impl Fn(usize) -> f64,
) -> Result<Vec<f64>, PredictionError> {
    validate_start(context.current_price)?;
    let distribution = noise(context.base_volatility, noise_scale)?;

    let mut price = context.current_price;
    let mut path = Vec::with_capacity(context.horizon);
    for day in 0..context.horizon {
        let shock: f64 = rng.sample(distribution);
        price *= (1.0 + drift(day) + shock).max(MIN_GROWTH_FACTOR);
        path.push(price);
    }
    Ok(path)
}

/// Trend follower: small sinusoidal drift with damped noise.
#[derive(Clone, Debug)]
pub struct TrendFollowing {
    pub name: String,
    pub amplitude: f64,
    pub frequency: f64,
    pub noise_scale: f64,
}

impl Default for TrendFollowing {
    fn default() -> Self {
        Self {
            name: "bi_gru".to_string(),
            amplitude: 0.005,
            frequency: 0.1,
            noise_scale: 0.8,
        }
    }
}

impl PathGenerator for TrendFollowing {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        context: &PathContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f64>, PredictionError> {
        compound_walk(context, self.noise_scale, rng, |day| {
            (day as f64 * self.frequency).sin() * self.amplitude
        })
    }
}

/// Momentum model: pure noise, slightly amplified.
#[derive(Clone, Debug)]
pub struct Momentum {
    pub name: String,
    pub noise_scale: f64,
}

impl Default for Momentum {
    fn default() -> Self {
        Self {
            name: "tcn".to_string(),
            noise_scale: 1.1,
        }
    }
}

impl PathGenerator for Momentum {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        context: &PathContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f64>, PredictionError> {
        compound_walk(context, self.noise_scale, rng, |_| 0.0)
    }
}

/// Pattern model: cosine drift plus noise.
#[derive(Clone, Debug)]
pub struct Pattern {
    pub name: String,
    pub amplitude: f64,
    pub frequency: f64,
    pub noise_scale: f64,
}

impl Default for Pattern {
    fn default() -> Self {
        Self {
            name: "transformer".to_string(),
            amplitude: 0.003,
            frequency: 0.2,
            noise_scale: 0.9,
        }
    }
}

impl PathGenerator for Pattern {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        context: &PathContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f64>, PredictionError> {
        compound_walk(context, self.noise_scale, rng, |day| {
            (day as f64 * self.frequency).cos() * self.amplitude
        })
    }
}

/// Averages the member paths day by day, then applies an independent
/// per-day adjustment. Members must have run earlier in the same pass.
#[derive(Clone, Debug)]
pub struct Ensemble {
    pub name: String,
    pub members: Vec<String>,
    pub noise_scale: f64,
}

impl Default for Ensemble {
    fn default() -> Self {
        Self {
            name: ENSEMBLE_MODEL.to_string(),
            members: vec![
                "bi_gru".to_string(),
                "tcn".to_string(),
                "transformer".to_string(),
            ],
            noise_scale: 0.5,
        }
    }
}

impl PathGenerator for Ensemble {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        context: &PathContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f64>, PredictionError> {
        validate_start(context.current_price)?;
        if self.members.is_empty() {
            return Err(PredictionError::InvalidConfig(
                "ensemble needs at least one member".to_string(),
            ));
        }

        let member_paths = self
            .members
            .iter()
            .map(|member| {
                context
                    .prior_paths
                    .get(member)
                    .filter(|path| path.len() >= context.horizon)
                    .ok_or_else(|| {
                        PredictionError::InvalidConfig(format!(
                            "ensemble member {member} has no path for this run"
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let distribution = noise(context.base_volatility, self.noise_scale)?;
        let count = member_paths.len() as f64;
        let path: Vec<f64> = (0..context.horizon)
            .map(|day| {
                let average = member_paths.iter().map(|path| path[day]).sum::<f64>() / count;
                let adjustment: f64 = rng.sample(distribution);
                average * (1.0 + adjustment).max(MIN_GROWTH_FACTOR)
            })
            .collect();
        Ok(path)
    }
}

/// The four simulated models, in the order they consume randomness.
pub fn default_generators() -> Vec<Box<dyn PathGenerator>> {
    vec![
        Box::new(TrendFollowing::default()),
        Box::new(Momentum::default()),
        Box::new(Pattern::default()),
        Box::new(Ensemble::default()),
    ]
}

/// Run every generator in order and collect their paths by name.
pub fn generate_paths(
    generators: &[Box<dyn PathGenerator>],
    current_price: f64,
    horizon: usize,
    base_volatility: f64,
    sequence: &[Vec<f64>],
    rng: &mut dyn RngCore,
) -> Result<ModelPaths, PredictionError> {
    let mut paths = ModelPaths::new();
    for generator in generators {
        let context = PathContext::new(current_price, horizon, base_volatility, sequence, &paths);
        let path = generator.generate(&context, rng)?;
        if path.len() != horizon || path.iter().any(|price| !price.is_finite() || *price <= 0.0) {
            return Err(PredictionError::InvalidPrice(format!(
                "generator {} produced an invalid path",
                generator.name()
            )));
        }
        debug!(model = generator.name(), day_one = ?path.first(), "generated path");
        paths.insert(generator.name().to_string(), path);
    }
    Ok(paths)
}
