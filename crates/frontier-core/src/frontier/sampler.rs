use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FrontierError;
use crate::portfolio::performance::portfolio_performance;
use crate::statistics::estimator::validate_covariance;
use crate::types::{
    with_metadata, ComputationOutput, WeightVector, DEFAULT_RISK_FREE_RATE, DEFAULT_SAMPLE_COUNT,
    MAX_SAMPLE_COUNT,
};
use crate::FrontierResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One sampled portfolio: volatility on x, return on y, ratio as colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub volatility: f64,
    pub expected_return: f64,
    pub ratio: f64,
    pub weights: WeightVector,
}

/// Sampled cloud in generation order, plus the best-ratio sample.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrontierSample {
    pub points: Vec<FrontierPoint>,
    /// Index into `points` of the maximum ratio; first one wins ties.
    pub best_index: Option<usize>,
    /// Draws excluded because they could not be evaluated.
    pub skipped: usize,
}

impl FrontierSample {
    /// Monte-Carlo estimate of the best-ratio portfolio. Unconstrained by
    /// the optimizer's bounds, so not a substitute for its result.
    pub fn best(&self) -> Option<&FrontierPoint> {
        self.best_index.map(|i| &self.points[i])
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Input for a stand-alone frontier sampling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierInput {
    pub expected_returns: Vec<f64>,
    pub covariance_matrix: Vec<Vec<f64>>,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,
    /// Optional seed for reproducibility.
    pub seed: Option<u64>,
    /// Spread sampling over threads (requires the `parallel` feature).
    #[serde(default)]
    pub parallel: bool,
}

fn default_risk_free_rate() -> f64 {
    DEFAULT_RISK_FREE_RATE
}

fn default_sample_count() -> usize {
    DEFAULT_SAMPLE_COUNT
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// N uniform [0, 1) draws normalised to sum to 1: a point on the full
/// simplex, deliberately ignoring any per-asset bounds. `None` if every
/// draw was zero.
pub fn random_simplex_weights<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Option<WeightVector> {
    let raw: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        return None;
    }
    Some(raw.into_iter().map(|w| w / total).collect())
}

/// Draw `sample_count` random portfolios from `rng`, evaluate each, and
/// report the cloud with its best-ratio point.
///
/// Inputs are validated up front; an individual draw that cannot be
/// evaluated (zero volatility, degenerate draw) is skipped and counted
/// rather than failing the batch. `sample_count == 0` yields an empty sample;
/// more than [`MAX_SAMPLE_COUNT`] is rejected.
pub fn sample_frontier<R: Rng + ?Sized>(
    mean: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
    sample_count: usize,
    rng: &mut R,
) -> FrontierResult<FrontierSample> {
    validate_inputs(mean, covariance, risk_free_rate)?;
    validate_sample_count(sample_count)?;

    let mut sample = FrontierSample {
        points: Vec::with_capacity(sample_count),
        ..FrontierSample::default()
    };
    draw_into(mean, covariance, risk_free_rate, sample_count, rng, &mut sample);
    sample.best_index = best_index(&sample.points);

    tracing::debug!(
        requested = sample_count,
        kept = sample.points.len(),
        skipped = sample.skipped,
        "frontier sampled"
    );
    Ok(sample)
}

/// Run the sampler from a serialisable input, seeding from entropy when no
/// seed is given.
pub fn run_frontier(input: &FrontierInput) -> FrontierResult<ComputationOutput<FrontierSample>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let sample = sample_seeded(
        &input.expected_returns,
        &input.covariance_matrix,
        input.risk_free_rate,
        input.sample_count,
        input.seed,
        input.parallel,
    )?;

    if sample.skipped > 0 {
        warnings.push(format!(
            "{} of {} sampled portfolios could not be evaluated and were excluded",
            sample.skipped, input.sample_count
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monte-Carlo efficient frontier (uniform simplex sampling)",
        &serde_json::json!({
            "n_assets": input.expected_returns.len(),
            "risk_free_rate": input.risk_free_rate,
            "sample_count": input.sample_count,
            "seed": input.seed,
            "parallel": input.parallel,
        }),
        warnings,
        elapsed,
        sample,
    ))
}

/// Sample with a seed (entropy when `None`), sequentially or across threads.
pub(crate) fn sample_seeded(
    mean: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
    sample_count: usize,
    seed: Option<u64>,
    parallel: bool,
) -> FrontierResult<FrontierSample> {
    if parallel {
        return sample_parallel(mean, covariance, risk_free_rate, sample_count, seed);
    }
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    sample_frontier(mean, covariance, risk_free_rate, sample_count, &mut rng)
}

#[cfg(feature = "parallel")]
fn sample_parallel(
    mean: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
    sample_count: usize,
    seed: Option<u64>,
) -> FrontierResult<FrontierSample> {
    let seed = seed.unwrap_or_else(|| StdRng::from_entropy().gen());
    super::parallel::sample_frontier_parallel(mean, covariance, risk_free_rate, sample_count, seed)
}

#[cfg(not(feature = "parallel"))]
fn sample_parallel(
    _mean: &[f64],
    _covariance: &[Vec<f64>],
    _risk_free_rate: f64,
    _sample_count: usize,
    _seed: Option<u64>,
) -> FrontierResult<FrontierSample> {
    Err(FrontierError::invalid(
        "parallel",
        "Parallel sampling requires the `parallel` feature",
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Append `count` evaluated draws to `sample`, counting failures in `skipped`.
pub(crate) fn draw_into<R: Rng + ?Sized>(
    mean: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
    count: usize,
    rng: &mut R,
    sample: &mut FrontierSample,
) {
    let n = mean.len();
    for _ in 0..count {
        let Some(weights) = random_simplex_weights(n, rng) else {
            sample.skipped += 1;
            continue;
        };
        match portfolio_performance(&weights, mean, covariance, risk_free_rate) {
            Ok(m) => match m.ratio {
                Some(ratio) => sample.points.push(FrontierPoint {
                    volatility: m.volatility,
                    expected_return: m.expected_return,
                    ratio,
                    weights,
                }),
                None => sample.skipped += 1,
            },
            Err(e) => {
                tracing::warn!(error = %e, "frontier sample skipped");
                sample.skipped += 1;
            }
        }
    }
}

pub(crate) fn best_index(points: &[FrontierPoint]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in points.iter().enumerate() {
        if best.map_or(true, |(_, r)| p.ratio > r) {
            best = Some((i, p.ratio));
        }
    }
    best.map(|(i, _)| i)
}

pub(crate) fn validate_sample_count(sample_count: usize) -> FrontierResult<()> {
    if sample_count > MAX_SAMPLE_COUNT {
        return Err(FrontierError::invalid(
            "sample_count",
            format!("Must be at most {}, got {}", MAX_SAMPLE_COUNT, sample_count),
        ));
    }
    Ok(())
}

pub(crate) fn validate_inputs(
    mean: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
) -> FrontierResult<()> {
    if mean.is_empty() {
        return Err(FrontierError::invalid(
            "expected_returns",
            "At least one asset required",
        ));
    }
    if let Some(i) = mean.iter().position(|m| !m.is_finite()) {
        return Err(FrontierError::NonFiniteValue {
            context: format!("expected_returns[{}]", i),
        });
    }
    if !risk_free_rate.is_finite() {
        return Err(FrontierError::NonFiniteValue {
            context: "risk_free_rate".into(),
        });
    }
    validate_covariance(covariance, mean.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
