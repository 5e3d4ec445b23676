use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::FrontierError;
use crate::types::{AssetUniverse, CovarianceMatrix, MeanVector, ReturnMatrix};
use crate::FrontierResult;

/// Minimum number of return observations for an unbiased covariance.
pub const MIN_OBSERVATIONS: usize = 2;

/// Column variance at or below this is treated as zero.
pub const DEGENERATE_VARIANCE: f64 = 1e-14;

const SYMMETRY_TOLERANCE: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Sample statistics of one return history, computed once per request and
/// shared read-only by the optimizer and the frontier sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStatistics {
    /// Arithmetic mean periodic return per asset.
    pub mean: MeanVector,
    /// Unbiased (T-1) sample covariance.
    pub covariance: CovarianceMatrix,
    /// Per-asset sample standard deviation.
    pub volatility: Vec<f64>,
    /// Number of return rows the estimate is based on.
    pub observations: usize,
}

impl AssetStatistics {
    pub fn n_assets(&self) -> usize {
        self.mean.len()
    }

    /// True when there are no more observations than assets, in which case
    /// the covariance estimate is rank deficient or close to it.
    pub fn is_ill_conditioned(&self) -> bool {
        self.observations <= self.n_assets()
    }

    /// Scale periodic statistics to an annual horizon: mean by `k`,
    /// covariance by `k`, volatility by `sqrt(k)`.
    pub fn annualise(&self, periods_per_year: u32) -> FrontierResult<AssetStatistics> {
        if periods_per_year == 0 {
            return Err(FrontierError::invalid(
                "periods_per_year",
                "Must be at least 1",
            ));
        }
        let k = periods_per_year as f64;
        Ok(AssetStatistics {
            mean: self.mean.iter().map(|m| m * k).collect(),
            covariance: self
                .covariance
                .iter()
                .map(|row| row.iter().map(|c| c * k).collect())
                .collect(),
            volatility: self.volatility.iter().map(|v| v * k.sqrt()).collect(),
            observations: self.observations,
        })
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Arithmetic column mean.
pub fn compute_mean(returns: &ReturnMatrix) -> FrontierResult<MeanVector> {
    check_shape(returns)?;
    Ok((0..returns.n_assets())
        .map(|j| returns.column(j).iter().mean())
        .collect())
}

/// Unbiased sample covariance (divisor T-1). Symmetric by construction: only
/// the upper triangle is estimated and mirrored.
///
/// Fails with `DegenerateAsset` when any column has numerically zero
/// variance, since the resulting matrix would be singular.
pub fn compute_covariance(returns: &ReturnMatrix) -> FrontierResult<CovarianceMatrix> {
    check_shape(returns)?;
    let n = returns.n_assets();
    let columns: Vec<Vec<f64>> = (0..n).map(|j| returns.column(j)).collect();

    let mut cov = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let c = columns[i].iter().covariance(columns[j].iter());
            if !c.is_finite() {
                return Err(FrontierError::NonFiniteValue {
                    context: format!("covariance[{}][{}]", i, j),
                });
            }
            cov[i][j] = c;
            cov[j][i] = c;
        }
    }

    if let Some(i) = (0..n).find(|&i| cov[i][i] <= DEGENERATE_VARIANCE) {
        return Err(FrontierError::DegenerateAsset {
            asset: format!("asset[{}]", i),
            variance: cov[i][i],
        });
    }

    Ok(cov)
}

/// Estimate mean, covariance and per-asset volatility for a named universe.
pub fn estimate(universe: &AssetUniverse, returns: &ReturnMatrix) -> FrontierResult<AssetStatistics> {
    if returns.n_observations() > 0 && returns.n_assets() != universe.len() {
        return Err(FrontierError::MisalignedSeries(format!(
            "Return matrix has {} columns but the universe has {} assets",
            returns.n_assets(),
            universe.len()
        )));
    }

    let mean = compute_mean(returns)?;
    let covariance = compute_covariance(returns).map_err(|e| match e {
        FrontierError::DegenerateAsset { asset, variance } => FrontierError::DegenerateAsset {
            asset: asset_label(universe, &asset),
            variance,
        },
        other => other,
    })?;
    let volatility = (0..covariance.len()).map(|i| covariance[i][i].sqrt()).collect();

    Ok(AssetStatistics {
        mean,
        covariance,
        volatility,
        observations: returns.n_observations(),
    })
}

/// Check a caller-supplied covariance matrix: N x N, finite, symmetric.
#[allow(clippy::needless_range_loop)]
pub fn validate_covariance(cov: &[Vec<f64>], n: usize) -> FrontierResult<()> {
    if cov.len() != n {
        return Err(FrontierError::invalid(
            "covariance",
            format!("Expected {}x{} matrix but got {} rows", n, n, cov.len()),
        ));
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(FrontierError::invalid(
                "covariance",
                format!("Row {} has {} columns, expected {}", i, row.len(), n),
            ));
        }
        if let Some(j) = row.iter().position(|v| !v.is_finite()) {
            return Err(FrontierError::NonFiniteValue {
                context: format!("covariance[{}][{}]", i, j),
            });
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            if (cov[i][j] - cov[j][i]).abs() > SYMMETRY_TOLERANCE {
                return Err(FrontierError::invalid(
                    "covariance",
                    format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                ));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_shape(returns: &ReturnMatrix) -> FrontierResult<()> {
    if returns.n_observations() < MIN_OBSERVATIONS {
        return Err(FrontierError::InsufficientData {
            observations: returns.n_observations(),
            required: MIN_OBSERVATIONS,
        });
    }
    if returns.n_assets() == 0 {
        return Err(FrontierError::invalid("returns", "Return rows are empty"));
    }
    Ok(())
}

/// Map the positional `asset[i]` label back to the universe name.
fn asset_label(universe: &AssetUniverse, positional: &str) -> String {
    positional
        .strip_prefix("asset[")
        .and_then(|s| s.strip_suffix(']'))
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&i| i < universe.len())
        .map(|i| universe.name(i).to_string())
        .unwrap_or_else(|| positional.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
