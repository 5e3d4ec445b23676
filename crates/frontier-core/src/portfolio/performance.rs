use serde::{Deserialize, Serialize};

use crate::error::FrontierError;
use crate::FrontierResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Risk/return summary of one weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    /// sqrt(w' * Sigma * w), never negative.
    pub volatility: f64,
    /// w' * mu.
    pub expected_return: f64,
    /// (return - rf) / volatility; `None` when volatility is zero, which marks
    /// the candidate as invalid.
    pub ratio: Option<f64>,
    /// The quadratic form came out negative through rounding and was clamped.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub variance_clamped: bool,
}

impl PortfolioMetrics {
    pub fn is_valid(&self) -> bool {
        self.ratio.is_some()
    }

    /// The ratio, or `ZeroVolatility` for an invalid candidate.
    pub fn require_ratio(&self, context: &str) -> FrontierResult<f64> {
        self.ratio.ok_or_else(|| FrontierError::ZeroVolatility {
            context: context.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Evaluate expected return, volatility and risk-adjusted ratio.
///
/// Fails fast on mismatched dimensions or non-finite inputs so NaN never
/// leaks into downstream metrics. A negative quadratic form is clamped to
/// zero and flagged rather than raised.
pub fn portfolio_performance(
    weights: &[f64],
    mean: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
) -> FrontierResult<PortfolioMetrics> {
    check_dimensions(weights, mean, covariance)?;
    if !risk_free_rate.is_finite() {
        return Err(FrontierError::NonFiniteValue {
            context: "risk_free_rate".into(),
        });
    }
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(FrontierError::NonFiniteValue {
            context: "weights".into(),
        });
    }

    let expected_return = vec_dot(weights, mean);
    let variance = quadratic_form(weights, covariance);
    if !expected_return.is_finite() || !variance.is_finite() {
        return Err(FrontierError::NonFiniteValue {
            context: "portfolio_performance".into(),
        });
    }

    let variance_clamped = variance < 0.0;
    if variance_clamped {
        tracing::warn!(variance, "negative portfolio variance clamped to zero");
    }
    let volatility = variance.max(0.0).sqrt();

    let ratio = if volatility > 0.0 {
        Some((expected_return - risk_free_rate) / volatility)
    } else {
        None
    };

    Ok(PortfolioMetrics {
        volatility,
        expected_return,
        ratio,
        variance_clamped,
    })
}

/// Gradient of the ratio with respect to the weights:
/// `mu / s - (w'mu - rf) * Sigma w / s^3`, where `s` is the volatility.
///
/// Returns `None` at a zero-volatility point, where the ratio is undefined.
/// Dimensions are assumed checked by the caller.
pub fn ratio_gradient(
    weights: &[f64],
    mean: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
) -> Option<Vec<f64>> {
    let sigma_w = mat_vec_multiply(covariance, weights);
    let variance = vec_dot(weights, &sigma_w);
    if variance.is_nan() || variance <= 0.0 {
        return None;
    }
    let vol = variance.sqrt();
    let excess = vec_dot(weights, mean) - risk_free_rate;
    let vol_cubed = variance * vol;
    Some(
        mean.iter()
            .zip(sigma_w.iter())
            .map(|(m, sw)| m / vol - excess * sw / vol_cubed)
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Matrix helpers
// ---------------------------------------------------------------------------

/// Matrix-vector multiplication.
pub(crate) fn mat_vec_multiply(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Dot product.
pub(crate) fn vec_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// w' * Sigma * w.
pub(crate) fn quadratic_form(w: &[f64], sigma: &[Vec<f64>]) -> f64 {
    vec_dot(w, &mat_vec_multiply(sigma, w))
}

fn check_dimensions(weights: &[f64], mean: &[f64], covariance: &[Vec<f64>]) -> FrontierResult<()> {
    let n = mean.len();
    if n == 0 {
        return Err(FrontierError::invalid("mean", "Mean vector is empty"));
    }
    if weights.len() != n {
        return Err(FrontierError::invalid(
            "weights",
            format!("Expected {} weights but got {}", n, weights.len()),
        ));
    }
    if covariance.len() != n || covariance.iter().any(|row| row.len() != n) {
        return Err(FrontierError::invalid(
            "covariance",
            format!("Expected a {}x{} matrix", n, n),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
