use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::constraints::{WeightBounds, WeightConstraints, BOUND_TOLERANCE};
use super::solver::{self, Objective, SolverSettings, StopReason};
use crate::error::FrontierError;
use crate::portfolio::allocation::{
    build_allocations, diversification_ratio, format_allocation_summary, hhi_concentration,
    AssetAllocation,
};
use crate::portfolio::performance::{portfolio_performance, ratio_gradient, PortfolioMetrics};
use crate::statistics::estimator::validate_covariance;
use crate::types::{
    with_metadata, AssetUniverse, ComputationOutput, WeightVector, DEFAULT_MAX_WEIGHT,
    DEFAULT_MIN_WEIGHT, DEFAULT_RISK_FREE_RATE,
};
use crate::FrontierResult;

const FUNCTION: &str = "maximize_ratio";

/// Distance from a bound within which a weight counts as pinned.
const PIN_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input to named-asset ratio maximisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationInput {
    /// Asset identifiers.
    pub assets: AssetUniverse,
    /// Mean periodic return per asset.
    pub expected_returns: Vec<f64>,
    /// N x N covariance matrix.
    pub covariance_matrix: Vec<Vec<f64>>,
    /// Risk-free rate per period (default 0.01).
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    /// Lower bound applied to every asset (default 0.05).
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
    /// Upper bound applied to every asset (default 0.35).
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
    /// Per-asset bounds, overriding `min_weight` / `max_weight`.
    #[serde(default)]
    pub bounds: Option<Vec<WeightBounds>>,
    /// Start point; equal weights when absent.
    #[serde(default)]
    pub start: Option<Vec<f64>>,
    #[serde(default)]
    pub solver: SolverSettings,
}

fn default_risk_free_rate() -> f64 {
    DEFAULT_RISK_FREE_RATE
}

fn default_min_weight() -> f64 {
    DEFAULT_MIN_WEIGHT
}

fn default_max_weight() -> f64 {
    DEFAULT_MAX_WEIGHT
}

impl OptimizationInput {
    pub fn constraints(&self) -> WeightConstraints {
        match &self.bounds {
            Some(bounds) => WeightConstraints {
                equality: Default::default(),
                bounds: bounds.clone(),
            },
            None => WeightConstraints::uniform(self.assets.len(), self.min_weight, self.max_weight),
        }
    }
}

/// A locally optimal, validated allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub weights: WeightVector,
    pub metrics: PortfolioMetrics,
    /// Ratio at the optimum (always defined for a returned result).
    pub ratio: f64,
    pub iterations: u32,
    /// Projected-gradient stationarity at the returned point.
    pub stationarity: f64,
    pub stop_reason: StopReason,
}

/// Output of named-asset ratio maximisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationOutput {
    pub optimal_weights: Vec<AssetAllocation>,
    pub portfolio_return: f64,
    pub portfolio_risk: f64,
    pub ratio: f64,
    pub iterations: u32,
    pub stop_reason: StopReason,
    /// Weighted average vol / portfolio vol.
    pub diversification_ratio: f64,
    /// Herfindahl-Hirschman index of weights.
    pub hhi_concentration: f64,
    /// `"AAPL: 23.45%, ..."`
    pub allocation_summary: String,
}

/// Negated risk-adjusted ratio; undefined where volatility is zero.
struct NegatedRatio<'a> {
    mean: &'a [f64],
    covariance: &'a [Vec<f64>],
    risk_free_rate: f64,
}

impl Objective for NegatedRatio<'_> {
    fn value(&self, x: &[f64]) -> Option<f64> {
        portfolio_performance(x, self.mean, self.covariance, self.risk_free_rate)
            .ok()
            .and_then(|m| m.ratio)
            .map(|r| -r)
    }

    fn gradient(&self, x: &[f64]) -> Option<Vec<f64>> {
        ratio_gradient(x, self.mean, self.covariance, self.risk_free_rate)
            .map(|g| g.into_iter().map(|v| -v).collect())
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Find the weights maximising `(w'mu - rf) / sqrt(w' Sigma w)` subject to
/// full investment and per-asset bounds, starting from equal weights.
///
/// Only a local optimum is promised. Infeasible bounds are rejected before
/// any solver iteration; budget exhaustion surfaces as `ConvergenceFailure`
/// with the last iterate (its `objective` is the negated ratio).
pub fn maximize_ratio(
    mean: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
    constraints: &WeightConstraints,
    settings: &SolverSettings,
) -> FrontierResult<OptimizationResult> {
    validate_problem(mean, covariance, risk_free_rate, constraints)?;
    let start = constraints.uniform_start();
    solve(mean, covariance, risk_free_rate, constraints, settings, &start)
}

/// As [`maximize_ratio`], from a caller-supplied start point. The start is
/// projected onto the feasible set if it lies outside.
pub fn maximize_ratio_from(
    mean: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
    constraints: &WeightConstraints,
    settings: &SolverSettings,
    start: &[f64],
) -> FrontierResult<OptimizationResult> {
    validate_problem(mean, covariance, risk_free_rate, constraints)?;
    if start.len() != mean.len() {
        return Err(FrontierError::invalid(
            "start",
            format!("Expected {} weights but got {}", mean.len(), start.len()),
        ));
    }
    if start.iter().any(|v| !v.is_finite()) {
        return Err(FrontierError::NonFiniteValue {
            context: "start".into(),
        });
    }
    solve(mean, covariance, risk_free_rate, constraints, settings, start)
}

/// Named-asset optimisation with contributions, concentration measures and
/// a display summary, wrapped in the standard output envelope.
pub fn optimize_portfolio(
    input: &OptimizationInput,
) -> FrontierResult<ComputationOutput<OptimizationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let n = input.assets.len();
    if input.expected_returns.len() != n {
        return Err(FrontierError::invalid(
            "expected_returns",
            format!(
                "Expected {} returns but got {}",
                n,
                input.expected_returns.len()
            ),
        ));
    }

    let constraints = input.constraints();
    let mu = &input.expected_returns;
    let sigma = &input.covariance_matrix;
    let rf = input.risk_free_rate;

    let result = match &input.start {
        Some(w0) => maximize_ratio_from(mu, sigma, rf, &constraints, &input.solver, w0)?,
        None => maximize_ratio(mu, sigma, rf, &constraints, &input.solver)?,
    };

    let asset_vols: Vec<f64> = (0..n).map(|i| sigma[i][i].max(0.0).sqrt()).collect();
    let vol = result.metrics.volatility;
    let optimal_weights = build_allocations(&input.assets, &result.weights, mu, sigma, vol);

    warnings.extend(bound_warnings(&input.assets, &result.weights, &constraints));
    if result.metrics.variance_clamped {
        warnings.push("Portfolio variance was negative through rounding and clamped to zero".into());
    }

    let output = OptimizationOutput {
        allocation_summary: format_allocation_summary(&optimal_weights),
        optimal_weights,
        portfolio_return: result.metrics.expected_return,
        portfolio_risk: vol,
        ratio: result.ratio,
        iterations: result.iterations,
        stop_reason: result.stop_reason,
        diversification_ratio: diversification_ratio(&result.weights, &asset_vols, vol),
        hhi_concentration: hhi_concentration(&result.weights),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Maximum risk-adjusted ratio (spectral projected gradient)",
        &serde_json::json!({
            "n_assets": n,
            "risk_free_rate": rf,
            "bounds": constraints.bounds,
            "max_iterations": input.solver.max_iterations,
            "tolerance": input.solver.tolerance,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Warnings for assets pinned at their lower or upper bound, which usually
/// means the bound rather than the statistics decided their weight. Fixed
/// boxes (`lower == upper`) are not reported.
pub(crate) fn bound_warnings(
    assets: &AssetUniverse,
    weights: &[f64],
    constraints: &WeightConstraints,
) -> Vec<String> {
    let mut warnings = Vec::new();
    for (i, (w, b)) in weights.iter().zip(constraints.bounds.iter()).enumerate() {
        if b.upper <= b.lower {
            continue;
        }
        let pinned = if (w - b.upper).abs() <= PIN_TOLERANCE {
            Some(("upper", b.upper))
        } else if (w - b.lower).abs() <= PIN_TOLERANCE {
            Some(("lower", b.lower))
        } else {
            None
        };
        if let Some((side, bound)) = pinned {
            warnings.push(format!(
                "{} is at its {} bound {:.4}",
                assets.name(i),
                side,
                bound
            ));
        }
    }
    warnings
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn solve(
    mean: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
    constraints: &WeightConstraints,
    settings: &SolverSettings,
    start: &[f64],
) -> FrontierResult<OptimizationResult> {
    let objective = NegatedRatio {
        mean,
        covariance,
        risk_free_rate,
    };
    let solution = solver::minimize(&objective, constraints, start, settings, FUNCTION)?;

    constraints.validate_solution(&solution.x)?;
    let metrics = portfolio_performance(&solution.x, mean, covariance, risk_free_rate)?;
    let ratio = metrics.require_ratio(FUNCTION)?;

    Ok(OptimizationResult {
        weights: solution.x,
        metrics,
        ratio,
        iterations: solution.iterations,
        stationarity: solution.stationarity,
        stop_reason: solution.stop_reason,
    })
}

fn validate_problem(
    mean: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
    constraints: &WeightConstraints,
) -> FrontierResult<()> {
    let n = mean.len();
    if n == 0 {
        return Err(FrontierError::invalid("mean", "At least one asset required"));
    }
    if let Some(i) = mean.iter().position(|m| !m.is_finite()) {
        return Err(FrontierError::NonFiniteValue {
            context: format!("mean[{}]", i),
        });
    }
    if !risk_free_rate.is_finite() {
        return Err(FrontierError::NonFiniteValue {
            context: "risk_free_rate".into(),
        });
    }
    validate_covariance(covariance, n)?;
    if constraints.n_assets() != n {
        return Err(FrontierError::invalid(
            "bounds",
            format!("Expected {} bounds but got {}", n, constraints.n_assets()),
        ));
    }
    constraints.check_feasible()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn diag(v: &[f64]) -> Vec<Vec<f64>> {
        (0..v.len())
            .map(|i| (0..v.len()).map(|j| if i == j { v[i] } else { 0.0 }).collect())
            .collect()
    }

    fn three_asset() -> (Vec<f64>, Vec<Vec<f64>>) {
        let v1 = 0.15;
        let v2 = 0.20;
        let v3 = 0.25;
        let c12 = 0.3 * v1 * v2;
        let c13 = 0.1 * v1 * v3;
        let c23 = 0.5 * v2 * v3;
        (
            vec![0.10, 0.04, 0.07],
            vec![
                vec![v1 * v1, c12, c13],
                vec![c12, v2 * v2, c23],
                vec![c13, c23, v3 * v3],
            ],
        )
    }

    fn assert_contract(w: &[f64], lo: f64, hi: f64) {
        let sum: f64 = w.iter().sum();
        assert!((sum - 1.0).abs() <= 1e-6, "sum {}", sum);
        for wi in w {
            assert!(*wi >= lo - BOUND_TOLERANCE && *wi <= hi + BOUND_TOLERANCE, "{:?}", w);
        }
    }

    #[test]
    fn test_highest_mean_asset_pushed_to_upper_bound() {
        let mean = vec![0.0010, 0.0008, 0.0012];
        let cov = diag(&[1e-4, 1e-4, 1e-5]);
        let c = WeightConstraints::uniform(3, 0.05, 0.6);
        let r = maximize_ratio(&mean, &cov, 0.0, &c, &SolverSettings::default()).unwrap();
        assert_contract(&r.weights, 0.05, 0.6);
        assert!((r.weights[2] - 0.6).abs() < 1e-6, "{:?}", r.weights);
        assert!(r.weights[0] > r.weights[1]);
    }

    #[test]
    fn test_improves_on_uniform_start() {
        let (mean, cov) = three_asset();
        let c = WeightConstraints::uniform(3, 0.05, 0.6);
        let r = maximize_ratio(&mean, &cov, 0.02, &c, &SolverSettings::default()).unwrap();
        let uniform = portfolio_performance(&[1.0 / 3.0; 3], &mean, &cov, 0.02)
            .unwrap()
            .ratio
            .unwrap();
        assert!(r.ratio >= uniform, "{} < {}", r.ratio, uniform);
        assert_contract(&r.weights, 0.05, 0.6);
    }

    #[test]
    fn test_two_asset_matches_closed_form() {
        // Uncorrelated assets, wide bounds: w ~ Sigma^-1 (mu - rf).
        let mean = vec![0.08, 0.05];
        let cov = diag(&[0.04, 0.01]);
        let c = WeightConstraints::uniform(2, 0.0, 1.0);
        let r = maximize_ratio(&mean, &cov, 0.01, &c, &SolverSettings::default()).unwrap();
        let raw = [0.07 / 0.04, 0.04 / 0.01];
        let total: f64 = raw.iter().sum();
        assert!((r.weights[0] - raw[0] / total).abs() < 1e-6, "{:?}", r.weights);
        assert!((r.weights[1] - raw[1] / total).abs() < 1e-6, "{:?}", r.weights);
    }

    #[test]
    fn test_deterministic() {
        let (mean, cov) = three_asset();
        let c = WeightConstraints::uniform(3, 0.05, 0.6);
        let s = SolverSettings::default();
        let a = maximize_ratio(&mean, &cov, 0.01, &c, &s).unwrap();
        let b = maximize_ratio(&mean, &cov, 0.01, &c, &s).unwrap();
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn test_infeasible_bounds_rejected_before_solve() {
        let (mean, cov) = three_asset();
        let c = WeightConstraints::uniform(3, 0.4, 0.9);
        // A zero budget would fail validation if the solver were reached.
        let s = SolverSettings {
            max_iterations: 0,
            ..SolverSettings::default()
        };
        let err = maximize_ratio(&mean, &cov, 0.01, &c, &s).unwrap_err();
        assert!(matches!(err, FrontierError::InfeasibleConstraints { .. }));
    }

    #[test]
    fn test_budget_exhaustion_is_error() {
        let (mean, cov) = three_asset();
        let c = WeightConstraints::uniform(3, 0.05, 0.6);
        let s = SolverSettings {
            max_iterations: 1,
            tolerance: 1e-300,
            ftol: 0.0,
        };
        match maximize_ratio(&mean, &cov, 0.01, &c, &s).unwrap_err() {
            FrontierError::ConvergenceFailure {
                function,
                last_iterate,
                objective,
                ..
            } => {
                assert_eq!(function, "maximize_ratio");
                assert_eq!(last_iterate.len(), 3);
                assert!(objective.is_finite());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_perfect_hedge_has_no_defined_start() {
        // Equal weights cancel exactly: the uniform start has zero volatility.
        let mean = vec![0.001, 0.002];
        let cov = vec![vec![1e-4, -1e-4], vec![-1e-4, 1e-4]];
        let c = WeightConstraints::uniform(2, 0.05, 0.95);
        let err = maximize_ratio(&mean, &cov, 0.0, &c, &SolverSettings::default()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Numerical);
        match err {
            FrontierError::ZeroVolatility { context } => {
                assert_eq!(context, "maximize_ratio start point")
            }
            other => panic!("expected ZeroVolatility, got {other}"),
        }
    }

    #[test]
    fn test_hedged_pair_diverges_with_last_iterate() {
        // Assets 0 and 1 hedge each other; with a zero floor the ratio grows
        // without bound towards w = (0.5, 0.5, 0).
        let mean = vec![0.0010, 0.0008, 0.0012];
        let cov = vec![
            vec![1e-4, -1e-4, 0.0],
            vec![-1e-4, 1e-4, 0.0],
            vec![0.0, 0.0, 1e-5],
        ];
        let c = WeightConstraints::uniform(3, 0.0, 1.0);
        let err = maximize_ratio(&mean, &cov, 0.0, &c, &SolverSettings::default()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Convergence);
        match err {
            FrontierError::ConvergenceFailure {
                last_iterate,
                objective,
                constraint_violation,
                ..
            } => {
                assert_eq!(last_iterate.len(), 3);
                assert!(constraint_violation <= BOUND_TOLERANCE);
                assert!(last_iterate[2] < 1e-3, "{:?}", last_iterate);
                assert!((last_iterate[0] - last_iterate[1]).abs() < 1e-3, "{:?}", last_iterate);
                assert!(objective < -1e4, "objective {}", objective);
            }
            other => panic!("expected ConvergenceFailure, got {other}"),
        }
    }

    #[test]
    fn test_start_point_is_used() {
        let (mean, cov) = three_asset();
        let c = WeightConstraints::uniform(3, 0.05, 0.6);
        let s = SolverSettings::default();
        let a = maximize_ratio_from(&mean, &cov, 0.01, &c, &s, &[0.6, 0.35, 0.05]).unwrap();
        let b = maximize_ratio_from(&mean, &cov, 0.01, &c, &s, &[0.6, 0.35, 0.05]).unwrap();
        assert_eq!(a.weights, b.weights);
        assert!(maximize_ratio_from(&mean, &cov, 0.01, &c, &s, &[0.5, 0.5]).is_err());
    }

    #[test]
    fn test_bounds_dimension_mismatch() {
        let (mean, cov) = three_asset();
        let c = WeightConstraints::uniform(4, 0.05, 0.6);
        assert!(matches!(
            maximize_ratio(&mean, &cov, 0.01, &c, &SolverSettings::default()),
            Err(FrontierError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_optimize_portfolio_envelope() {
        let (mean, cov) = three_asset();
        let input = OptimizationInput {
            assets: AssetUniverse::parse("Equity, Bonds, Commodities").unwrap(),
            expected_returns: mean,
            covariance_matrix: cov,
            risk_free_rate: 0.02,
            min_weight: 0.05,
            max_weight: 0.6,
            bounds: None,
            start: None,
            solver: SolverSettings::default(),
        };
        let out = optimize_portfolio(&input).unwrap();
        let res = &out.result;
        assert_eq!(res.optimal_weights.len(), 3);
        assert!(res.allocation_summary.starts_with("Equity: "));
        let expected = (res.portfolio_return - 0.02) / res.portfolio_risk;
        assert!((res.ratio - expected).abs() < 1e-12);
        let rc: f64 = res.optimal_weights.iter().map(|a| a.contribution_to_risk).sum();
        assert!((rc - res.portfolio_risk).abs() < 1e-9);
        assert!(res.hhi_concentration > 1.0 / 3.0 - 1e-9);
    }

    #[test]
    fn test_bound_warnings_cover_both_sides() {
        let assets = AssetUniverse::parse("AAA, BBB, CCC").unwrap();
        let c = WeightConstraints::uniform(3, 0.05, 0.6);
        let warnings = bound_warnings(&assets, &[0.6, 0.35, 0.05], &c);
        assert_eq!(
            warnings,
            vec![
                "AAA is at its upper bound 0.6000".to_string(),
                "CCC is at its lower bound 0.0500".to_string(),
            ]
        );

        let fixed = WeightConstraints::uniform(2, 0.5, 0.5);
        let two = AssetUniverse::parse("AAA, BBB").unwrap();
        assert!(bound_warnings(&two, &[0.5, 0.5], &fixed).is_empty());
    }

    #[test]
    fn test_input_serde_defaults() {
        let input: OptimizationInput = serde_json::from_str(
            r#"{
                "assets": ["A", "B"],
                "expected_returns": [0.01, 0.02],
                "covariance_matrix": [[0.04, 0.0], [0.0, 0.09]]
            }"#,
        )
        .unwrap();
        assert_eq!(input.risk_free_rate, 0.01);
        assert_eq!(input.min_weight, 0.05);
        assert_eq!(input.max_weight, 0.35);
        assert_eq!(input.solver, SolverSettings::default());
    }
}
