//! Spectral projected gradient (SPG) minimiser over the budget-and-box set.
//!
//! Each iteration takes a Barzilai-Borwein trial step along the negative
//! gradient, projects back onto the feasible set and backtracks along the
//! projection arc until the Armijo condition holds. Every iterate is
//! feasible, so the equality and box constraints never need penalties.
//! The method is deterministic and only locally optimal.

use serde::{Deserialize, Serialize};

use super::constraints::WeightConstraints;
use crate::error::FrontierError;
use crate::FrontierResult;

const ARMIJO_C: f64 = 1e-4;
const MAX_BACKTRACKS: u32 = 60;
const MIN_STEP: f64 = 1e-12;
const MAX_STEP: f64 = 1e6;

fn default_max_iterations() -> u32 {
    500
}

fn default_tolerance() -> f64 {
    1e-9
}

fn default_ftol() -> f64 {
    1e-12
}

/// Iteration budget and convergence tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Maximum number of accepted steps.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Bound on the projected-gradient stationarity measure and on the step
    /// length for the objective-change criterion.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Relative objective change below which a small step counts as converged.
    #[serde(default = "default_ftol")]
    pub ftol: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            ftol: default_ftol(),
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> FrontierResult<()> {
        if self.max_iterations == 0 {
            return Err(FrontierError::invalid(
                "solver.max_iterations",
                "Must be at least 1",
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(FrontierError::invalid(
                "solver.tolerance",
                "Must be a positive number",
            ));
        }
        if !(self.ftol.is_finite() && self.ftol >= 0.0) {
            return Err(FrontierError::invalid(
                "solver.ftol",
                "Must be a non-negative number",
            ));
        }
        Ok(())
    }
}

/// Smooth function minimised by the solver. `None` marks a point where the
/// function is undefined; the line search treats it as infinitely bad.
pub trait Objective {
    fn value(&self, x: &[f64]) -> Option<f64>;
    fn gradient(&self, x: &[f64]) -> Option<Vec<f64>>;
}

/// Which criterion stopped the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Projected-gradient step fell below tolerance.
    Stationary,
    /// Objective and iterate both stopped moving.
    SmallChange,
    /// No further decrease is representable in floating point, and the
    /// iterate is stationary to within `sqrt(tolerance)`.
    LineSearchExhausted,
}

/// A converged solve.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: u32,
    pub stationarity: f64,
    pub stop_reason: StopReason,
}

/// Minimise `objective` over `constraints` from `start`.
///
/// The start point is projected onto the feasible set first. Fails with
/// `ZeroVolatility` when the objective is undefined at the start, and with
/// `ConvergenceFailure` (carrying the last iterate) when the budget runs out
/// or the line search breaks down away from a stationary point.
pub fn minimize<O: Objective>(
    objective: &O,
    constraints: &WeightConstraints,
    start: &[f64],
    settings: &SolverSettings,
    function: &str,
) -> FrontierResult<Solution> {
    settings.validate()?;

    let mut x = constraints.project(start);
    let mut f = objective
        .value(&x)
        .ok_or_else(|| FrontierError::ZeroVolatility {
            context: format!("{} start point", function),
        })?;
    let mut g = objective
        .gradient(&x)
        .ok_or_else(|| FrontierError::ZeroVolatility {
            context: format!("{} start point", function),
        })?;

    let mut stationarity = projected_step_norm(constraints, &x, &g);
    let mut step = initial_step(stationarity);

    for iteration in 0..settings.max_iterations {
        if stationarity <= settings.tolerance {
            return Ok(finish(x, f, iteration, stationarity, StopReason::Stationary, function));
        }

        let Some((x_new, f_new)) = line_search(objective, constraints, &x, f, &g, step) else {
            if stationarity <= settings.tolerance.sqrt() {
                return Ok(finish(
                    x,
                    f,
                    iteration,
                    stationarity,
                    StopReason::LineSearchExhausted,
                    function,
                ));
            }
            return Err(non_convergence(function, iteration, &x, f, constraints));
        };

        let Some(g_new) = objective.gradient(&x_new) else {
            return Err(non_convergence(function, iteration + 1, &x_new, f_new, constraints));
        };

        let s: Vec<f64> = x_new.iter().zip(x.iter()).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(g.iter()).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        let ss = dot(&s, &s);
        step = if sy > 0.0 {
            (ss / sy).clamp(MIN_STEP, MAX_STEP)
        } else {
            MAX_STEP
        };

        let step_norm = s.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let f_change = (f - f_new).abs();

        x = x_new;
        f = f_new;
        g = g_new;
        stationarity = projected_step_norm(constraints, &x, &g);

        tracing::trace!(
            function,
            iteration = iteration + 1,
            objective = f,
            stationarity,
            step,
            "solver iteration"
        );

        if f_change <= settings.ftol * f.abs().max(1.0) && step_norm <= settings.tolerance {
            return Ok(finish(
                x,
                f,
                iteration + 1,
                stationarity,
                StopReason::SmallChange,
                function,
            ));
        }
    }

    if stationarity <= settings.tolerance {
        return Ok(finish(
            x,
            f,
            settings.max_iterations,
            stationarity,
            StopReason::Stationary,
            function,
        ));
    }
    Err(non_convergence(function, settings.max_iterations, &x, f, constraints))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Backtrack along `P(x - t * g)` from the trial step until
/// `f(x_t) <= f(x) + c * g'(x_t - x)`.
fn line_search<O: Objective>(
    objective: &O,
    constraints: &WeightConstraints,
    x: &[f64],
    f: f64,
    g: &[f64],
    mut step: f64,
) -> Option<(Vec<f64>, f64)> {
    for _ in 0..MAX_BACKTRACKS {
        let trial: Vec<f64> = x.iter().zip(g.iter()).map(|(xi, gi)| xi - step * gi).collect();
        let x_t = constraints.project(&trial);
        let d: Vec<f64> = x_t.iter().zip(x.iter()).map(|(a, b)| a - b).collect();
        let decrease = dot(g, &d);
        if decrease >= 0.0 {
            // Projection collapsed the step; nothing left to gain along this arc.
            if d.iter().all(|v| *v == 0.0) {
                return None;
            }
        } else if let Some(f_t) = objective.value(&x_t) {
            if f_t <= f + ARMIJO_C * decrease {
                return Some((x_t, f_t));
            }
        }
        step *= 0.5;
        if step < MIN_STEP * 1e-6 {
            break;
        }
    }
    None
}

/// `||P(x - g) - x||_inf`, zero exactly at a first-order stationary point.
fn projected_step_norm(constraints: &WeightConstraints, x: &[f64], g: &[f64]) -> f64 {
    let trial: Vec<f64> = x.iter().zip(g.iter()).map(|(xi, gi)| xi - gi).collect();
    constraints
        .project(&trial)
        .iter()
        .zip(x.iter())
        .fold(0.0_f64, |m, (p, xi)| m.max((p - xi).abs()))
}

fn initial_step(stationarity: f64) -> f64 {
    if stationarity > 0.0 {
        (1.0 / stationarity).clamp(MIN_STEP, MAX_STEP)
    } else {
        1.0
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn finish(
    x: Vec<f64>,
    value: f64,
    iterations: u32,
    stationarity: f64,
    stop_reason: StopReason,
    function: &str,
) -> Solution {
    tracing::debug!(
        function,
        iterations,
        objective = value,
        stationarity,
        ?stop_reason,
        "solver converged"
    );
    Solution {
        x,
        value,
        iterations,
        stationarity,
        stop_reason,
    }
}

fn non_convergence(
    function: &str,
    iterations: u32,
    x: &[f64],
    value: f64,
    constraints: &WeightConstraints,
) -> FrontierError {
    let constraint_violation = constraints.violation(x);
    tracing::debug!(
        function,
        iterations,
        objective = value,
        constraint_violation,
        "solver did not converge"
    );
    FrontierError::ConvergenceFailure {
        function: function.to_string(),
        iterations,
        objective: value,
        constraint_violation,
        last_iterate: x.to_vec(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// sum_i (x_i - c_i)^2
    struct Distance {
        target: Vec<f64>,
    }

    impl Objective for Distance {
        fn value(&self, x: &[f64]) -> Option<f64> {
            Some(
                x.iter()
                    .zip(self.target.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum(),
            )
        }

        fn gradient(&self, x: &[f64]) -> Option<Vec<f64>> {
            Some(
                x.iter()
                    .zip(self.target.iter())
                    .map(|(a, b)| 2.0 * (a - b))
                    .collect(),
            )
        }
    }

    struct Undefined;

    impl Objective for Undefined {
        fn value(&self, _x: &[f64]) -> Option<f64> {
            None
        }

        fn gradient(&self, _x: &[f64]) -> Option<Vec<f64>> {
            None
        }
    }

    #[test]
    fn test_interior_minimum() {
        let c = WeightConstraints::uniform(3, 0.0, 1.0);
        let obj = Distance {
            target: vec![0.2, 0.3, 0.5],
        };
        let sol = minimize(&obj, &c, &[1.0 / 3.0; 3], &SolverSettings::default(), "test").unwrap();
        for (a, b) in sol.x.iter().zip(obj.target.iter()) {
            assert!((a - b).abs() < 1e-8, "{:?}", sol.x);
        }
    }

    #[test]
    fn test_minimum_on_bound() {
        // Target outside the box: solution is its projection.
        let c = WeightConstraints::uniform(3, 0.05, 0.6);
        let obj = Distance {
            target: vec![2.0, 0.0, 0.0],
        };
        let sol = minimize(&obj, &c, &[1.0 / 3.0; 3], &SolverSettings::default(), "test").unwrap();
        assert!((sol.x[0] - 0.6).abs() < 1e-9);
        assert!((sol.x[1] - 0.2).abs() < 1e-8);
        assert!((sol.x[2] - 0.2).abs() < 1e-8);
        c.validate_solution(&sol.x).unwrap();
    }

    #[test]
    fn test_budget_exhaustion_reports_last_iterate() {
        let c = WeightConstraints::uniform(3, 0.0, 1.0);
        let obj = Distance {
            target: vec![0.9, 0.05, 0.05],
        };
        let settings = SolverSettings {
            max_iterations: 1,
            tolerance: 1e-300,
            ftol: 0.0,
        };
        match minimize(&obj, &c, &[1.0 / 3.0; 3], &settings, "test") {
            Err(FrontierError::ConvergenceFailure {
                iterations,
                last_iterate,
                constraint_violation,
                ..
            }) => {
                assert_eq!(iterations, 1);
                assert_eq!(last_iterate.len(), 3);
                assert!(constraint_violation < 1e-9);
            }
            other => panic!("expected convergence failure, got {:?}", other),
        }
    }

    #[test]
    fn test_undefined_start_point() {
        let c = WeightConstraints::uniform(2, 0.0, 1.0);
        let err = minimize(&Undefined, &c, &[0.5, 0.5], &SolverSettings::default(), "test")
            .unwrap_err();
        assert!(matches!(err, FrontierError::ZeroVolatility { .. }));
    }

    #[test]
    fn test_invalid_settings() {
        let c = WeightConstraints::uniform(2, 0.0, 1.0);
        let obj = Distance {
            target: vec![0.5, 0.5],
        };
        let settings = SolverSettings {
            max_iterations: 0,
            ..SolverSettings::default()
        };
        assert!(minimize(&obj, &c, &[0.5, 0.5], &settings, "test").is_err());
    }

    #[test]
    fn test_settings_serde_defaults() {
        let s: SolverSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s, SolverSettings::default());
    }
}
