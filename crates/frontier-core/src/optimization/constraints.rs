use serde::{Deserialize, Serialize};

use crate::error::FrontierError;
use crate::FrontierResult;

/// Allowed deviation of `sum(w)` from 1 in a returned weight vector.
pub const SUM_TOLERANCE: f64 = 1e-6;

/// Allowed excursion of a returned weight outside its bounds.
pub const BOUND_TOLERANCE: f64 = 1e-9;

/// Slack on the feasibility precondition, absorbs rounding in `N * bound`.
const FEASIBILITY_SLACK: f64 = 1e-12;

const PROJECTION_ITERATIONS: usize = 200;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Linear equality constraint on the weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqualityConstraint {
    /// sum(w) = 1: fully invested, no leverage.
    #[default]
    FullInvestment,
}

/// Inclusive allocation range for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub lower: f64,
    pub upper: f64,
}

impl WeightBounds {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    fn clamp(&self, v: f64) -> f64 {
        v.max(self.lower).min(self.upper)
    }
}

/// Feasible set of the optimizer: `{ equality: sum(w) = 1, bounds: lo_i <= w_i <= hi_i }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConstraints {
    #[serde(default)]
    pub equality: EqualityConstraint,
    pub bounds: Vec<WeightBounds>,
}

impl WeightConstraints {
    /// Same `[min_weight, max_weight]` box for every asset.
    pub fn uniform(n_assets: usize, min_weight: f64, max_weight: f64) -> Self {
        Self {
            equality: EqualityConstraint::FullInvestment,
            bounds: vec![WeightBounds::new(min_weight, max_weight); n_assets],
        }
    }

    pub fn n_assets(&self) -> usize {
        self.bounds.len()
    }

    pub fn lower_sum(&self) -> f64 {
        self.bounds.iter().map(|b| b.lower).sum()
    }

    pub fn upper_sum(&self) -> f64 {
        self.bounds.iter().map(|b| b.upper).sum()
    }

    /// Verify the bounds can bracket full investment: every box is a valid
    /// long-only interval and `sum(lo) <= 1 <= sum(hi)`. For uniform bounds
    /// this is `N * min_weight <= 1 <= N * max_weight`.
    pub fn check_feasible(&self) -> FrontierResult<()> {
        if self.bounds.is_empty() {
            return Err(FrontierError::invalid("bounds", "No assets to allocate"));
        }
        for (i, b) in self.bounds.iter().enumerate() {
            if !b.lower.is_finite() || !b.upper.is_finite() {
                return Err(FrontierError::NonFiniteValue {
                    context: format!("bounds[{}]", i),
                });
            }
            if b.lower < 0.0 {
                return Err(FrontierError::invalid(
                    format!("bounds[{}].lower", i),
                    "Short positions are not allowed; lower bound must be >= 0",
                ));
            }
            if b.lower > b.upper {
                return Err(FrontierError::InvertedBounds {
                    index: i,
                    lower: b.lower,
                    upper: b.upper,
                });
            }
        }

        let lower_sum = self.lower_sum();
        let upper_sum = self.upper_sum();
        if lower_sum > 1.0 + FEASIBILITY_SLACK || upper_sum < 1.0 - FEASIBILITY_SLACK {
            return Err(FrontierError::InfeasibleConstraints {
                n_assets: self.n_assets(),
                lower_sum,
                upper_sum,
            });
        }
        Ok(())
    }

    /// Equal allocation, moved onto the feasible set when per-asset bounds
    /// exclude `1/N`. For uniform feasible bounds it is exactly `1/N` each.
    pub fn uniform_start(&self) -> Vec<f64> {
        let n = self.n_assets();
        let w = vec![1.0 / n as f64; n];
        if self.violation(&w) <= BOUND_TOLERANCE {
            w
        } else {
            self.project(&w)
        }
    }

    /// Euclidean projection onto the feasible set.
    ///
    /// The solution has the form `w_i = clamp(v_i - lambda, lo_i, hi_i)` for
    /// the unique shift `lambda` making the weights sum to 1; `lambda` is
    /// found by bisection since the sum is non-increasing in it. Assumes
    /// `check_feasible` has passed.
    pub fn project(&self, v: &[f64]) -> Vec<f64> {
        let shifted_sum = |lambda: f64| -> f64 {
            v.iter()
                .zip(self.bounds.iter())
                .map(|(vi, b)| b.clamp(vi - lambda))
                .sum()
        };

        // At `lo` every weight sits at its upper bound, at `hi` at its lower.
        let mut lo = v
            .iter()
            .zip(self.bounds.iter())
            .map(|(vi, b)| vi - b.upper)
            .fold(f64::INFINITY, f64::min);
        let mut hi = v
            .iter()
            .zip(self.bounds.iter())
            .map(|(vi, b)| vi - b.lower)
            .fold(f64::NEG_INFINITY, f64::max);

        for _ in 0..PROJECTION_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            if mid <= lo || mid >= hi {
                break;
            }
            if shifted_sum(mid) > 1.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let lambda = 0.5 * (lo + hi);
        v.iter()
            .zip(self.bounds.iter())
            .map(|(vi, b)| b.clamp(vi - lambda))
            .collect()
    }

    /// Largest violation: the budget residual or the worst bound excursion.
    pub fn violation(&self, w: &[f64]) -> f64 {
        let budget = (w.iter().sum::<f64>() - 1.0).abs();
        w.iter()
            .zip(self.bounds.iter())
            .map(|(wi, b)| (b.lower - wi).max(wi - b.upper).max(0.0))
            .fold(budget, f64::max)
    }

    /// Output contract of the optimizer: `|sum(w) - 1| <= 1e-6` and every
    /// weight within its bounds +/- 1e-9.
    pub fn validate_solution(&self, w: &[f64]) -> FrontierResult<()> {
        if w.len() != self.n_assets() {
            return Err(FrontierError::invalid(
                "weights",
                format!("Expected {} weights but got {}", self.n_assets(), w.len()),
            ));
        }
        let sum: f64 = w.iter().sum();
        if !sum.is_finite() || (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(FrontierError::invalid(
                "weights",
                format!("Weights sum to {}, expected 1", sum),
            ));
        }
        for (i, (wi, b)) in w.iter().zip(self.bounds.iter()).enumerate() {
            if *wi < b.lower - BOUND_TOLERANCE || *wi > b.upper + BOUND_TOLERANCE {
                return Err(FrontierError::invalid(
                    format!("weights[{}]", i),
                    format!("{} outside [{}, {}]", wi, b.lower, b.upper),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_five_assets_default_bounds_feasible() {
        // 5 * 0.05 = 0.25 <= 1 <= 1.75 = 5 * 0.35
        WeightConstraints::uniform(5, 0.05, 0.35)
            .check_feasible()
            .unwrap();
    }

    #[test]
    fn test_three_assets_high_floor_infeasible() {
        // 3 * 0.4 = 1.2 > 1
        let err = WeightConstraints::uniform(3, 0.4, 0.9)
            .check_feasible()
            .unwrap_err();
        match err {
            FrontierError::InfeasibleConstraints {
                n_assets,
                lower_sum,
                ..
            } => {
                assert_eq!(n_assets, 3);
                assert!((lower_sum - 1.2).abs() < 1e-12);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_low_ceiling_infeasible() {
        // 2 * 0.3 = 0.6 < 1
        assert!(matches!(
            WeightConstraints::uniform(2, 0.0, 0.3).check_feasible(),
            Err(FrontierError::InfeasibleConstraints { .. })
        ));
    }

    #[test]
    fn test_tight_bounds_feasible() {
        WeightConstraints::uniform(2, 0.5, 0.5)
            .check_feasible()
            .unwrap();
        WeightConstraints::uniform(3, 1.0 / 3.0, 1.0 / 3.0)
            .check_feasible()
            .unwrap();
    }

    #[test]
    fn test_inverted_bounds_are_a_constraint_error() {
        // Sums still bracket 1, but the second box is empty.
        let c = WeightConstraints {
            equality: Default::default(),
            bounds: vec![
                WeightBounds::new(0.0, 1.0),
                WeightBounds::new(0.3, 0.2),
                WeightBounds::new(0.0, 1.0),
            ],
        };
        let err = c.check_feasible().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Constraint);
        match err {
            FrontierError::InvertedBounds { index, lower, upper } => {
                assert_eq!(index, 1);
                assert_eq!(lower, 0.3);
                assert_eq!(upper, 0.2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_negative_lower_bound_rejected() {
        assert!(matches!(
            WeightConstraints::uniform(3, -0.1, 0.8).check_feasible(),
            Err(FrontierError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_uniform_start_is_equal_weight() {
        let c = WeightConstraints::uniform(4, 0.05, 0.35);
        assert_eq!(c.uniform_start(), vec![0.25; 4]);
    }

    #[test]
    fn test_uniform_start_respects_per_asset_bounds() {
        let c = WeightConstraints {
            equality: EqualityConstraint::FullInvestment,
            bounds: vec![
                WeightBounds::new(0.6, 0.9),
                WeightBounds::new(0.0, 0.5),
                WeightBounds::new(0.0, 0.5),
            ],
        };
        let w = c.uniform_start();
        c.validate_solution(&w).unwrap();
        assert!((w[0] - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_projection_lands_in_feasible_set() {
        let c = WeightConstraints::uniform(4, 0.05, 0.35);
        for v in [
            vec![1.0, 0.0, 0.0, 0.0],
            vec![-3.0, 2.0, 0.5, 0.1],
            vec![0.25, 0.25, 0.25, 0.25],
            vec![10.0, 10.0, 10.0, 10.0],
        ] {
            let w = c.project(&v);
            c.validate_solution(&w).unwrap();
            assert!(c.violation(&w) < 1e-12, "violation {}", c.violation(&w));
        }
    }

    #[test]
    fn test_projection_of_feasible_point_is_identity() {
        let c = WeightConstraints::uniform(3, 0.05, 0.6);
        let v = vec![0.2, 0.3, 0.5];
        let w = c.project(&v);
        for (a, b) in v.iter().zip(w.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_projection_caps_dominant_asset() {
        let c = WeightConstraints::uniform(3, 0.05, 0.6);
        let w = c.project(&[2.0, 0.0, 0.0]);
        assert!((w[0] - 0.6).abs() < 1e-12);
        assert!((w[1] - 0.2).abs() < 1e-12);
        assert!((w[2] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_validate_solution_tolerances() {
        let c = WeightConstraints::uniform(2, 0.05, 0.95);
        c.validate_solution(&[0.5, 0.5 + 5e-7]).unwrap();
        assert!(c.validate_solution(&[0.5, 0.5 + 5e-6]).is_err());
        assert!(c.validate_solution(&[0.04, 0.96]).is_err());
    }
}
