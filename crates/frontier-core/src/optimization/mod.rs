pub mod constraints;
pub mod max_ratio;
pub mod solver;

pub use constraints::{EqualityConstraint, WeightBounds, WeightConstraints};
pub use max_ratio::{
    maximize_ratio, maximize_ratio_from, optimize_portfolio, OptimizationInput,
    OptimizationOutput, OptimizationResult,
};
pub use solver::SolverSettings;
