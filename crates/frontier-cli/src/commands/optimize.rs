use clap::Args;
use serde_json::Value;

use frontier_core::optimization::{self, OptimizationInput};

use crate::input;

/// Arguments for ratio maximisation over known statistics
#[derive(Args)]
pub struct OptimizeArgs {
    /// Path to a JSON/YAML file with assets, expected_returns and covariance_matrix
    #[arg(long)]
    pub input: Option<String>,

    /// Risk-free rate per period, overriding the file
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<f64>,

    /// Per-asset lower bound, overriding the file
    #[arg(long)]
    pub min_weight: Option<f64>,

    /// Per-asset upper bound, overriding the file
    #[arg(long)]
    pub max_weight: Option<f64>,

    /// Solver iteration budget, overriding the file
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut opt_input: OptimizationInput = if let Some(ref path) = args.input {
        input::file::read_structured(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file.json> or stdin required for optimization".into());
    };

    if let Some(rf) = args.risk_free_rate {
        opt_input.risk_free_rate = rf;
    }
    if let Some(lo) = args.min_weight {
        opt_input.min_weight = lo;
    }
    if let Some(hi) = args.max_weight {
        opt_input.max_weight = hi;
    }
    if let Some(n) = args.max_iterations {
        opt_input.solver.max_iterations = n;
    }

    let result = optimization::optimize_portfolio(&opt_input)?;
    Ok(serde_json::to_value(result)?)
}
