use clap::Args;
use serde_json::Value;

use frontier_core::frontier::{self, FrontierInput};

use crate::input;

/// Arguments for Monte-Carlo frontier sampling
#[derive(Args)]
pub struct FrontierArgs {
    /// Path to a JSON/YAML file with expected_returns and covariance_matrix
    #[arg(long)]
    pub input: Option<String>,

    /// Number of random portfolios, overriding the file
    #[arg(long)]
    pub samples: Option<usize>,

    /// RNG seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Risk-free rate per period, overriding the file
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<f64>,

    /// Sample across all cores
    #[arg(long)]
    pub parallel: bool,
}

pub fn run_frontier(args: FrontierArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut fr_input: FrontierInput = if let Some(ref path) = args.input {
        input::file::read_structured(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file.json> or stdin required for frontier sampling".into());
    };

    if let Some(n) = args.samples {
        fr_input.sample_count = n;
    }
    if args.seed.is_some() {
        fr_input.seed = args.seed;
    }
    if let Some(rf) = args.risk_free_rate {
        fr_input.risk_free_rate = rf;
    }
    if args.parallel {
        fr_input.parallel = true;
    }

    let result = frontier::run_frontier(&fr_input)?;
    Ok(serde_json::to_value(result)?)
}
