use clap::Args;
use serde_json::Value;

use frontier_core::request::{self, AllocationRequest};

use super::{load_request, HistoryArgs};

/// Arguments for the full allocation pipeline
#[derive(Args)]
pub struct AllocateArgs {
    #[command(flatten)]
    pub history: HistoryArgs,

    /// Risk tolerance in [0, 1]; sets the risk-free rate to 0.01 * (1 - tolerance)
    #[arg(long)]
    pub risk_tolerance: Option<f64>,

    /// Risk-free rate per period; replaces any risk tolerance in the input
    #[arg(long, allow_hyphen_values = true, conflicts_with = "risk_tolerance")]
    pub risk_free_rate: Option<f64>,

    /// Per-asset lower bound
    #[arg(long)]
    pub min_weight: Option<f64>,

    /// Per-asset upper bound
    #[arg(long)]
    pub max_weight: Option<f64>,

    /// Number of frontier samples
    #[arg(long)]
    pub samples: Option<usize>,

    /// RNG seed for a reproducible frontier
    #[arg(long)]
    pub seed: Option<u64>,

    /// Sample the frontier across all cores
    #[arg(long)]
    pub parallel: bool,

    /// Leave the sampled points out of the output, keeping the best sample
    #[arg(long)]
    pub omit_points: bool,
}

pub fn run_allocate(args: AllocateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut req = load_request(&args.history)?;
    apply_overrides(&args, &mut req);

    let mut output = request::run_allocation(&req)?;
    if args.omit_points {
        let frontier = &mut output.result.frontier;
        if let Some(i) = frontier.best_index.take() {
            let best = frontier.points.swap_remove(i);
            frontier.points = vec![best];
            frontier.best_index = Some(0);
        } else {
            frontier.points.clear();
        }
    }
    Ok(serde_json::to_value(output)?)
}

/// Command-line flags take precedence over the loaded request. An explicit
/// rate drops a tolerance set in the file, since tolerance would otherwise
/// decide the rate.
fn apply_overrides(args: &AllocateArgs, req: &mut AllocationRequest) {
    if args.risk_tolerance.is_some() {
        req.risk_tolerance = args.risk_tolerance;
    }
    if let Some(rf) = args.risk_free_rate {
        req.risk_free_rate = rf;
        req.risk_tolerance = None;
    }
    if let Some(lo) = args.min_weight {
        req.min_weight = lo;
    }
    if let Some(hi) = args.max_weight {
        req.max_weight = hi;
    }
    if let Some(n) = args.samples {
        req.sample_count = n;
    }
    if args.seed.is_some() {
        req.seed = args.seed;
    }
    if args.parallel {
        req.parallel = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use frontier_core::{AssetUniverse, ReturnMatrix};

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: AllocateArgs,
    }

    fn parse(flags: &[&str]) -> Result<AllocateArgs, clap::Error> {
        let argv = std::iter::once("allocate").chain(flags.iter().copied());
        Harness::try_parse_from(argv).map(|h| h.args)
    }

    fn file_request() -> AllocationRequest {
        let assets = AssetUniverse::parse("AAA, BBB").unwrap();
        let returns =
            ReturnMatrix::from_rows(vec![vec![0.01, -0.02], vec![-0.005, 0.01], vec![0.02, 0.0]])
                .unwrap();
        let mut req = AllocationRequest::from_returns(assets, returns);
        req.risk_tolerance = Some(0.5);
        req
    }

    #[test]
    fn test_explicit_rate_replaces_file_tolerance() {
        let args = parse(&["--risk-free-rate", "0.002"]).unwrap();
        let mut req = file_request();
        apply_overrides(&args, &mut req);
        assert_eq!(req.risk_tolerance, None);
        assert_eq!(req.effective_risk_free_rate().unwrap(), 0.002);
    }

    #[test]
    fn test_file_tolerance_kept_without_rate_flag() {
        let args = parse(&["--samples", "50"]).unwrap();
        let mut req = file_request();
        apply_overrides(&args, &mut req);
        assert_eq!(req.sample_count, 50);
        assert!((req.effective_risk_free_rate().unwrap() - 0.005).abs() < 1e-15);
    }

    #[test]
    fn test_rate_and_tolerance_flags_conflict() {
        assert!(parse(&["--risk-tolerance", "0.3", "--risk-free-rate", "0.01"]).is_err());
    }
}
