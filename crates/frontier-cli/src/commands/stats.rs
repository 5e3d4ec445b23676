use clap::Args;
use serde_json::Value;

use frontier_core::request;

use super::{load_request, HistoryArgs};

/// Arguments for return statistics estimation
#[derive(Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub history: HistoryArgs,
}

pub fn run_stats(args: StatsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let req = load_request(&args.history)?;
    let result = request::run_statistics(&req)?;
    Ok(serde_json::to_value(result)?)
}
