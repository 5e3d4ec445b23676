mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::allocate::AllocateArgs;
use commands::frontier::FrontierArgs;
use commands::optimize::OptimizeArgs;
use commands::stats::StatsArgs;

/// Risk-adjusted portfolio optimization and efficient frontier sampling
#[derive(Parser)]
#[command(
    name = "frontier",
    version,
    about = "Risk-adjusted portfolio optimization and efficient frontier sampling",
    long_about = "Estimates return statistics from a price or return history, finds the \
                  long-only allocation maximising the risk-adjusted ratio under per-asset \
                  bounds, and samples the efficient frontier by Monte-Carlo simulation."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log solver and sampler progress to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate mean returns and covariance from a price or return history
    Stats(StatsArgs),
    /// Maximise the risk-adjusted ratio for given mean returns and covariance
    Optimize(OptimizeArgs),
    /// Sample random portfolios to trace the efficient frontier
    Frontier(FrontierArgs),
    /// History to statistics, optimal weights and frontier in one run
    Allocate(AllocateArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Stats(args) => commands::stats::run_stats(args),
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Frontier(args) => commands::frontier::run_frontier(args),
        Commands::Allocate(args) => commands::allocate::run_allocate(args),
        Commands::Version => {
            println!("frontier {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
