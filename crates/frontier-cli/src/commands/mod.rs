pub mod allocate;
pub mod frontier;
pub mod optimize;
pub mod stats;

use clap::{Args, ValueEnum};
use chrono::NaiveDate;

use frontier_core::request::{AllocationRequest, PriceSeries};
use frontier_core::{AssetUniverse, ReturnMatrix};

use crate::input;

/// What the numeric columns of a CSV history hold.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum HistoryKind {
    #[default]
    Prices,
    Returns,
}

/// History source shared by `stats` and `allocate`.
#[derive(Args)]
pub struct HistoryArgs {
    /// Path to a request file (.json / .yaml) or a dated CSV table
    #[arg(long)]
    pub input: Option<String>,

    /// Whether CSV columns hold prices or periodic returns
    #[arg(long, value_enum, default_value = "prices")]
    pub kind: HistoryKind,

    /// Comma-separated tickers, overriding the CSV header or request file
    #[arg(long)]
    pub assets: Option<String>,

    /// First date of the price history to use (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// Last date of the price history to use (YYYY-MM-DD)
    #[arg(long)]
    pub end_date: Option<NaiveDate>,

    /// Periods per year to annualise statistics by (e.g. 252 for daily)
    #[arg(long)]
    pub annualisation: Option<u32>,
}

/// Build a request from a CSV table, a JSON/YAML request file or stdin,
/// then apply the history flags on top.
pub fn load_request(args: &HistoryArgs) -> Result<AllocationRequest, Box<dyn std::error::Error>> {
    let mut request: AllocationRequest = match args.input.as_deref() {
        Some(path) if input::file::is_csv(path) => request_from_csv(path, args.kind)?,
        Some(path) => input::file::read_structured(path)?,
        None => match input::stdin::read_stdin()? {
            Some(data) => serde_json::from_value(data)?,
            None => {
                return Err(
                    "--input <file.json|file.yaml|file.csv> or stdin required".into(),
                )
            }
        },
    };

    if let Some(ref tickers) = args.assets {
        let assets = AssetUniverse::parse(tickers)?;
        if assets.len() != request.assets.len() {
            return Err(format!(
                "--assets lists {} tickers but the history has {} columns",
                assets.len(),
                request.assets.len()
            )
            .into());
        }
        request.assets = assets;
    }
    if args.start_date.is_some() {
        request.start_date = args.start_date;
    }
    if args.end_date.is_some() {
        request.end_date = args.end_date;
    }
    if args.annualisation.is_some() {
        request.annualisation = args.annualisation;
    }
    Ok(request)
}

fn request_from_csv(
    path: &str,
    kind: HistoryKind,
) -> Result<AllocationRequest, Box<dyn std::error::Error>> {
    let table = input::file::read_history_csv(path)?;
    let assets = AssetUniverse::new(table.assets)?;
    let request = match kind {
        HistoryKind::Prices => AllocationRequest::from_prices(
            assets,
            PriceSeries {
                dates: table.dates,
                prices: table.rows,
            },
        ),
        HistoryKind::Returns => {
            // Incomplete return rows are dropped, as for prices.
            let rows: Vec<Vec<f64>> = table
                .rows
                .into_iter()
                .filter_map(|row| row.into_iter().collect::<Option<Vec<f64>>>())
                .collect();
            AllocationRequest::from_returns(assets, ReturnMatrix::from_rows(rows)?)
        }
    };
    Ok(request)
}
