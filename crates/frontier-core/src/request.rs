//! End-to-end allocation pipeline: prices or returns in, optimal weights and
//! a sampled frontier out. Every setting lives on the request; nothing is
//! read from process-wide state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FrontierError;
use crate::frontier::sampler::{sample_seeded, FrontierSample};
use crate::optimization::constraints::WeightConstraints;
use crate::optimization::max_ratio::{bound_warnings, maximize_ratio};
use crate::optimization::solver::{SolverSettings, StopReason};
use crate::portfolio::allocation::{
    build_allocations, diversification_ratio, format_allocation_summary, hhi_concentration,
    AssetAllocation,
};
use crate::portfolio::performance::PortfolioMetrics;
use crate::statistics::estimator::{estimate, AssetStatistics};
use crate::statistics::returns::{simple_returns, PriceHistory};
use crate::types::{
    with_metadata, AssetUniverse, ComputationOutput, ReturnMatrix, DEFAULT_MAX_WEIGHT,
    DEFAULT_MIN_WEIGHT, DEFAULT_RISK_FREE_RATE, DEFAULT_SAMPLE_COUNT,
};
use crate::FrontierResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Dated price rows for the request's assets, columns in universe order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceSeries {
    pub dates: Vec<NaiveDate>,
    pub prices: Vec<Vec<Option<f64>>>,
}

/// One allocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub assets: AssetUniverse,
    /// Periodic returns, T x N. Exactly one of `returns` / `prices`.
    #[serde(default)]
    pub returns: Option<ReturnMatrix>,
    #[serde(default)]
    pub prices: Option<PriceSeries>,
    /// Inclusive date range applied to `prices`.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    /// Preference in [0, 1]; when set, overrides `risk_free_rate` with
    /// `0.01 * (1 - risk_tolerance)`.
    #[serde(default)]
    pub risk_tolerance: Option<f64>,
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub solver: SolverSettings,
    /// Periods per year; when set, statistics are annualised before use.
    #[serde(default)]
    pub annualisation: Option<u32>,
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

fn default_sample_count() -> usize {
    DEFAULT_SAMPLE_COUNT
}

impl AllocationRequest {
    /// Request over `assets` from a return matrix, all other settings at
    /// their defaults.
    pub fn from_returns(assets: AssetUniverse, returns: ReturnMatrix) -> Self {
        Self::with_defaults(assets, Some(returns), None)
    }

    /// Request over `assets` from dated prices, all other settings at their
    /// defaults.
    pub fn from_prices(assets: AssetUniverse, prices: PriceSeries) -> Self {
        Self::with_defaults(assets, None, Some(prices))
    }

    fn with_defaults(
        assets: AssetUniverse,
        returns: Option<ReturnMatrix>,
        prices: Option<PriceSeries>,
    ) -> Self {
        Self {
            assets,
            returns,
            prices,
            start_date: None,
            end_date: None,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            risk_tolerance: None,
            min_weight: DEFAULT_MIN_WEIGHT,
            max_weight: DEFAULT_MAX_WEIGHT,
            sample_count: DEFAULT_SAMPLE_COUNT,
            seed: None,
            parallel: false,
            solver: SolverSettings::default(),
            annualisation: None,
        }
    }

    /// Risk-free rate in effect after applying `risk_tolerance`.
    pub fn effective_risk_free_rate(&self) -> FrontierResult<f64> {
        match self.risk_tolerance {
            Some(t) => risk_free_rate_for_tolerance(t),
            None if self.risk_free_rate.is_finite() => Ok(self.risk_free_rate),
            None => Err(FrontierError::NonFiniteValue {
                context: "risk_free_rate".into(),
            }),
        }
    }

    /// Return matrix for this request, derived from prices when needed.
    pub fn return_matrix(&self) -> FrontierResult<ReturnMatrix> {
        match (&self.returns, &self.prices) {
            (Some(returns), None) => Ok(returns.clone()),
            (None, Some(series)) => {
                let history = PriceHistory {
                    assets: self.assets.clone(),
                    dates: series.dates.clone(),
                    prices: series.prices.clone(),
                };
                history.validate()?;
                simple_returns(&history.within(self.start_date, self.end_date))
            }
            (Some(_), Some(_)) => Err(FrontierError::invalid(
                "returns",
                "Provide either returns or prices, not both",
            )),
            (None, None) => Err(FrontierError::invalid(
                "returns",
                "Either returns or prices must be provided",
            )),
        }
    }
}

/// Where the optimizer's allocation sits on the frontier chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrontierMarker {
    pub volatility: f64,
    pub expected_return: f64,
}

/// Per-asset estimate as used by the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub asset: String,
    pub mean_return: f64,
    pub volatility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSummary {
    pub observations: usize,
    /// Periods per year the statistics were scaled by, if any.
    pub annualisation: Option<u32>,
    pub assets: Vec<AssetSummary>,
    pub covariance: Vec<Vec<f64>>,
}

/// Full answer to an [`AllocationRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationReport {
    pub optimal_weights: Vec<AssetAllocation>,
    pub optimal_metrics: PortfolioMetrics,
    pub ratio: f64,
    pub risk_free_rate: f64,
    pub iterations: u32,
    pub stop_reason: StopReason,
    pub diversification_ratio: f64,
    pub hhi_concentration: f64,
    /// `"AAPL: 23.45%, MSFT: ..."`
    pub allocation_summary: String,
    pub optimal_marker: FrontierMarker,
    pub frontier: FrontierSample,
    pub statistics: StatisticsSummary,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// `0.01 * (1 - tolerance)`; tolerance must lie in [0, 1].
pub fn risk_free_rate_for_tolerance(tolerance: f64) -> FrontierResult<f64> {
    if !(0.0..=1.0).contains(&tolerance) {
        return Err(FrontierError::invalid(
            "risk_tolerance",
            format!("Must be within [0, 1], got {}", tolerance),
        ));
    }
    Ok(DEFAULT_RISK_FREE_RATE * (1.0 - tolerance))
}

/// Estimate the statistics a request would optimise over, without running
/// the optimizer or the sampler.
pub fn run_statistics(
    request: &AllocationRequest,
) -> FrontierResult<ComputationOutput<StatisticsSummary>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let (_, stats) = prepare(request, &mut warnings)?;
    let summary = summarise(&request.assets, &stats, request.annualisation);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sample mean and unbiased covariance of simple returns",
        &serde_json::json!({
            "n_assets": request.assets.len(),
            "start_date": request.start_date,
            "end_date": request.end_date,
            "annualisation": request.annualisation,
        }),
        warnings,
        elapsed,
        summary,
    ))
}

/// Run the whole pipeline: returns, statistics, constrained optimum, then
/// the Monte-Carlo frontier around it.
pub fn run_allocation(
    request: &AllocationRequest,
) -> FrontierResult<ComputationOutput<AllocationReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let (rf, stats) = prepare(request, &mut warnings)?;

    let constraints =
        WeightConstraints::uniform(request.assets.len(), request.min_weight, request.max_weight);
    let result = maximize_ratio(
        &stats.mean,
        &stats.covariance,
        rf,
        &constraints,
        &request.solver,
    )?;

    let frontier = sample_seeded(
        &stats.mean,
        &stats.covariance,
        rf,
        request.sample_count,
        request.seed,
        request.parallel,
    )?;
    if frontier.skipped > 0 {
        warnings.push(format!(
            "{} of {} sampled portfolios could not be evaluated and were excluded",
            frontier.skipped, request.sample_count
        ));
    }

    let vol = result.metrics.volatility;
    let optimal_weights =
        build_allocations(&request.assets, &result.weights, &stats.mean, &stats.covariance, vol);
    warnings.extend(bound_warnings(&request.assets, &result.weights, &constraints));
    if result.metrics.variance_clamped {
        warnings.push("Portfolio variance was negative through rounding and clamped to zero".into());
    }

    let report = AllocationReport {
        allocation_summary: format_allocation_summary(&optimal_weights),
        optimal_weights,
        optimal_marker: FrontierMarker {
            volatility: vol,
            expected_return: result.metrics.expected_return,
        },
        ratio: result.ratio,
        risk_free_rate: rf,
        iterations: result.iterations,
        stop_reason: result.stop_reason,
        diversification_ratio: diversification_ratio(&result.weights, &stats.volatility, vol),
        hhi_concentration: hhi_concentration(&result.weights),
        optimal_metrics: result.metrics,
        frontier,
        statistics: summarise(&request.assets, &stats, request.annualisation),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Maximum risk-adjusted ratio allocation with Monte-Carlo frontier",
        &serde_json::json!({
            "n_assets": request.assets.len(),
            "observations": stats.observations,
            "risk_free_rate": rf,
            "risk_tolerance": request.risk_tolerance,
            "min_weight": request.min_weight,
            "max_weight": request.max_weight,
            "sample_count": request.sample_count,
            "seed": request.seed,
            "annualisation": request.annualisation,
            "frontier_bounds": "unconstrained simplex",
        }),
        warnings,
        elapsed,
        report,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Effective risk-free rate and (optionally annualised) statistics.
fn prepare(
    request: &AllocationRequest,
    warnings: &mut Vec<String>,
) -> FrontierResult<(f64, AssetStatistics)> {
    let rf = request.effective_risk_free_rate()?;
    let returns = request.return_matrix()?;
    if request.returns.is_some() && (request.start_date.is_some() || request.end_date.is_some()) {
        warnings.push("Date range ignored: it applies to price input only".into());
    }

    let mut stats = estimate(&request.assets, &returns)?;
    if stats.is_ill_conditioned() {
        warnings.push(format!(
            "Only {} observations for {} assets: covariance estimate is ill-conditioned",
            stats.observations,
            stats.n_assets()
        ));
    }
    if let Some(k) = request.annualisation {
        stats = stats.annualise(k)?;
    }
    tracing::debug!(
        assets = stats.n_assets(),
        observations = stats.observations,
        risk_free_rate = rf,
        "statistics estimated"
    );
    Ok((rf, stats))
}

fn summarise(
    universe: &AssetUniverse,
    stats: &AssetStatistics,
    annualisation: Option<u32>,
) -> StatisticsSummary {
    StatisticsSummary {
        observations: stats.observations,
        annualisation,
        assets: universe
            .names()
            .iter()
            .enumerate()
            .map(|(i, name)| AssetSummary {
                asset: name.clone(),
                mean_return: stats.mean[i],
                volatility: stats.volatility[i],
            })
            .collect(),
        covariance: stats.covariance.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
