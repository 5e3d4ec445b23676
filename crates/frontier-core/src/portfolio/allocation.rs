use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::performance::mat_vec_multiply;
use crate::types::AssetUniverse;

/// One asset's share of a portfolio, with its risk and return contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub asset: String,
    pub weight: f64,
    /// Weight as a percentage rounded to two decimals, for display.
    pub weight_pct: Decimal,
    /// Weight times mean return.
    pub contribution_to_return: f64,
    /// Weight times marginal risk contribution; sums to portfolio volatility.
    pub contribution_to_risk: f64,
}

/// Named allocation with per-asset contributions.
pub fn build_allocations(
    universe: &AssetUniverse,
    weights: &[f64],
    mean: &[f64],
    covariance: &[Vec<f64>],
    volatility: f64,
) -> Vec<AssetAllocation> {
    let sigma_w = mat_vec_multiply(covariance, weights);
    universe
        .names()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mcr = if volatility > 0.0 {
                sigma_w[i] / volatility
            } else {
                0.0
            };
            AssetAllocation {
                asset: name.clone(),
                weight: weights[i],
                weight_pct: percent(weights[i]),
                contribution_to_return: weights[i] * mean[i],
                contribution_to_risk: weights[i] * mcr,
            }
        })
        .collect()
}

/// `"AAPL: 23.45%, MSFT: 18.00%"`.
pub fn format_allocation_summary(allocations: &[AssetAllocation]) -> String {
    allocations
        .iter()
        .map(|a| format!("{}: {:.2}%", a.asset, a.weight * 100.0))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Herfindahl-Hirschman index of the weights.
pub fn hhi_concentration(weights: &[f64]) -> f64 {
    weights.iter().map(|w| w * w).sum()
}

/// Weighted average asset volatility over portfolio volatility.
pub fn diversification_ratio(weights: &[f64], asset_volatility: &[f64], volatility: f64) -> f64 {
    if volatility <= 0.0 {
        return 1.0;
    }
    let weighted: f64 = weights
        .iter()
        .zip(asset_volatility.iter())
        .map(|(w, v)| w * v)
        .sum();
    weighted / volatility
}

fn percent(weight: f64) -> Decimal {
    Decimal::from_f64_retain(weight * 100.0)
        .map(|d| d.round_dp(2))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn universe() -> AssetUniverse {
        AssetUniverse::parse("AAPL, MSFT").unwrap()
    }

    #[test]
    fn test_summary_format() {
        let cov = vec![vec![0.04, 0.0], vec![0.0, 0.01]];
        let allocs = build_allocations(&universe(), &[0.2345, 0.7655], &[0.1, 0.05], &cov, 0.1);
        assert_eq!(
            format_allocation_summary(&allocs),
            "AAPL: 23.45%, MSFT: 76.55%"
        );
        assert_eq!(allocs[0].weight_pct, dec!(23.45));
    }

    #[test]
    fn test_risk_contributions_sum_to_volatility() {
        let w = [0.4, 0.6];
        let cov = vec![vec![0.04, 0.006], vec![0.006, 0.01]];
        let vol = (0.16f64 * 0.04 + 2.0 * 0.24 * 0.006 + 0.36 * 0.01).sqrt();
        let allocs = build_allocations(&universe(), &w, &[0.1, 0.05], &cov, vol);
        let total: f64 = allocs.iter().map(|a| a.contribution_to_risk).sum();
        assert!((total - vol).abs() < 1e-12);
        let ret: f64 = allocs.iter().map(|a| a.contribution_to_return).sum();
        assert!((ret - 0.07).abs() < 1e-12);
    }

    #[test]
    fn test_hhi_and_diversification() {
        assert!((hhi_concentration(&[0.5, 0.5]) - 0.5).abs() < 1e-15);
        assert_eq!(diversification_ratio(&[0.5, 0.5], &[0.2, 0.1], 0.0), 1.0);
        let dr = diversification_ratio(&[0.5, 0.5], &[0.2, 0.2], 0.1);
        assert!((dr - 2.0).abs() < 1e-12);
    }
}
