use serde::{Deserialize, Serialize};

use crate::error::FrontierError;
use crate::FrontierResult;

/// Baseline return subtracted in the risk-adjusted ratio.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.01;

/// Default per-asset allocation floor.
pub const DEFAULT_MIN_WEIGHT: f64 = 0.05;

/// Default per-asset allocation cap.
pub const DEFAULT_MAX_WEIGHT: f64 = 0.35;

/// Default number of Monte-Carlo frontier samples.
pub const DEFAULT_SAMPLE_COUNT: usize = 10_000;

/// Largest accepted frontier batch. Each point holds its own weight vector,
/// so larger batches are rejected before any allocation.
pub const MAX_SAMPLE_COUNT: usize = 10_000_000;

/// Per-asset average periodic return, length N.
pub type MeanVector = Vec<f64>;

/// N x N sample covariance of periodic returns.
pub type CovarianceMatrix = Vec<Vec<f64>>;

/// Per-asset allocation fractions, length N.
pub type WeightVector = Vec<f64>;

/// Ordered, deduplicated set of asset identifiers. Fixes N for every vector
/// and matrix derived within one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct AssetUniverse {
    assets: Vec<String>,
}

impl AssetUniverse {
    pub const MIN_ASSETS: usize = 2;

    pub fn new(assets: Vec<String>) -> FrontierResult<Self> {
        let assets: Vec<String> = assets.into_iter().map(|a| a.trim().to_string()).collect();
        if assets.len() < Self::MIN_ASSETS {
            return Err(FrontierError::invalid(
                "assets",
                format!(
                    "At least {} assets required, got {}",
                    Self::MIN_ASSETS,
                    assets.len()
                ),
            ));
        }
        for (i, a) in assets.iter().enumerate() {
            if a.is_empty() {
                return Err(FrontierError::invalid(
                    format!("assets[{}]", i),
                    "Asset identifier is blank",
                ));
            }
            if assets[..i].contains(a) {
                return Err(FrontierError::invalid(
                    format!("assets[{}]", i),
                    format!("Duplicate asset identifier '{}'", a),
                ));
            }
        }
        Ok(Self { assets })
    }

    /// Parse a comma-separated ticker list such as `"AAPL, MSFT, GOOGL"`.
    pub fn parse(tickers: &str) -> FrontierResult<Self> {
        let assets = tickers
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        Self::new(assets)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.assets
    }

    pub fn name(&self, i: usize) -> &str {
        &self.assets[i]
    }
}

impl TryFrom<Vec<String>> for AssetUniverse {
    type Error = FrontierError;

    fn try_from(v: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<AssetUniverse> for Vec<String> {
    fn from(u: AssetUniverse) -> Self {
        u.assets
    }
}

/// T periodic return observations x N assets, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct ReturnMatrix {
    rows: Vec<Vec<f64>>,
    n_assets: usize,
}

impl ReturnMatrix {
    /// Build from observation rows. Every row must have the same width and
    /// hold finite values only. An empty matrix is allowed here; the
    /// estimator decides whether there is enough data.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> FrontierResult<Self> {
        let n_assets = rows.first().map(|r| r.len()).unwrap_or(0);
        for (t, row) in rows.iter().enumerate() {
            if row.len() != n_assets {
                return Err(FrontierError::MisalignedSeries(format!(
                    "Row {} has {} columns, expected {}",
                    t,
                    row.len(),
                    n_assets
                )));
            }
            if let Some(j) = row.iter().position(|v| !v.is_finite()) {
                return Err(FrontierError::NonFiniteValue {
                    context: format!("returns[{}][{}]", t, j),
                });
            }
        }
        Ok(Self { rows, n_assets })
    }

    pub fn n_observations(&self) -> usize {
        self.rows.len()
    }

    pub fn n_assets(&self) -> usize {
        self.n_assets
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Return series of one asset.
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[j]).collect()
    }
}

impl TryFrom<Vec<Vec<f64>>> for ReturnMatrix {
    type Error = FrontierError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl From<ReturnMatrix> for Vec<Vec<f64>> {
    fn from(m: ReturnMatrix) -> Self {
        m.rows
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_trims_and_keeps_order() {
        let u = AssetUniverse::parse(" AAPL, MSFT ,GOOGL").unwrap();
        assert_eq!(u.names(), &["AAPL", "MSFT", "GOOGL"]);
    }

    #[test]
    fn test_duplicate_asset_rejected() {
        assert!(AssetUniverse::parse("AAPL, MSFT, AAPL").is_err());
    }

    #[test]
    fn test_single_asset_rejected() {
        assert!(AssetUniverse::parse("AAPL").is_err());
    }

    #[test]
    fn test_universe_deserialize_validates() {
        let ok: AssetUniverse = serde_json::from_str(r#"["A", "B"]"#).unwrap();
        assert_eq!(ok.len(), 2);
        let dup: Result<AssetUniverse, _> = serde_json::from_str(r#"["A", "A"]"#);
        assert!(dup.is_err());
    }

    #[test]
    fn test_return_matrix_ragged_rows() {
        let err = ReturnMatrix::from_rows(vec![vec![0.01, 0.02], vec![0.01]]).unwrap_err();
        assert!(matches!(err, FrontierError::MisalignedSeries(_)));
    }

    #[test]
    fn test_return_matrix_non_finite() {
        let err = ReturnMatrix::from_rows(vec![vec![0.01, f64::NAN]]).unwrap_err();
        assert!(matches!(err, FrontierError::NonFiniteValue { .. }));
    }

    #[test]
    fn test_return_matrix_column() {
        let m = ReturnMatrix::from_rows(vec![vec![0.01, 0.02], vec![0.03, 0.04]]).unwrap();
        assert_eq!(m.column(1), vec![0.02, 0.04]);
        assert_eq!(m.n_observations(), 2);
        assert_eq!(m.n_assets(), 2);
    }
}
