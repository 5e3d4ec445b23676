use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {observations} observations available, at least {required} required")]
    InsufficientData { observations: usize, required: usize },

    #[error("Misaligned series: {0}")]
    MisalignedSeries(String),

    #[error("Degenerate asset: {asset} has return variance {variance:e}, covariance matrix is singular")]
    DegenerateAsset { asset: String, variance: f64 },

    #[error("Infeasible constraints: bounds over {n_assets} assets sum to [{lower_sum}, {upper_sum}], which cannot contain 1")]
    InfeasibleConstraints {
        n_assets: usize,
        lower_sum: f64,
        upper_sum: f64,
    },

    #[error("Inverted bounds: asset {index} has lower bound {lower} above upper bound {upper}")]
    InvertedBounds { index: usize, lower: f64, upper: f64 },

    #[error("Zero volatility in {context}: ratio is undefined")]
    ZeroVolatility { context: String },

    #[error("Non-finite value in {context}")]
    NonFiniteValue { context: String },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (objective: {objective}, constraint violation: {constraint_violation:e})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        objective: f64,
        constraint_violation: f64,
        last_iterate: Vec<f64>,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse failure category, used by callers that only need to decide how to
/// present or recover from an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Insufficient, missing or misaligned return series.
    Data,
    /// Bounds that cannot bracket full investment.
    Constraint,
    /// Singular covariance or degenerate zero-volatility evaluation.
    Numerical,
    /// Solver budget exhausted.
    Convergence,
    /// Malformed request.
    Input,
}

impl FrontierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrontierError::InsufficientData { .. } | FrontierError::MisalignedSeries(_) => {
                ErrorKind::Data
            }
            FrontierError::InfeasibleConstraints { .. } | FrontierError::InvertedBounds { .. } => {
                ErrorKind::Constraint
            }
            FrontierError::DegenerateAsset { .. }
            | FrontierError::ZeroVolatility { .. }
            | FrontierError::NonFiniteValue { .. } => ErrorKind::Numerical,
            FrontierError::ConvergenceFailure { .. } => ErrorKind::Convergence,
            FrontierError::InvalidInput { .. } | FrontierError::SerializationError(_) => {
                ErrorKind::Input
            }
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FrontierError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for FrontierError {
    fn from(e: serde_json::Error) -> Self {
        FrontierError::SerializationError(e.to_string())
    }
}
