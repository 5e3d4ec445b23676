pub mod estimator;
pub mod returns;

pub use estimator::{compute_covariance, compute_mean, estimate, AssetStatistics};
pub use returns::{simple_returns, PriceHistory};
