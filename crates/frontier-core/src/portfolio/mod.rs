pub mod allocation;
pub mod performance;

pub use allocation::{format_allocation_summary, AssetAllocation};
pub use performance::{portfolio_performance, ratio_gradient, PortfolioMetrics};
