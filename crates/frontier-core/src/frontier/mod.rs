#[cfg(feature = "parallel")]
pub mod parallel;
pub mod sampler;

#[cfg(feature = "parallel")]
pub use parallel::sample_frontier_parallel;
pub use sampler::{
    random_simplex_weights, run_frontier, sample_frontier, FrontierInput, FrontierPoint,
    FrontierSample,
};
