pub mod error;
pub mod optimization;
pub mod portfolio;
pub mod statistics;
pub mod types;

#[cfg(feature = "frontier")]
pub mod frontier;

#[cfg(feature = "frontier")]
pub mod request;

pub use error::{ErrorKind, FrontierError};
pub use types::*;

/// Standard result type for all frontier operations
pub type FrontierResult<T> = Result<T, FrontierError>;
