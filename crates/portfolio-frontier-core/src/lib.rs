pub mod constraints;
pub mod error;
pub mod estimation;
pub mod frontier;
pub mod metrics;
pub mod runner;
pub mod sampler;
pub mod selector;
pub mod types;
pub mod universe;

pub use error::FrontierError;
pub use types::*;

/// Standard result type for all portfolio-frontier operations
pub type FrontierResult<T> = Result<T, FrontierError>;

/// Tolerance for "weights sum to one" and covariance symmetry checks.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;
