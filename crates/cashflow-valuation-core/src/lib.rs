pub mod cash_flow;
pub mod error;
pub mod npv;
pub mod period;
pub mod rate_curve;
pub mod types;

mod stats;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

#[cfg(feature = "real_options")]
pub mod real_options;

#[cfg(feature = "pipeline")]
pub mod pipeline;

pub use cash_flow::{CashFlow, CashFlowSeries};
pub use error::ValuationError;
pub use period::Quarter;
pub use rate_curve::{RateCurve, RateObservation, RateUnit, RawRate};
pub use types::*;

/// Standard result type for all valuation operations
pub type ValuationResult<T> = Result<T, ValuationError>;
