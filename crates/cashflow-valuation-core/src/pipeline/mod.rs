//! Batch valuation of many entities from one configuration.
//!
//! Each entity is valued independently with its own derived seed; a failing
//! entity is recorded in the report and never aborts the batch.

pub mod batch;
pub mod config;
pub mod source;

#[cfg(feature = "parallel")]
pub use batch::run_batch_parallel;
pub use batch::{
    run_batch, value_entity, BatchReport, EntityFailure, EntityOutcome, EntityValuation, ExportRow,
    VisualizationRow,
};
pub use config::{DiscountBasis, ValuationConfig, VolatilityBasis};
pub use source::{InMemorySource, ValuationSource};
