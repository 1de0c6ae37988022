use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Malformed rate '{value}': {reason}")]
    MalformedRate { value: String, reason: String },

    #[error("Rate curve has no observations")]
    EmptyCurve,

    #[error("Duplicate period {period} in cash flows of '{entity_id}'")]
    DuplicatePeriod { entity_id: String, period: String },

    #[error("Degenerate cash flow series '{entity_id}': {reason}")]
    DegenerateSeries { entity_id: String, reason: String },

    #[error("Invalid simulation parameters: {field}: {reason}")]
    InvalidSimulationParameters { field: String, reason: String },

    #[error("Invalid option parameters: {field}: {reason}")]
    InvalidOptionParameters { field: String, reason: String },

    #[error("Data retrieval failed: {0}")]
    DataRetrieval(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ValuationError {
    /// Stable machine-readable name of the error kind, used in batch failure records.
    pub fn kind(&self) -> &'static str {
        match self {
            ValuationError::InvalidInput { .. } => "invalid_input",
            ValuationError::MalformedRate { .. } => "malformed_rate",
            ValuationError::EmptyCurve => "empty_curve",
            ValuationError::DuplicatePeriod { .. } => "duplicate_period",
            ValuationError::DegenerateSeries { .. } => "degenerate_series",
            ValuationError::InvalidSimulationParameters { .. } => "invalid_simulation_parameters",
            ValuationError::InvalidOptionParameters { .. } => "invalid_option_parameters",
            ValuationError::DataRetrieval(_) => "data_retrieval",
            ValuationError::SerializationError(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for ValuationError {
    fn from(e: serde_json::Error) -> Self {
        ValuationError::SerializationError(e.to_string())
    }
}
