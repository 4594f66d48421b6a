use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Invalid input shape: {context}")]
    InvalidInputShape { context: String },

    #[error("Invalid input: {field} ({reason})")]
    InvalidInput { field: String, reason: String },

    #[error("Input data error: {0}")]
    InputDataError(String),

    #[error("Sampling budget exhausted for '{strategy}': {accepted} of {target} portfolios accepted after {attempts} attempts")]
    SamplingBudgetExhausted {
        strategy: String,
        accepted: usize,
        target: usize,
        attempts: usize,
    },

    #[error("Empty result set: strategy '{strategy}' has no accepted portfolios")]
    EmptyResultSet { strategy: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl FrontierError {
    pub(crate) fn shape(context: impl Into<String>) -> Self {
        FrontierError::InvalidInputShape {
            context: context.into(),
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
