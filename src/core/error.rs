use thiserror::Error;

/// Failures surfaced by the computation library. All are local validation or
/// control-flow outcomes; arithmetic guards (division by zero, empty inputs)
/// are checked explicitly rather than left to NaN propagation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid input `{field}`: {message}")]
    InvalidInput { field: &'static str, message: String },

    #[error("scenario comparison requires at least 2 runs, got {got}")]
    InsufficientData { got: usize },

    /// The caller cancelled a simulation in flight. No partial result is
    /// produced; partial aggregation would skew the percentile bands.
    #[error("simulation cancelled before completion")]
    Cancelled,
}

impl EngineError {
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// The field the error relates to, where one applies.
    pub fn field(&self) -> Option<&str> {
        match self {
            EngineError::InvalidInput { field, .. } => Some(field),
            _ => None,
        }
    }
}
