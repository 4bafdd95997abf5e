use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("no confidence recorded for label {label:?}")]
    MissingConfidence { label: String },

    #[error("expected exactly one value, found {count}")]
    MultipleValues { count: usize },

    #[error("validation failed: {0}")]
    Validation(String),
}

impl PredictionError {
    /// Errors that indicate a caller bug rather than bad data.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Self::MultipleValues { .. })
    }
}
