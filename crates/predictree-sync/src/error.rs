use predictree_core::{DocumentId, PredictionError};
use predictree_format::FormatError;
use thiserror::Error;

/// Failure reported by a [`Platform`](crate::Platform) call.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// Worth retrying: timeouts, throttling, 5xx responses.
    #[error("transient platform error: {0}")]
    Transient(String),

    #[error("platform error: {0}")]
    Permanent(String),
}

/// Everything that can fail while reviewing one submission.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last: PlatformError,
    },

    #[error("result file: {0}")]
    Format(#[from] FormatError),

    #[error(transparent)]
    Prediction(#[from] PredictionError),

    #[error("layout artifact for document {document}: {source}")]
    Artifact {
        document: DocumentId,
        source: serde_json::Error,
    },

    #[error("review function failed: {0:#}")]
    Review(anyhow::Error),

    #[error("review job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("review task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("worker slots closed")]
    Closed,
}

impl SyncError {
    /// Caller bugs that retrying cannot fix, wherever they surface.
    pub fn is_programming_error(&self) -> bool {
        match self {
            Self::Prediction(e) => e.is_programming_error(),
            Self::Review(e) => e.chain().any(|cause| {
                cause
                    .downcast_ref::<PredictionError>()
                    .is_some_and(PredictionError::is_programming_error)
            }),
            _ => false,
        }
    }
}
