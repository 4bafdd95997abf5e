use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unsupported file version {0}")]
    UnsupportedVersion(i64),

    #[error("file_version is missing or not an integer")]
    MissingVersion,

    #[error("malformed result file at {context}: {reason}")]
    Malformed { context: String, reason: String },

    #[error("prediction references unknown model {0:?}")]
    UnknownModel(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FormatError {
    pub(crate) fn malformed(context: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            context: context.to_string(),
            reason: reason.into(),
        }
    }
}
