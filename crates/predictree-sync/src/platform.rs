//! Network operations the poller needs from the document platform.
//!
//! Transport, authentication and endpoint layout all live behind this trait;
//! the poller only sees ids, raw bytes and JSON payloads.

use async_trait::async_trait;
use predictree_core::SubmissionId;
use serde_json::Value;

use crate::PlatformError;

/// What the platform knows about one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionMeta {
    pub id: SubmissionId,
    /// Storage reference of the result file, passed to [`Platform::fetch_object`].
    pub result_file: String,
}

/// State of an asynchronous review submission job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failure { message: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure { .. })
    }
}

#[async_trait]
pub trait Platform: Send + Sync + 'static {
    /// Submissions of a workflow that are waiting for review.
    async fn pending_submission_ids(&self, workflow_id: i64)
    -> Result<Vec<SubmissionId>, PlatformError>;

    async fn submission(&self, id: SubmissionId) -> Result<SubmissionMeta, PlatformError>;

    /// Download a stored object (result file, layout artifact).
    async fn fetch_object(&self, reference: &str) -> Result<Vec<u8>, PlatformError>;

    /// Submit a change-set. Returns the id of the job that applies it.
    async fn submit_review(
        &self,
        id: SubmissionId,
        changes: &Value,
        reject: bool,
        force_complete: bool,
    ) -> Result<String, PlatformError>;

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, PlatformError>;
}
