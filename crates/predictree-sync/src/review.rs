use std::collections::BTreeMap;

use predictree_core::{DocumentId, Prediction, SubmissionResult};
use serde_json::Value;

/// Parsed layout artifacts by document id. Empty unless the poller is
/// configured to fetch them.
pub type Artifacts = BTreeMap<DocumentId, Value>;

/// What to submit for a reviewed submission.
#[derive(Debug, Clone)]
pub enum Changes {
    /// Serialize the final predictions of the (mutated) result.
    Final,
    /// Serialize a caller-built prediction list.
    Predictions(Vec<Prediction>),
    /// Submit as-is.
    Serialized(Value),
}

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub changes: Changes,
    pub reject: bool,
    pub force_complete: bool,
}

impl ReviewOutcome {
    /// Submit the final predictions without rejecting the submission.
    pub fn accept_final() -> Self {
        Self {
            changes: Changes::Final,
            reject: false,
            force_complete: false,
        }
    }

    pub fn with_changes(changes: Changes) -> Self {
        Self {
            changes,
            ..Self::accept_final()
        }
    }

    pub fn rejected(mut self) -> Self {
        self.reject = true;
        self
    }

    pub fn force_complete(mut self) -> Self {
        self.force_complete = true;
        self
    }
}

/// The caller's review step. Runs on a blocking thread, once per submission.
pub trait Reviewer: Send + Sync + 'static {
    fn review(
        &self,
        result: &mut SubmissionResult,
        artifacts: &Artifacts,
    ) -> anyhow::Result<ReviewOutcome>;
}

impl<F> Reviewer for F
where
    F: Fn(&mut SubmissionResult, &Artifacts) -> anyhow::Result<ReviewOutcome> + Send + Sync + 'static,
{
    fn review(
        &self,
        result: &mut SubmissionResult,
        artifacts: &Artifacts,
    ) -> anyhow::Result<ReviewOutcome> {
        self(result, artifacts)
    }
}
