//! Confidence-threshold auto-review.

use anyhow::bail;
use predictree_core::{Predicted, SubmissionResult};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct Thresholds {
    /// Accept when confidence is at or above this.
    pub accept_above: Option<f64>,
    /// Reject when confidence is below this.
    pub reject_below: Option<f64>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub accepted: usize,
    pub rejected: usize,
    pub skipped: usize,
}

impl Thresholds {
    pub fn validate(&self) -> anyhow::Result<()> {
        for t in [self.accept_above, self.reject_below].into_iter().flatten() {
            if !(0.0..=1.0).contains(&t) {
                bail!("threshold {t} is outside 0..=1");
            }
        }
        if let (Some(accept), Some(reject)) = (self.accept_above, self.reject_below)
            && reject > accept
        {
            bail!("--reject-below {reject} is above --accept-above {accept}");
        }
        Ok(())
    }

    /// Review the final predictions that can be accepted or rejected.
    /// Predictions without a confidence for their own label are left alone.
    pub fn apply(&self, result: &mut SubmissionResult) -> Tally {
        let mut tally = Tally::default();
        for prediction in result.final_predictions_mut() {
            let confidence = match prediction.confidence() {
                Ok(c) => c,
                Err(e) => {
                    debug!(label = prediction.label(), error = %e, "skipping prediction");
                    tally.skipped += 1;
                    continue;
                }
            };
            let Some(reviewable) = prediction.as_reviewable_mut() else {
                continue;
            };
            if self.accept_above.is_some_and(|t| confidence >= t) {
                reviewable.accept();
                tally.accepted += 1;
            } else if self.reject_below.is_some_and(|t| confidence < t) {
                reviewable.reject();
                tally.rejected += 1;
            }
        }
        tally
    }
}
