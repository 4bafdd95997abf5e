//! Bounded-concurrency review loop.
//!
//! One scheduling loop lists pending submissions and hands each new id to a
//! worker task. Worker count is bounded by a semaphore: the loop takes a
//! permit before spawning, and blocks while every slot is busy. Each worker
//! has a reaper task that waits for it, reports the outcome back over a
//! channel and then releases the slot. Only the loop touches the in-flight
//! set, so it needs no lock.
//!
//! Delivery is at-least-once. A submission whose review failed is removed
//! from the in-flight set and picked up again by the next pass. A submission
//! that was reviewed stays in the set while the pending listing still shows
//! it, so it is not reviewed twice; once the listing drops it, it leaves the
//! set and the set stays bounded by the listing size.

use std::collections::HashSet;
use std::sync::Arc;

use predictree_core::SubmissionId;
use predictree_format::{load, to_changes};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{debug, error, info};

use crate::platform::{JobStatus, Platform};
use crate::retry::retry;
use crate::review::{Artifacts, Changes, Reviewer};
use crate::{PollerConfig, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Requeue,
    Quarantine,
}

#[derive(Debug)]
struct Report {
    submission_id: SubmissionId,
    outcome: Outcome,
}

pub struct ReviewPoller<P, R> {
    platform: Arc<P>,
    reviewer: Arc<R>,
    config: Arc<PollerConfig>,
    slots: Arc<Semaphore>,
    slot_count: u32,
    in_flight: HashSet<SubmissionId>,
    /// Reviewed ids kept in flight until the pending listing drops them.
    reviewed: HashSet<SubmissionId>,
    quarantined: HashSet<SubmissionId>,
    reports_tx: mpsc::UnboundedSender<Report>,
    reports_rx: mpsc::UnboundedReceiver<Report>,
}

impl<P: Platform, R: Reviewer> ReviewPoller<P, R> {
    pub fn new(platform: Arc<P>, reviewer: R, config: PollerConfig) -> Self {
        let slot_count = u32::try_from(config.worker_count.max(1)).unwrap_or(u32::MAX);
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Self {
            platform,
            reviewer: Arc::new(reviewer),
            config: Arc::new(config),
            slots: Arc::new(Semaphore::new(slot_count as usize)),
            slot_count,
            in_flight: HashSet::new(),
            reviewed: HashSet::new(),
            quarantined: HashSet::new(),
            reports_tx,
            reports_rx,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn is_in_flight(&self, id: SubmissionId) -> bool {
        self.in_flight.contains(&id)
    }

    /// Submissions set aside after a programming error. They are never
    /// retried by this poller and stay in this set for its lifetime.
    pub fn quarantined(&self) -> &HashSet<SubmissionId> {
        &self.quarantined
    }

    /// Poll forever. A failed pass is logged and followed by the poll delay.
    pub async fn run(&mut self) {
        info!(
            workflow_id = self.config.workflow_id,
            worker_count = self.slot_count,
            "starting review poller"
        );
        loop {
            if let Err(e) = self.poll_once().await {
                error!(workflow_id = self.config.workflow_id, error = %e, "poll pass failed");
                tokio::time::sleep(self.config.poll_delay()).await;
            }
        }
    }

    /// One pass: apply finished-worker reports, then start a worker for every
    /// pending submission not already in flight. Returns how many started.
    pub async fn poll_once(&mut self) -> Result<usize, SyncError> {
        self.apply_reports();

        let workflow_id = self.config.workflow_id;
        let platform = &self.platform;
        let pending = retry(&self.config.retry, "pending_submission_ids", || {
            platform.pending_submission_ids(workflow_id)
        })
        .await?;
        self.forget_unlisted(&pending);

        let mut started = 0;
        for id in pending {
            if !self.in_flight.insert(id) {
                continue;
            }
            let permit = self
                .slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| SyncError::Closed)?;
            self.spawn_worker(id, permit);
            started += 1;
            tokio::time::sleep(self.config.spawn_interval()).await;
        }

        if started == 0 {
            debug!(workflow_id, "no new submissions");
            tokio::time::sleep(self.config.poll_delay()).await;
        } else {
            info!(workflow_id, started, "started review workers");
        }
        Ok(started)
    }

    /// Wait until every worker has finished and apply their reports.
    pub async fn wait_idle(&mut self) -> Result<(), SyncError> {
        let all = self
            .slots
            .acquire_many(self.slot_count)
            .await
            .map_err(|_| SyncError::Closed)?;
        drop(all);
        self.apply_reports();
        Ok(())
    }

    /// Drop reviewed ids the platform no longer lists as pending.
    fn forget_unlisted(&mut self, pending: &[SubmissionId]) {
        let listed: HashSet<SubmissionId> = pending.iter().copied().collect();
        let in_flight = &mut self.in_flight;
        self.reviewed.retain(|id| {
            let keep = listed.contains(id);
            if !keep {
                in_flight.remove(id);
            }
            keep
        });
    }

    fn apply_reports(&mut self) {
        while let Ok(report) = self.reports_rx.try_recv() {
            match report.outcome {
                Outcome::Done => {
                    self.reviewed.insert(report.submission_id);
                }
                Outcome::Requeue => {
                    self.in_flight.remove(&report.submission_id);
                }
                Outcome::Quarantine => {
                    self.quarantined.insert(report.submission_id);
                }
            }
        }
    }

    fn spawn_worker(&self, id: SubmissionId, permit: OwnedSemaphorePermit) {
        let worker = tokio::spawn(review_submission(
            self.platform.clone(),
            self.reviewer.clone(),
            self.config.clone(),
            id,
        ));
        let reports = self.reports_tx.clone();

        // Reaper.
        tokio::spawn(async move {
            let outcome = match worker.await {
                Ok(Ok(())) => {
                    info!(submission_id = id, "submission reviewed");
                    Outcome::Done
                }
                Ok(Err(e)) if e.is_programming_error() => {
                    error!(submission_id = id, error = %e, "review hit a programming error, quarantining");
                    Outcome::Quarantine
                }
                Ok(Err(e)) => {
                    error!(submission_id = id, error = %e, "review failed, requeueing");
                    Outcome::Requeue
                }
                Err(e) => {
                    error!(submission_id = id, error = %e, "review worker panicked, requeueing");
                    Outcome::Requeue
                }
            };
            // The receiver lives as long as the poller; a send error only
            // means the poller is gone.
            let _ = reports.send(Report {
                submission_id: id,
                outcome,
            });
            drop(permit);
        });
    }
}

/// Fetch, parse, review, serialize and submit one submission, then wait for
/// the review job to finish.
async fn review_submission<P: Platform, R: Reviewer>(
    platform: Arc<P>,
    reviewer: Arc<R>,
    config: Arc<PollerConfig>,
    id: SubmissionId,
) -> Result<(), SyncError> {
    let policy = &config.retry;
    let meta = retry(policy, "submission", || platform.submission(id)).await?;
    let bytes = retry(policy, "fetch_object", || {
        platform.fetch_object(&meta.result_file)
    })
    .await?;
    let result = load(&bytes)?;
    debug!(
        submission_id = id,
        version = result.version.as_wire(),
        predictions = result.predictions.len(),
        "parsed result file"
    );

    let mut artifacts = Artifacts::new();
    if config.fetch_artifacts {
        for document in &result.documents {
            let raw = retry(policy, "fetch_object", || {
                platform.fetch_object(&document.etl_output)
            })
            .await?;
            let value = serde_json::from_slice(&raw).map_err(|source| SyncError::Artifact {
                document: document.id,
                source,
            })?;
            artifacts.insert(document.id, value);
        }
    }

    let (result, outcome) = tokio::task::spawn_blocking(move || {
        let mut result = result;
        let outcome = reviewer.review(&mut result, &artifacts);
        (result, outcome)
    })
    .await?;
    let outcome = outcome.map_err(SyncError::Review)?;

    let changes = match outcome.changes {
        Changes::Final => to_changes(&result.final_predictions(), &result)?,
        Changes::Predictions(predictions) => to_changes(&predictions, &result)?,
        Changes::Serialized(value) => value,
    };

    let job_id = retry(policy, "submit_review", || {
        platform.submit_review(id, &changes, outcome.reject, outcome.force_complete)
    })
    .await?;
    info!(
        submission_id = id,
        job_id = %job_id,
        reject = outcome.reject,
        force_complete = outcome.force_complete,
        "submitted review"
    );

    loop {
        match retry(policy, "job_status", || platform.job_status(&job_id)).await? {
            JobStatus::Success => return Ok(()),
            JobStatus::Failure { message } => return Err(SyncError::JobFailed { job_id, message }),
            status => {
                debug!(submission_id = id, job_id = %job_id, ?status, "waiting for review job");
                tokio::time::sleep(config.status_poll_interval()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SubmissionMeta;
    use crate::review::ReviewOutcome;
    use crate::{PlatformError, RetryPolicy};
    use async_trait::async_trait;
    use predictree_core::{AutoReviewable, PredictionError, Query, SubmissionResult};
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn result_file() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "file_version": 1,
            "submission_id": 1,
            "input_filename": "invoice.pdf",
            "etl_output": "etl/1.json",
            "results": {"document": {"results": {"Fields": {"pre_review": [
                {"label": "Total", "text": "$10", "start": 0, "end": 3, "page_num": 0,
                 "confidence": {"Total": 0.95}},
                {"label": "Date", "text": "May", "start": 5, "end": 8, "page_num": 0,
                 "confidence": {"Date": 0.2}}
            ]}}}}
        }))
        .unwrap()
    }

    #[derive(Default)]
    struct FakePlatform {
        pending: Mutex<Vec<SubmissionId>>,
        /// When set, `submission` blocks until a permit is released.
        gate: Option<Semaphore>,
        started: Mutex<Vec<SubmissionId>>,
        submitted: Mutex<Vec<(SubmissionId, Value, bool)>>,
        polled_jobs: Mutex<HashSet<String>>,
        finished: AtomicUsize,
    }

    impl FakePlatform {
        fn new(pending: Vec<SubmissionId>) -> Self {
            Self {
                pending: Mutex::new(pending),
                ..Default::default()
            }
        }

        fn gated(pending: Vec<SubmissionId>) -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Self::new(pending)
            }
        }

        fn release(&self, n: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(n);
            }
        }

        fn set_pending(&self, pending: Vec<SubmissionId>) {
            *self.pending.lock().unwrap() = pending;
        }

        fn started(&self) -> Vec<SubmissionId> {
            self.started.lock().unwrap().clone()
        }

        fn submitted_ids(&self) -> Vec<SubmissionId> {
            let mut ids: Vec<_> = self.submitted.lock().unwrap().iter().map(|s| s.0).collect();
            ids.sort();
            ids
        }
    }

    #[async_trait]
    impl Platform for FakePlatform {
        async fn pending_submission_ids(
            &self,
            _workflow_id: i64,
        ) -> Result<Vec<SubmissionId>, PlatformError> {
            Ok(self.pending.lock().unwrap().clone())
        }

        async fn submission(&self, id: SubmissionId) -> Result<SubmissionMeta, PlatformError> {
            self.started.lock().unwrap().push(id);
            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|e| PlatformError::Permanent(e.to_string()))?
                    .forget();
            }
            Ok(SubmissionMeta {
                id,
                result_file: format!("results/{id}.json"),
            })
        }

        async fn fetch_object(&self, reference: &str) -> Result<Vec<u8>, PlatformError> {
            if reference.starts_with("results/") {
                Ok(result_file())
            } else {
                Ok(br#"{"pages": [{"page_num": 0}]}"#.to_vec())
            }
        }

        async fn submit_review(
            &self,
            id: SubmissionId,
            changes: &Value,
            reject: bool,
            _force_complete: bool,
        ) -> Result<String, PlatformError> {
            self.submitted
                .lock()
                .unwrap()
                .push((id, changes.clone(), reject));
            Ok(format!("job-{id}"))
        }

        async fn job_status(&self, job_id: &str) -> Result<JobStatus, PlatformError> {
            // Running on the first poll, done on the second.
            if self.polled_jobs.lock().unwrap().insert(job_id.to_string()) {
                return Ok(JobStatus::Running);
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(JobStatus::Success)
        }
    }

    fn config(worker_count: usize) -> PollerConfig {
        PollerConfig {
            workflow_id: 1,
            worker_count,
            spawn_interval_ms: 0,
            poll_delay_ms: 0,
            status_poll_interval_ms: 1,
            fetch_artifacts: false,
            retry: RetryPolicy {
                attempts: 2,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
        }
    }

    fn accept_all(_: &mut SubmissionResult, _: &Artifacts) -> anyhow::Result<ReviewOutcome> {
        Ok(ReviewOutcome::accept_final())
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn third_worker_waits_for_a_free_slot() {
        let platform = Arc::new(FakePlatform::gated(vec![1, 2, 3]));
        let mut poller = ReviewPoller::new(platform.clone(), accept_all, config(2));
        let pass = tokio::spawn(async move {
            let started = poller.poll_once().await;
            (started, poller)
        });

        wait_for(|| platform.started().len() == 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut first_two = platform.started();
        first_two.sort();
        assert_eq!(first_two, vec![1, 2]);
        assert_eq!(platform.finished.load(Ordering::SeqCst), 0);

        platform.release(1);
        wait_for(|| platform.started().len() == 3).await;
        // The third only started after one of the first two completed.
        assert_eq!(platform.finished.load(Ordering::SeqCst), 1);
        assert_eq!(platform.started()[2], 3);

        platform.release(2);
        let (started, mut poller) = pass.await.unwrap();
        assert_eq!(started.unwrap(), 3);
        poller.wait_idle().await.unwrap();
        assert_eq!(platform.submitted_ids(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_review_is_requeued_without_submitting() {
        let platform = Arc::new(FakePlatform::new(vec![5]));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let reviewer = move |_: &mut SubmissionResult,
                             _: &Artifacts|
              -> anyhow::Result<ReviewOutcome> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("model server unavailable");
            }
            Ok(ReviewOutcome::accept_final())
        };
        let mut poller = ReviewPoller::new(platform.clone(), reviewer, config(2));

        assert_eq!(poller.poll_once().await.unwrap(), 1);
        poller.wait_idle().await.unwrap();
        assert!(platform.submitted_ids().is_empty());
        assert!(!poller.is_in_flight(5));

        // Scheduled again on the next pass.
        assert_eq!(poller.poll_once().await.unwrap(), 1);
        poller.wait_idle().await.unwrap();
        assert_eq!(platform.submitted_ids(), vec![5]);

        // Reviewed ids stay in flight, so a stale listing is ignored.
        assert_eq!(poller.poll_once().await.unwrap(), 0);
        assert!(poller.is_in_flight(5));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reviewed_ids_leave_the_set_once_no_longer_listed() {
        let platform = Arc::new(FakePlatform::new(vec![5, 6]));
        let mut poller = ReviewPoller::new(platform.clone(), accept_all, config(2));
        assert_eq!(poller.poll_once().await.unwrap(), 2);
        poller.wait_idle().await.unwrap();

        platform.set_pending(vec![6]);
        assert_eq!(poller.poll_once().await.unwrap(), 0);
        assert!(!poller.is_in_flight(5));
        assert!(poller.is_in_flight(6));

        // Listed again later: reviewed again.
        platform.set_pending(vec![5, 6]);
        assert_eq!(poller.poll_once().await.unwrap(), 1);
        poller.wait_idle().await.unwrap();
        assert_eq!(platform.submitted_ids(), vec![5, 5, 6]);
    }

    #[tokio::test]
    async fn programming_errors_are_quarantined() {
        let platform = Arc::new(FakePlatform::new(vec![9]));
        let reviewer = |_: &mut SubmissionResult, _: &Artifacts| -> anyhow::Result<ReviewOutcome> {
            Err(PredictionError::MultipleValues { count: 2 }.into())
        };
        let mut poller = ReviewPoller::new(platform.clone(), reviewer, config(1));

        assert_eq!(poller.poll_once().await.unwrap(), 1);
        poller.wait_idle().await.unwrap();
        assert!(poller.quarantined().contains(&9));
        assert_eq!(poller.poll_once().await.unwrap(), 0);
        assert!(platform.submitted_ids().is_empty());
    }

    #[tokio::test]
    async fn reviewer_mutations_reach_the_submitted_payload() {
        let platform = Arc::new(FakePlatform::new(vec![3]));
        let reviewer = |result: &mut SubmissionResult,
                        _: &Artifacts|
         -> anyhow::Result<ReviewOutcome> {
            result
                .final_predictions_mut()
                .extractions()
                .filter(&Query::new().max_confidence(0.5))
                .reject();
            Ok(ReviewOutcome::accept_final().rejected())
        };
        let mut poller = ReviewPoller::new(platform.clone(), reviewer, config(1));
        poller.poll_once().await.unwrap();
        poller.wait_idle().await.unwrap();

        let submitted = platform.submitted.lock().unwrap();
        let (id, changes, reject) = &submitted[0];
        assert_eq!(*id, 3);
        assert!(*reject);
        let fields = changes["Fields"].as_array().unwrap();
        let date = fields.iter().find(|p| p["label"] == "Date").unwrap();
        assert_eq!(date["rejected"], json!(true));
        let total = fields.iter().find(|p| p["label"] == "Total").unwrap();
        assert!(total.get("rejected").is_none());
    }

    #[tokio::test]
    async fn artifacts_are_fetched_per_document_when_enabled() {
        let platform = Arc::new(FakePlatform::new(vec![4]));
        let reviewer = |result: &mut SubmissionResult,
                        artifacts: &Artifacts|
         -> anyhow::Result<ReviewOutcome> {
            let document = result.document()?;
            anyhow::ensure!(artifacts.contains_key(&document.id), "artifact missing");
            let accepted = result.final_predictions_mut().extractions().accept();
            anyhow::ensure!(accepted.iter().all(|e| e.accepted()));
            Ok(ReviewOutcome::accept_final())
        };
        let mut poller = ReviewPoller::new(
            platform.clone(),
            reviewer,
            PollerConfig {
                fetch_artifacts: true,
                ..config(1)
            },
        );
        poller.poll_once().await.unwrap();
        poller.wait_idle().await.unwrap();
        assert_eq!(platform.submitted_ids(), vec![4]);
    }
}
