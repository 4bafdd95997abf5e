//! Review loop: discovers pending submissions, runs the caller's review
//! function over each parsed result and submits the change-set.

mod config;
mod error;
mod platform;
mod poller;
mod retry;
mod review;

pub use config::PollerConfig;
pub use error::{PlatformError, SyncError};
pub use platform::{JobStatus, Platform, SubmissionMeta};
pub use poller::ReviewPoller;
pub use retry::{RetryPolicy, retry};
pub use review::{Artifacts, Changes, ReviewOutcome, Reviewer};
