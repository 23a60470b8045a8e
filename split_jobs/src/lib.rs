//! Job lifecycle for the video splitter.
//!
//! A job is submitted as `queued`, claimed and handed to the ffmpeg worker by
//! the dispatcher, and completed either by the worker itself or by the
//! status poller once every expected segment is in the output bucket.

use std::{sync::Arc, time::Duration};

mod cleanup;
mod dispatcher;
mod download;
pub mod dynamodb;
mod error;
pub mod lambda;
pub mod memory;
mod poller;
mod results;
pub mod s3;
mod storage;
mod submission;

pub use cleanup::CleanupSummary;
pub use dispatcher::{DispatchOutcome, DispatchSummary};
pub use error::{InvokeError, JobError, StorageError};
pub use poller::progress_from_segments;
pub use results::describe_segments;
pub use storage::{
    DispatchReceipt, JobStore, ObjectDetails, ObjectStore, StoredObject,
    Transition, WorkerInvoker,
};

pub const DEFAULT_OUTPUT_PREFIX: &str = "jobs";

/// Upper bound on the objects read from one job's output prefix.
pub const MAX_LISTED_SEGMENTS: usize = types::MAX_SEGMENTS;

#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Key prefix for segment output in the output bucket.
    pub output_prefix: String,
    /// How long a single status poll may spend inspecting storage.
    pub poll_budget: Duration,
    pub download_url_ttl: Duration,
    /// How long a job may stay processing before it is failed as abandoned.
    /// Must exceed the worker's maximum run time.
    pub processing_deadline: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            poll_budget: Duration::from_secs(3),
            download_url_ttl: Duration::from_secs(3600),
            processing_deadline: Duration::from_secs(20 * 60),
        }
    }
}

/// Runs lifecycle operations against a job store, the output bucket and the
/// worker.
#[derive(Clone)]
pub struct JobService {
    pub jobs: Arc<dyn JobStore>,
    pub outputs: Arc<dyn ObjectStore>,
    pub worker: Arc<dyn WorkerInvoker>,
    pub settings: JobSettings,
}

impl JobService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        outputs: Arc<dyn ObjectStore>,
        worker: Arc<dyn WorkerInvoker>,
        settings: JobSettings,
    ) -> Self {
        Self {
            jobs,
            outputs,
            worker,
            settings,
        }
    }

    fn output_prefix_for(&self, job_id: &str) -> String {
        types::naming::job_output_prefix(&self.settings.output_prefix, job_id)
    }
}
