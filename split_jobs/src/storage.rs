//! Seams between the job lifecycle and the services it runs on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, fmt, path::Path, time::Duration};
use types::{Job, JobStatus, SegmentResult, WorkerRequest, WorkerResponse};

use crate::error::{InvokeError, StorageError};

/// A forward move in the job lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Processing { at: DateTime<Utc> },
    Completed {
        results: Vec<SegmentResult>,
        at: DateTime<Utc>,
    },
    Failed { error: String, at: DateTime<Utc> },
}

impl Transition {
    pub const fn target(&self) -> JobStatus {
        match self {
            Self::Processing { .. } => JobStatus::Processing,
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Durable home of job descriptors.
///
/// Every status change goes through [`JobStore::advance`], which must only
/// apply when the stored status still equals `from`. That compare-and-set is
/// what keeps concurrent dispatchers, pollers and workers from moving a job
/// backwards or completing it twice.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores a new job; fails if the id is already taken.
    async fn create(&self, job: &Job) -> Result<(), StorageError>;

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StorageError>;

    async fn list_by_status(
        &self,
        status: JobStatus,
        limit: usize,
    ) -> Result<Vec<Job>, StorageError>;

    async fn advance(
        &self,
        job_id: &str,
        from: JobStatus,
        transition: Transition,
    ) -> Result<(), StorageError>;

    /// Records how the worker acknowledged the dispatch.
    async fn record_dispatch(
        &self,
        job_id: &str,
        confirmation: &str,
    ) -> Result<(), StorageError>;

    /// Records the probed duration and segment count of a processing job.
    async fn record_plan(
        &self,
        job_id: &str,
        source_duration: f64,
        expected_segments: u32,
    ) -> Result<(), StorageError>;

    /// Raises the stored progress of a processing job. Never lowers it and
    /// never touches `results`.
    async fn record_progress(
        &self,
        job_id: &str,
        progress: u8,
    ) -> Result<(), StorageError>;

    async fn delete(&self, job_id: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size_bytes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDetails {
    pub key: String,
    pub size_bytes: Option<i64>,
    pub metadata: HashMap<String, String>,
}

/// An object storage bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists at most `max_keys` objects under `prefix`.
    async fn list(
        &self,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<StoredObject>, StorageError>;

    /// Reads an object's size and user metadata without its body.
    async fn describe(
        &self,
        key: &str,
    ) -> Result<Option<ObjectDetails>, StorageError>;

    async fn presign_download(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    async fn presign_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    /// Deletes everything under `prefix`, returning how many objects went.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError>;

    /// Streams an object into a local file, returning the bytes written.
    ///
    /// A missing key is [`StorageError::NotFound`].
    async fn download_to_file(
        &self,
        key: &str,
        path: &Path,
    ) -> Result<u64, StorageError>;

    /// Uploads a local file with the given content type and user metadata.
    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), StorageError>;
}

/// What the worker's runtime said when it accepted an async invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub status_code: i32,
    pub request_id: Option<String>,
}

impl fmt::Display for DispatchReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.request_id {
            Some(request_id) => write!(
                f,
                "accepted with status {} (request {request_id})",
                self.status_code
            ),
            None => write!(f, "accepted with status {}", self.status_code),
        }
    }
}

#[async_trait]
pub trait WorkerInvoker: Send + Sync {
    /// Hands a request to the worker without waiting for it to run.
    async fn invoke_async(
        &self,
        request: &WorkerRequest,
    ) -> Result<DispatchReceipt, InvokeError>;

    /// Runs a request on the worker and waits for its answer.
    async fn invoke_sync(
        &self,
        request: &WorkerRequest,
    ) -> Result<WorkerResponse, InvokeError>;
}
