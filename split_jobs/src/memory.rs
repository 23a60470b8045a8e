//! In-process stand-ins for the job table, a bucket and the worker.
//!
//! They enforce the same conditional-write rules as the AWS-backed stores,
//! and can be told to fail or slow down.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use types::{Job, JobStatus, WorkerRequest, WorkerResponse};

use crate::{
    error::{InvokeError, StorageError},
    storage::{
        DispatchReceipt, JobStore, ObjectDetails, ObjectStore, StoredObject,
        Transition, WorkerInvoker,
    },
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a job as-is, bypassing every condition.
    pub fn insert(&self, job: Job) {
        lock(&self.jobs).insert(job.job_id.clone(), job);
    }

    pub fn snapshot(&self, job_id: &str) -> Option<Job> {
        lock(&self.jobs).get(job_id).cloned()
    }

    fn update<F>(&self, job_id: &str, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Job) -> Result<(), StorageError>,
    {
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StorageError::ConditionFailed(format!("job {job_id} does not exist")))?;
        apply(job)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), StorageError> {
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(&job.job_id) {
            return Err(StorageError::ConditionFailed(format!(
                "job {} already exists",
                job.job_id
            )));
        }
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StorageError> {
        Ok(self.snapshot(job_id))
    }

    async fn list_by_status(
        &self,
        status: JobStatus,
        limit: usize,
    ) -> Result<Vec<Job>, StorageError> {
        let mut jobs: Vec<Job> = lock(&self.jobs)
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn advance(
        &self,
        job_id: &str,
        from: JobStatus,
        transition: Transition,
    ) -> Result<(), StorageError> {
        let to = transition.target();
        if !from.can_advance_to(to) {
            return Err(StorageError::InvalidTransition { from, to });
        }

        self.update(job_id, |job| {
            if job.status != from {
                return Err(StorageError::ConditionFailed(format!(
                    "job {job_id} is {}, not {from}",
                    job.status
                )));
            }

            job.status = to;
            match transition {
                Transition::Processing { at } => job.processing_started_at = Some(at),
                Transition::Completed { results, at } => {
                    job.results = results;
                    job.progress = 100;
                    job.completed_at = Some(at);
                }
                Transition::Failed { error, at } => {
                    job.error = Some(error);
                    job.failed_at = Some(at);
                }
            }
            Ok(())
        })
    }

    async fn record_dispatch(
        &self,
        job_id: &str,
        confirmation: &str,
    ) -> Result<(), StorageError> {
        self.update(job_id, |job| {
            job.dispatch_confirmation = Some(confirmation.to_string());
            Ok(())
        })
    }

    async fn record_plan(
        &self,
        job_id: &str,
        source_duration: f64,
        expected_segments: u32,
    ) -> Result<(), StorageError> {
        self.update(job_id, |job| {
            if job.status != JobStatus::Processing {
                return Err(StorageError::ConditionFailed(format!(
                    "job {job_id} is {}",
                    job.status
                )));
            }
            job.source_duration = Some(source_duration);
            job.expected_segments = Some(expected_segments);
            Ok(())
        })
    }

    async fn record_progress(
        &self,
        job_id: &str,
        progress: u8,
    ) -> Result<(), StorageError> {
        self.update(job_id, |job| {
            if job.status != JobStatus::Processing || job.progress >= progress {
                return Err(StorageError::ConditionFailed(format!(
                    "progress of job {job_id} not raised"
                )));
            }
            job.progress = progress;
            Ok(())
        })
    }

    async fn delete(&self, job_id: &str) -> Result<(), StorageError> {
        lock(&self.jobs).remove(job_id);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct StoredBlob {
    size_bytes: i64,
    content_type: Option<String>,
    metadata: HashMap<String, String>,
}

/// A bucket held in a map.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredBlob>>,
    unavailable: AtomicBool,
    latency: Mutex<Duration>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, size_bytes: i64, metadata: HashMap<String, String>) {
        lock(&self.objects).insert(
            key.to_string(),
            StoredBlob {
                size_bytes,
                content_type: None,
                metadata,
            },
        );
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    /// Content type an object was uploaded with, if any.
    pub fn content_type(&self, key: &str) -> Option<String> {
        lock(&self.objects)
            .get(key)
            .and_then(|blob| blob.content_type.clone())
    }

    /// Makes every call fail with a transient error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    async fn before_call(&self) -> Result<(), StorageError> {
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Transient("bucket unavailable".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list(
        &self,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<StoredObject>, StorageError> {
        self.before_call().await?;

        Ok(lock(&self.objects)
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(max_keys)
            .map(|(key, blob)| StoredObject {
                key: key.clone(),
                size_bytes: Some(blob.size_bytes),
            })
            .collect())
    }

    async fn describe(
        &self,
        key: &str,
    ) -> Result<Option<ObjectDetails>, StorageError> {
        self.before_call().await?;

        Ok(lock(&self.objects).get(key).map(|blob| ObjectDetails {
            key: key.to_string(),
            size_bytes: Some(blob.size_bytes),
            metadata: blob.metadata.clone(),
        }))
    }

    async fn presign_download(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        self.before_call().await?;
        Ok(format!(
            "memory://{key}?method=GET&expires={}",
            expires_in.as_secs()
        ))
    }

    async fn presign_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        self.before_call().await?;
        Ok(format!(
            "memory://{key}?method=PUT&content-type={}&expires={}",
            content_type.unwrap_or("application/octet-stream"),
            expires_in.as_secs()
        ))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        self.before_call().await?;

        let mut objects = lock(&self.objects);
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(prefix));
        Ok(before - objects.len())
    }

    /// Writes an empty file; only the object's presence is modelled.
    async fn download_to_file(
        &self,
        key: &str,
        path: &Path,
    ) -> Result<u64, StorageError> {
        self.before_call().await?;

        if !lock(&self.objects).contains_key(key) {
            return Err(StorageError::NotFound(format!("object {key}")));
        }

        tokio::fs::write(path, b"").await.map_err(|e| {
            StorageError::Transient(format!("writing {}: {e}", path.display()))
        })?;

        Ok(0)
    }

    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), StorageError> {
        self.before_call().await?;

        let file = tokio::fs::metadata(path).await.map_err(|e| {
            StorageError::Transient(format!("reading {}: {e}", path.display()))
        })?;

        lock(&self.objects).insert(
            key.to_string(),
            StoredBlob {
                size_bytes: i64::try_from(file.len()).unwrap_or(i64::MAX),
                content_type: Some(content_type.to_string()),
                metadata,
            },
        );

        Ok(())
    }
}

/// Records what it is asked to run instead of running it.
#[derive(Debug, Default)]
pub struct RecordingWorker {
    requests: Mutex<Vec<WorkerRequest>>,
    unreachable: AtomicBool,
    sync_response: Mutex<Option<WorkerResponse>>,
}

impl RecordingWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<WorkerRequest> {
        lock(&self.requests).clone()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// The answer every synchronous invocation gets.
    pub fn respond_with(&self, response: WorkerResponse) {
        *lock(&self.sync_response) = Some(response);
    }

    fn accept(&self, request: &WorkerRequest) -> Result<(), InvokeError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(InvokeError::Unreachable("connection refused".to_string()));
        }
        lock(&self.requests).push(request.clone());
        Ok(())
    }
}

#[async_trait]
impl WorkerInvoker for RecordingWorker {
    async fn invoke_async(
        &self,
        request: &WorkerRequest,
    ) -> Result<DispatchReceipt, InvokeError> {
        self.accept(request)?;
        let request_number = lock(&self.requests).len();

        Ok(DispatchReceipt {
            status_code: 202,
            request_id: Some(format!("memory-{request_number}")),
        })
    }

    async fn invoke_sync(
        &self,
        request: &WorkerRequest,
    ) -> Result<WorkerResponse, InvokeError> {
        self.accept(request)?;

        lock(&self.sync_response).clone().ok_or_else(|| {
            InvokeError::FunctionError("no response configured".to_string())
        })
    }
}
