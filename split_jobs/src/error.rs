use thiserror::Error;
use types::{JobStatus, PlanError};

/// Failure of a single call to durable storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("conditional write rejected: {0}")]
    ConditionFailed(String),
    #[error("cannot move a job from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("storage request failed: {0}")]
    Transient(String),
}

/// Failure to hand a request to the ffmpeg worker.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("worker unreachable: {0}")]
    Unreachable(String),
    #[error("worker rejected the invocation with status {0}")]
    Rejected(i32),
    #[error("worker failed: {0}")]
    FunctionError(String),
    #[error("invalid worker payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The error taxonomy clients see.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid split config: {0}")]
    InvalidSplitConfig(#[from] PlanError),
    #[error("could not dispatch job {job_id}: {reason}")]
    DispatchFailed { job_id: String, reason: String },
    #[error("{0}")]
    WorkerProcessingError(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("storage temporarily unavailable: {0}")]
    TransientStorageError(String),
}

impl JobError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSplitConfig(_) => "InvalidSplitConfig",
            Self::DispatchFailed { .. } => "DispatchFailed",
            Self::WorkerProcessingError(_) => "WorkerProcessingError",
            Self::NotFound(_) => "NotFound",
            Self::TransientStorageError(_) => "TransientStorageError",
        }
    }
}

impl From<StorageError> for JobError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(what) => Self::NotFound(what),
            other => Self::TransientStorageError(other.to_string()),
        }
    }
}

impl From<InvokeError> for JobError {
    fn from(error: InvokeError) -> Self {
        match error {
            InvokeError::FunctionError(message) => {
                Self::WorkerProcessingError(message)
            }
            other => Self::WorkerProcessingError(other.to_string()),
        }
    }
}
