use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use split_jobs::{InvokeError, JobError, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Job(#[from] JobError),
    #[error("{0}")]
    InvalidRequest(String),
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        Self::Job(error.into())
    }
}

impl From<InvokeError> for ApiError {
    fn from(error: InvokeError) -> Self {
        Self::Job(error.into())
    }
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::Job(JobError::InvalidSplitConfig(_)) => StatusCode::BAD_REQUEST,
            Self::Job(JobError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Job(
                JobError::DispatchFailed { .. } | JobError::WorkerProcessingError(_),
            ) => StatusCode::BAD_GATEWAY,
            Self::Job(JobError::TransientStorageError(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::Job(error) => error.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "request failed: {self}");
        }

        (
            status,
            Json(serde_json::json!({
                "error": self.kind(),
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}
