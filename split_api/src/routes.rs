use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;
use split_jobs::{DispatchOutcome, JobError, ObjectStore, WorkerInvoker};
use types::{
    DownloadResponse, JobStatusResponse, MediaMetadata, MetadataRequest,
    SplitVideoRequest, SplitVideoResponse, UploadUrlRequest, UploadUrlResponse,
    WorkerRequest, WorkerResponse, naming::is_safe_filename,
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

pub fn router(state: AppState) -> Router {
    vs_axum::with_common_layers(
        Router::new()
            .route("/api/health", get(health))
            .route("/api/split-video", post(split_video))
            .route("/api/job-status/{job_id}", get(job_status))
            .route("/api/download/{job_id}/{filename}", get(download))
            .route("/api/upload-url", post(upload_url))
            .route("/api/video-metadata", post(video_metadata))
            .route("/api/jobs/{job_id}", delete(delete_job))
            .with_state(state),
    )
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn split_video(
    State(state): State<AppState>,
    payload: Result<Json<SplitVideoRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SplitVideoResponse>), ApiError> {
    let request = body(payload)?;
    let split_config = request.split_config().map_err(JobError::from)?;

    let job = state
        .jobs
        .submit(&request.source_reference, split_config)
        .await?;

    if state.dispatch_on_submit {
        // the scheduled dispatcher retries anything left queued here
        match state.jobs.dispatch_job(&job).await {
            Ok(DispatchOutcome::Failed { reason }) => {
                tracing::warn!(job_id = %job.job_id, %reason, "immediate dispatch failed");
            }
            Ok(outcome) => {
                tracing::debug!(job_id = %job.job_id, ?outcome, "immediate dispatch");
            }
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, "job left queued: {e}");
            }
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(SplitVideoResponse {
            job_id: job.job_id,
            status: job.status,
        }),
    ))
}

async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state.jobs.poll(&job_id).await?;
    Ok(Json(JobStatusResponse::from(&job)))
}

async fn download(
    State(state): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
) -> Result<Json<DownloadResponse>, ApiError> {
    Ok(Json(state.jobs.download_url(&job_id, &filename).await?))
}

async fn upload_url(
    State(state): State<AppState>,
    payload: Result<Json<UploadUrlRequest>, JsonRejection>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    let request = body(payload)?;

    if !is_safe_filename(&request.filename) {
        return Err(ApiError::InvalidRequest(format!(
            "invalid filename: {}",
            request.filename
        )));
    }

    let source_reference = format!(
        "{}/{}/{}",
        state.uploads.prefix.trim_end_matches('/'),
        Uuid::now_v7(),
        request.filename
    );

    let upload_url = state
        .sources
        .presign_upload(
            &source_reference,
            request.content_type.as_deref(),
            state.uploads.url_ttl,
        )
        .await?;

    Ok(Json(UploadUrlResponse {
        upload_url,
        source_reference,
        expires_in: state.uploads.url_ttl.as_secs(),
    }))
}

async fn video_metadata(
    State(state): State<AppState>,
    payload: Result<Json<MetadataRequest>, JsonRejection>,
) -> Result<Json<MediaMetadata>, ApiError> {
    let request = body(payload)?;

    if request.source_reference.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "source_reference is required".to_string(),
        ));
    }

    let response = state
        .jobs
        .worker
        .invoke_sync(&WorkerRequest::ExtractMetadata {
            source_reference: request.source_reference.clone(),
        })
        .await?;

    match response {
        WorkerResponse::Metadata { metadata } => Ok(Json(metadata)),
        WorkerResponse::Error { error, message } if error == "NotFound" => {
            Err(JobError::NotFound(message).into())
        }
        WorkerResponse::Error { error, message } => {
            Err(JobError::WorkerProcessingError(format!("{error}: {message}")).into())
        }
        WorkerResponse::Split { .. } => Err(JobError::WorkerProcessingError(
            "unexpected response to extract_metadata".to_string(),
        )
        .into()),
    }
}

async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.jobs.delete_job(&job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UploadSettings;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use split_jobs::{
        JobService, JobSettings,
        memory::{InMemoryJobStore, InMemoryObjectStore, RecordingWorker},
    };
    use std::{sync::Arc, time::Duration};
    use tower::ServiceExt;
    use types::naming::{segment_key, segment_metadata};

    struct TestApp {
        outputs: Arc<InMemoryObjectStore>,
        worker: Arc<RecordingWorker>,
        router: Router,
    }

    fn test_app(dispatch_on_submit: bool) -> TestApp {
        let outputs = Arc::new(InMemoryObjectStore::new());
        let worker = Arc::new(RecordingWorker::new());

        let state = AppState {
            jobs: JobService::new(
                Arc::new(InMemoryJobStore::new()),
                outputs.clone(),
                worker.clone(),
                JobSettings::default(),
            ),
            sources: Arc::new(InMemoryObjectStore::new()),
            uploads: UploadSettings {
                prefix: "uploads".to_string(),
                url_ttl: Duration::from_secs(900),
            },
            dispatch_on_submit,
        };

        TestApp {
            outputs,
            worker,
            router: router(state),
        }
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::ORIGIN, "https://app.example.com")
            .header(header::CONTENT_TYPE, "application/json");

        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, value)
    }

    async fn submit(router: &Router, body: Value) -> String {
        let (status, response) =
            send(router, "POST", "/api/split-video", Some(body)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(response["status"], "queued");
        response["job_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(false);
        let (status, body) = send(&app.router, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_submit_then_poll_queued() {
        let app = test_app(false);
        let job_id = submit(
            &app.router,
            json!({
                "source_reference": "movie.mp4",
                "method": "fixed_points",
                "points": [0, 120, 240],
            }),
        )
        .await;

        let (status, body) =
            send(&app.router, "GET", &format!("/api/job-status/{job_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "queued");
        assert_eq!(body["progress"], 0);
        assert!(body.get("results").is_none());
        assert!(app.worker.requests().is_empty());
    }

    #[tokio::test]
    async fn test_submit_dispatches_and_completes() {
        let app = test_app(true);
        let job_id = submit(
            &app.router,
            json!({
                "source_reference": "movie.mp4",
                "method": "fixed_points",
                "points": [0, 120, 240],
            }),
        )
        .await;
        assert_eq!(app.worker.requests().len(), 1);

        let (_, body) =
            send(&app.router, "GET", &format!("/api/job-status/{job_id}"), None).await;
        assert_eq!(body["status"], "processing");

        for (index, start, end) in [(1, 0.0, 120.0), (2, 120.0, 240.0)] {
            let filename = format!("segment_00{index}.mp4");
            app.outputs.put(
                &segment_key("jobs", &job_id, &filename),
                2048,
                segment_metadata(&types::SegmentSpan { index, start, end }),
            );
        }

        let (status, body) =
            send(&app.router, "GET", &format!("/api/job-status/{job_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["progress"], 100);
        assert_eq!(body["results"].as_array().unwrap().len(), 2);
        assert_eq!(body["results"][1]["start"], 120.0);
        assert_eq!(body["results"][1]["end"], 240.0);

        let (status, body) = send(
            &app.router,
            "GET",
            &format!("/api/download/{job_id}/segment_002.mp4"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filename"], "segment_002.mp4");
        assert_eq!(body["expires_in"], 3600);

        let (status, _) =
            send(&app.router, "DELETE", &format!("/api/jobs/{job_id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(app.outputs.keys().is_empty());

        let (status, body) =
            send(&app.router, "GET", &format!("/api/job-status/{job_id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_invalid_config_is_bad_request() {
        let app = test_app(true);

        for body in [
            json!({ "source_reference": "movie.mp4", "method": "fixed_points", "points": [10] }),
            json!({ "source_reference": "movie.mp4", "method": "fixed_points", "points": [0, 50, 20] }),
            json!({ "source_reference": "movie.mp4", "method": "intervals", "interval_length": 0 }),
            json!({ "source_reference": "movie.mp4", "method": "intervals", "interval_length": 60, "output_format": "gif" }),
        ] {
            let (status, response) =
                send(&app.router, "POST", "/api/split-video", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(response["error"], "InvalidSplitConfig");
        }

        let (status, response) = send(
            &app.router,
            "POST",
            "/api/split-video",
            Some(json!({ "source_reference": "movie.mp4", "method": "halves" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], "InvalidRequest");

        assert!(app.worker.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let app = test_app(false);

        let (status, body) =
            send(&app.router, "GET", "/api/job-status/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NotFound");

        let (status, _) =
            send(&app.router, "GET", "/api/download/nope/segment_001.mp4", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app.router, "DELETE", "/api/jobs/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app.router, "GET", "/api/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "not found");
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_visible_when_polling() {
        let app = test_app(true);
        app.worker.set_unreachable(true);

        let job_id = submit(
            &app.router,
            json!({
                "source_reference": "movie.mp4",
                "method": "intervals",
                "interval_length": 300,
            }),
        )
        .await;

        let (status, body) =
            send(&app.router, "GET", &format!("/api/job-status/{job_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "failed");
        assert!(body["error"].as_str().unwrap().starts_with("DispatchFailed"));
    }

    #[tokio::test]
    async fn test_upload_url() {
        let app = test_app(false);

        let (status, body) = send(
            &app.router,
            "POST",
            "/api/upload-url",
            Some(json!({ "filename": "movie.mp4", "content_type": "video/mp4" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["expires_in"], 900);

        let source_reference = body["source_reference"].as_str().unwrap();
        assert!(source_reference.starts_with("uploads/"));
        assert!(source_reference.ends_with("/movie.mp4"));
        assert!(
            body["upload_url"]
                .as_str()
                .unwrap()
                .contains("content-type=video/mp4")
        );

        let (status, body) = send(
            &app.router,
            "POST",
            "/api/upload-url",
            Some(json!({ "filename": "../etc/passwd" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidRequest");
    }

    #[tokio::test]
    async fn test_video_metadata() {
        let app = test_app(false);
        app.worker.respond_with(WorkerResponse::Metadata {
            metadata: MediaMetadata {
                duration: 700.0,
                format_name: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
                ..MediaMetadata::default()
            },
        });

        let (status, body) = send(
            &app.router,
            "POST",
            "/api/video-metadata",
            Some(json!({ "source_reference": "uploads/movie.mp4" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["duration"], 700.0);

        app.worker.respond_with(WorkerResponse::Error {
            error: "NotFound".to_string(),
            message: "source uploads/missing.mp4 does not exist".to_string(),
        });
        let (status, _) = send(
            &app.router,
            "POST",
            "/api/video-metadata",
            Some(json!({ "source_reference": "uploads/missing.mp4" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let requests = app.worker.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0],
            WorkerRequest::ExtractMetadata {
                source_reference: "uploads/movie.mp4".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_storage_outage_keeps_last_known_status() {
        let app = test_app(true);
        let job_id = submit(
            &app.router,
            json!({
                "source_reference": "movie.mp4",
                "method": "fixed_points",
                "points": [0, 60],
            }),
        )
        .await;
        app.outputs.set_unavailable(true);

        let (status, body) =
            send(&app.router, "GET", &format!("/api/job-status/{job_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "processing");
    }
}
