use std::path::Path;

use chrono::Utc;
use split_jobs::{JobError, JobStore, StorageError, Transition};
use tracing::{info, instrument, warn};
use types::{
    JobStatus, SegmentResult, SplitConfig, WorkerResponse,
    naming::{is_safe_filename, segment_filename, segment_key, segment_metadata},
    plan_for_source,
};
use vs_ffmpeg::split::content_type_for;

use crate::AppContext;

/// Name the downloaded source is stored under in the work directory.
fn local_source_name(source_reference: &str) -> &str {
    source_reference
        .rsplit('/')
        .next()
        .filter(|name| is_safe_filename(name))
        .unwrap_or("source")
}

/// Cuts a job's source into segments and records the outcome on the job.
#[instrument(skip(context, split_config))]
pub async fn split_video(
    context: &AppContext,
    job_id: &str,
    source_reference: &str,
    split_config: &SplitConfig,
) -> WorkerResponse {
    match run_split(context, job_id, source_reference, split_config).await {
        Ok(response) => response,
        Err(e) => {
            warn!("split failed: {e}");
            fail_job(context.jobs.as_ref(), job_id, &e).await;
            WorkerResponse::Error {
                error: e.kind().to_string(),
                message: e.to_string(),
            }
        }
    }
}

async fn run_split(
    context: &AppContext,
    job_id: &str,
    source_reference: &str,
    split_config: &SplitConfig,
) -> Result<WorkerResponse, JobError> {
    let job = context
        .jobs
        .get(job_id)
        .await?
        .ok_or_else(|| JobError::NotFound(format!("job {job_id}")))?;

    if job.status.is_terminal() {
        info!(status = %job.status, "job already finished, nothing to do");
        return Ok(WorkerResponse::Split {
            job_id: job_id.to_string(),
            segments_produced: job.results.len(),
            segments_failed: 0,
        });
    }

    if job.status == JobStatus::Queued {
        // invoked directly rather than through the dispatcher
        if !claim(context.jobs.as_ref(), job_id).await? {
            info!("job was claimed elsewhere, leaving it to that run");
            return Ok(WorkerResponse::Split {
                job_id: job_id.to_string(),
                segments_produced: 0,
                segments_failed: 0,
            });
        }
    } else if job.expected_segments.is_some() {
        // an earlier run got as far as planning; this is a retry
        let error = JobError::WorkerProcessingError(format!(
            "job {job_id} was already attempted"
        ));
        warn!("{error}");
        return Ok(WorkerResponse::Error {
            error: error.kind().to_string(),
            message: error.to_string(),
        });
    }

    let workdir = tempfile::tempdir().map_err(|e| {
        JobError::WorkerProcessingError(format!("could not create work directory: {e}"))
    })?;
    let input = workdir.path().join(local_source_name(source_reference));

    context
        .sources
        .download_to_file(source_reference, &input)
        .await
        .map_err(|e| match e {
            StorageError::NotFound(_) => JobError::WorkerProcessingError(format!(
                "source {source_reference} does not exist"
            )),
            other => other.into(),
        })?;

    let input_url = input.to_string_lossy();
    let metadata = context
        .media
        .probe(&input_url)
        .await
        .map_err(|e| JobError::WorkerProcessingError(format!("probe failed: {e}")))?;

    let spans = plan_for_source(&split_config.mode, metadata.duration)?;
    let expected = u32::try_from(spans.len()).unwrap_or(u32::MAX);

    if let Err(e) = context
        .jobs
        .record_plan(job_id, metadata.duration, expected)
        .await
    {
        warn!("could not record plan: {e}");
    }

    info!(
        duration = metadata.duration,
        segments = spans.len(),
        "splitting source"
    );

    let mut results = Vec::with_capacity(spans.len());
    let mut failed = 0;

    for span in &spans {
        let filename = segment_filename(span.index, &split_config.output_format);
        let output = workdir.path().join(&filename);

        if let Err(e) = context
            .media
            .cut(
                &input,
                &output,
                span,
                split_config.preserve_quality,
                &split_config.output_format,
            )
            .await
        {
            warn!(index = span.index, "segment extraction failed: {e}");
            failed += 1;
            continue;
        }

        match upload_segment(context, job_id, &filename, &output, split_config, span).await {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!(index = span.index, "segment upload failed: {e}");
                failed += 1;
            }
        }

        if let Err(e) = tokio::fs::remove_file(&output).await {
            warn!("could not remove {}: {e}", output.display());
        }
    }

    finish_job(context.jobs.as_ref(), job_id, results, failed).await
}

/// Moves a queued job to processing. `false` means another run owns it.
async fn claim(jobs: &dyn JobStore, job_id: &str) -> Result<bool, JobError> {
    match jobs
        .advance(
            job_id,
            JobStatus::Queued,
            Transition::Processing { at: Utc::now() },
        )
        .await
    {
        Ok(()) => Ok(true),
        Err(StorageError::ConditionFailed(_)) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn upload_segment(
    context: &AppContext,
    job_id: &str,
    filename: &str,
    output: &Path,
    split_config: &SplitConfig,
    span: &types::SegmentSpan,
) -> Result<SegmentResult, StorageError> {
    let key = segment_key(&context.output_prefix, job_id, filename);

    let size_bytes = tokio::fs::metadata(output)
        .await
        .ok()
        .and_then(|m| i64::try_from(m.len()).ok());

    context
        .outputs
        .upload_file(
            &key,
            output,
            content_type_for(&split_config.output_format),
            segment_metadata(span),
        )
        .await?;

    Ok(SegmentResult {
        index: span.index,
        filename: filename.to_string(),
        key,
        start: span.start,
        end: span.end,
        duration: span.duration(),
        size_bytes,
    })
}

/// Completes the job with every segment that was produced.
///
/// A job the status poller already completed is left untouched.
async fn finish_job(
    jobs: &dyn JobStore,
    job_id: &str,
    results: Vec<SegmentResult>,
    failed: usize,
) -> Result<WorkerResponse, JobError> {
    if results.is_empty() {
        return Err(JobError::WorkerProcessingError(format!(
            "no segments produced, {failed} failed"
        )));
    }

    let produced = results.len();

    match jobs
        .advance(
            job_id,
            JobStatus::Processing,
            Transition::Completed {
                results,
                at: Utc::now(),
            },
        )
        .await
    {
        Ok(()) => info!(produced, failed, "job completed"),
        Err(StorageError::ConditionFailed(_)) => {
            info!(produced, failed, "job was already finished elsewhere");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(WorkerResponse::Split {
        job_id: job_id.to_string(),
        segments_produced: produced,
        segments_failed: failed,
    })
}

async fn fail_job(jobs: &dyn JobStore, job_id: &str, error: &JobError) {
    if matches!(error, JobError::NotFound(_)) {
        return;
    }

    match jobs
        .advance(
            job_id,
            JobStatus::Processing,
            Transition::Failed {
                error: format!("{}: {error}", error.kind()),
                at: Utc::now(),
            },
        )
        .await
    {
        Ok(()) | Err(StorageError::ConditionFailed(_)) => {}
        Err(e) => warn!("could not mark job as failed: {e}"),
    }
}
