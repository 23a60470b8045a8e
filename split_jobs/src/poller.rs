use chrono::{DateTime, TimeDelta, Utc};
use tracing::instrument;
use types::{Job, JobStatus, SegmentResult, expected_segment_count};

use crate::{
    JobService, MAX_LISTED_SEGMENTS,
    error::{JobError, StorageError},
    results::{describe_segments, segment_objects},
    storage::Transition,
};

/// Progress shown while the expected segment count is still unknown.
const UNKNOWN_PLAN_BASE: u32 = 25;
const UNKNOWN_PLAN_STEP: u32 = 10;
const UNKNOWN_PLAN_CEILING: u32 = 95;

/// Highest progress a job can report before it is completed.
const IN_FLIGHT_CEILING: u32 = 99;

const ABANDONED_REASON: &str = "worker did not finish";

enum Observation {
    Progress { found: usize, expected: Option<u32> },
    Complete(Vec<SegmentResult>),
}

/// Estimates progress from the number of segments found so far.
///
/// With a known segment count this is the share of segments present. Until
/// the worker has probed the source, a coarse value that grows with each
/// segment is used. Never reaches 100; only completion does that.
#[allow(clippy::cast_possible_truncation)]
pub fn progress_from_segments(found: usize, expected: Option<u32>) -> u8 {
    let found = u32::try_from(found).unwrap_or(u32::MAX);

    let progress = match expected {
        Some(expected) if expected > 0 => {
            (found.saturating_mul(100) / expected).min(IN_FLIGHT_CEILING)
        }
        _ => UNKNOWN_PLAN_BASE
            .saturating_add(found.saturating_mul(UNKNOWN_PLAN_STEP))
            .min(UNKNOWN_PLAN_CEILING),
    };

    progress as u8
}

impl JobService {
    /// Reports a job's status, advancing it when its output is complete.
    ///
    /// Terminal jobs are returned exactly as stored. For a processing job the
    /// output prefix is inspected within the poll budget. If that inspection
    /// fails or runs out of time, the last known status is returned instead
    /// of an error. A job whose output is still incomplete after the
    /// processing deadline is failed.
    ///
    /// # Errors
    /// - [`JobError::NotFound`] for an unknown job id.
    /// - [`JobError::TransientStorageError`] if the job itself cannot be read.
    #[instrument(skip(self))]
    pub async fn poll(&self, job_id: &str) -> Result<Job, JobError> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(format!("job {job_id}")))?;

        if job.status != JobStatus::Processing {
            return Ok(job);
        }

        let inspection = tokio::time::timeout(
            self.settings.poll_budget,
            self.inspect_output(&job),
        )
        .await;

        match inspection {
            Ok(Ok(observation)) => Ok(self.apply(job, observation).await),
            Ok(Err(e)) => {
                tracing::warn!("output inspection failed, reporting last known status: {e}");
                Ok(job)
            }
            Err(_) => {
                tracing::warn!(
                    budget_ms = self.settings.poll_budget.as_millis(),
                    "output inspection ran out of time, reporting last known status"
                );
                Ok(job)
            }
        }
    }

    /// Whether a processing job has outlived the processing deadline.
    pub fn is_overdue(&self, job: &Job, now: DateTime<Utc>) -> bool {
        let started = job.processing_started_at.unwrap_or(job.created_at);

        TimeDelta::from_std(self.settings.processing_deadline)
            .is_ok_and(|deadline| now - started > deadline)
    }

    async fn inspect_output(&self, job: &Job) -> Result<Observation, StorageError> {
        let prefix = self.output_prefix_for(&job.job_id);
        let segments = segment_objects(
            self.outputs.list(&prefix, MAX_LISTED_SEGMENTS).await?,
        );

        let expected = job.expected_segments.or_else(|| {
            expected_segment_count(&job.split_config.mode, job.source_duration)
        });

        let found = segments.len();

        match expected {
            Some(count) if count > 0 && found >= count as usize => {
                let results = describe_segments(&self.outputs, &segments).await?;
                if results.len() >= count as usize {
                    Ok(Observation::Complete(results))
                } else {
                    Ok(Observation::Progress {
                        found: results.len(),
                        expected,
                    })
                }
            }
            _ => Ok(Observation::Progress { found, expected }),
        }
    }

    async fn apply(&self, mut job: Job, observation: Observation) -> Job {
        match observation {
            Observation::Complete(results) => {
                let completed_at = Utc::now();
                let outcome = self
                    .jobs
                    .advance(
                        &job.job_id,
                        JobStatus::Processing,
                        Transition::Completed {
                            results: results.clone(),
                            at: completed_at,
                        },
                    )
                    .await;

                match outcome {
                    Ok(()) => {
                        tracing::info!(
                            segments = results.len(),
                            "all segments present, job completed"
                        );
                        job.status = JobStatus::Completed;
                        job.progress = 100;
                        job.results = results;
                        job.completed_at = Some(completed_at);
                        job
                    }
                    Err(StorageError::ConditionFailed(_)) => {
                        // someone else finished the job first
                        match self.jobs.get(&job.job_id).await {
                            Ok(Some(current)) => current,
                            Ok(None) | Err(_) => job,
                        }
                    }
                    Err(e) => {
                        tracing::warn!("could not complete job: {e}");
                        job
                    }
                }
            }
            Observation::Progress { .. } if self.is_overdue(&job, Utc::now()) => {
                self.fail_abandoned(job).await
            }
            Observation::Progress { found, expected } => {
                let progress = progress_from_segments(found, expected);

                if progress > job.progress {
                    match self.jobs.record_progress(&job.job_id, progress).await {
                        Ok(()) | Err(StorageError::ConditionFailed(_)) => {}
                        Err(e) => tracing::warn!("could not record progress: {e}"),
                    }
                    job.progress = progress;
                }

                job
            }
        }
    }

    async fn fail_abandoned(&self, mut job: Job) -> Job {
        let error = JobError::WorkerProcessingError(ABANDONED_REASON.to_string());
        let message = format!("{}: {error}", error.kind());
        let failed_at = Utc::now();

        tracing::warn!(
            started = ?job.processing_started_at,
            "job passed its processing deadline, failing it"
        );

        match self
            .jobs
            .advance(
                &job.job_id,
                JobStatus::Processing,
                Transition::Failed {
                    error: message.clone(),
                    at: failed_at,
                },
            )
            .await
        {
            Ok(()) => {
                job.status = JobStatus::Failed;
                job.error = Some(message);
                job.failed_at = Some(failed_at);
                job
            }
            Err(StorageError::ConditionFailed(_)) => {
                match self.jobs.get(&job.job_id).await {
                    Ok(Some(current)) => current,
                    Ok(None) | Err(_) => job,
                }
            }
            Err(e) => {
                tracing::warn!("could not fail abandoned job: {e}");
                job
            }
        }
    }
}
