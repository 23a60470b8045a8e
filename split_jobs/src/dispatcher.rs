use chrono::Utc;
use serde::Serialize;
use tracing::instrument;
use types::{Job, JobStatus, WorkerRequest};

use crate::{
    JobService, MAX_LISTED_SEGMENTS,
    error::{JobError, StorageError},
    results::{describe_segments, segment_objects},
    storage::Transition,
};

/// What happened to one queued job during a dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Claimed and handed to the worker.
    Dispatched { confirmation: String },
    /// Output from an earlier run was already present, so the job was
    /// completed from it instead of being processed again.
    CompletedFromExistingOutput { segments: usize },
    /// Another dispatcher got there first, or the job was no longer queued.
    AlreadyClaimed,
    /// The worker could not be reached; the job is now failed.
    Failed { reason: String },
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub examined: usize,
    pub dispatched: usize,
    pub completed_from_existing: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Processing jobs failed for outliving the processing deadline.
    pub abandoned: usize,
}

impl DispatchSummary {
    pub fn record(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Dispatched { .. } => self.dispatched += 1,
            DispatchOutcome::CompletedFromExistingOutput { .. } => {
                self.completed_from_existing += 1;
            }
            DispatchOutcome::AlreadyClaimed => self.skipped += 1,
            DispatchOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

impl JobService {
    /// Dispatches up to `batch_size` queued jobs, then fails processing jobs
    /// that have passed the processing deadline.
    ///
    /// A job that cannot be inspected because storage is unavailable is left
    /// queued and counted as skipped; the next run picks it up again.
    ///
    /// # Errors
    /// Returns [`JobError::TransientStorageError`] if the queued jobs cannot
    /// be listed.
    #[instrument(skip(self))]
    pub async fn dispatch_pending(
        &self,
        batch_size: usize,
    ) -> Result<DispatchSummary, JobError> {
        let queued = self
            .jobs
            .list_by_status(JobStatus::Queued, batch_size)
            .await?;

        let mut summary = DispatchSummary {
            examined: queued.len(),
            ..DispatchSummary::default()
        };

        for job in &queued {
            match self.dispatch_job(job).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, "could not dispatch job: {e}");
                    summary.skipped += 1;
                }
            }
        }

        summary.abandoned = self.sweep_abandoned(batch_size).await;

        tracing::info!(?summary, "dispatch run finished");

        Ok(summary)
    }

    /// Polls the oldest processing jobs that are past the deadline, which
    /// completes them if their output is all there and fails them otherwise.
    async fn sweep_abandoned(&self, batch_size: usize) -> usize {
        let processing = match self
            .jobs
            .list_by_status(JobStatus::Processing, batch_size)
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!("could not list processing jobs: {e}");
                return 0;
            }
        };

        let now = Utc::now();
        let mut abandoned = 0;

        for job in processing.iter().filter(|job| self.is_overdue(job, now)) {
            match self.poll(&job.job_id).await {
                Ok(current) if current.status == JobStatus::Failed => abandoned += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, "could not check overdue job: {e}");
                }
            }
        }

        abandoned
    }

    /// Moves one queued job forward.
    ///
    /// Existing output under the job's prefix means an earlier attempt already
    /// did the work, so the job is completed from that output and the worker
    /// is not invoked again. Otherwise the job is claimed with a conditional
    /// `queued -> processing` write before the worker is invoked, which keeps
    /// two dispatchers from invoking it twice.
    ///
    /// # Errors
    /// Returns [`JobError::TransientStorageError`] when storage cannot be read
    /// or written; the job is then left as it was.
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub async fn dispatch_job(&self, job: &Job) -> Result<DispatchOutcome, JobError> {
        if job.status != JobStatus::Queued {
            return Ok(DispatchOutcome::AlreadyClaimed);
        }

        let prefix = self.output_prefix_for(&job.job_id);
        let existing = segment_objects(
            self.outputs.list(&prefix, MAX_LISTED_SEGMENTS).await?,
        );

        if !existing.is_empty() {
            return self.complete_from_existing(job, &existing).await;
        }

        match self
            .jobs
            .advance(
                &job.job_id,
                JobStatus::Queued,
                Transition::Processing { at: Utc::now() },
            )
            .await
        {
            Ok(()) => {}
            Err(StorageError::ConditionFailed(_)) => {
                tracing::info!("job was claimed elsewhere");
                return Ok(DispatchOutcome::AlreadyClaimed);
            }
            Err(e) => return Err(e.into()),
        }

        let request = WorkerRequest::SplitVideo {
            source_reference: job.source_reference.clone(),
            job_id: job.job_id.clone(),
            split_config: job.split_config.clone(),
        };

        match self.worker.invoke_async(&request).await {
            Ok(receipt) => {
                let confirmation = receipt.to_string();
                if let Err(e) = self
                    .jobs
                    .record_dispatch(&job.job_id, &confirmation)
                    .await
                {
                    tracing::warn!("could not record dispatch confirmation: {e}");
                }

                tracing::info!(%confirmation, "dispatched job to worker");
                Ok(DispatchOutcome::Dispatched { confirmation })
            }
            Err(invoke_error) => {
                let reason = invoke_error.to_string();
                let error = JobError::DispatchFailed {
                    job_id: job.job_id.clone(),
                    reason: reason.clone(),
                };
                tracing::error!("{error}");

                if let Err(e) = self
                    .jobs
                    .advance(
                        &job.job_id,
                        JobStatus::Processing,
                        Transition::Failed {
                            error: format!("{}: {reason}", error.kind()),
                            at: Utc::now(),
                        },
                    )
                    .await
                {
                    tracing::error!("could not mark job as failed: {e}");
                }

                Ok(DispatchOutcome::Failed {
                    reason: error.to_string(),
                })
            }
        }
    }

    async fn complete_from_existing(
        &self,
        job: &Job,
        existing: &[crate::StoredObject],
    ) -> Result<DispatchOutcome, JobError> {
        tracing::info!(
            objects = existing.len(),
            "output already exists, completing without dispatch"
        );

        let results = describe_segments(&self.outputs, existing).await?;
        let segments = results.len();

        match self
            .jobs
            .advance(
                &job.job_id,
                JobStatus::Queued,
                Transition::Completed {
                    results,
                    at: Utc::now(),
                },
            )
            .await
        {
            Ok(()) => Ok(DispatchOutcome::CompletedFromExistingOutput { segments }),
            Err(StorageError::ConditionFailed(_)) => {
                Ok(DispatchOutcome::AlreadyClaimed)
            }
            Err(e) => Err(e.into()),
        }
    }
}
