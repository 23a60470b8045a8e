use tracing::instrument;
use types::{Job, PlanError, SplitConfig};

use crate::{JobService, error::JobError};

impl JobService {
    /// Validates a split request and records it as a queued job.
    ///
    /// Nothing is dispatched here; the returned job is `queued` with progress
    /// 0 and no results.
    ///
    /// # Errors
    /// - [`JobError::InvalidSplitConfig`] when the source or config is
    ///   unusable. No job is created in that case.
    /// - [`JobError::TransientStorageError`] when the job cannot be stored.
    #[instrument(skip(self, split_config))]
    pub async fn submit(
        &self,
        source_reference: &str,
        split_config: SplitConfig,
    ) -> Result<Job, JobError> {
        let source_reference = source_reference.trim();
        if source_reference.is_empty() {
            return Err(PlanError::MissingParameter("source_reference").into());
        }

        split_config.validate()?;

        let job = Job::new(source_reference.to_string(), split_config);
        self.jobs.create(&job).await?;

        tracing::info!(job_id = %job.job_id, "queued split job");

        Ok(job)
    }
}
