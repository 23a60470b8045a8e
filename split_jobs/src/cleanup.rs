use serde::Serialize;
use tracing::instrument;

use crate::{JobService, error::JobError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub job_id: String,
    pub objects_deleted: usize,
}

impl JobService {
    /// Deletes a job's output and then its descriptor.
    ///
    /// The source video is never touched. Output that cannot be deleted is
    /// logged and left behind; the descriptor is removed regardless.
    ///
    /// # Errors
    /// [`JobError::NotFound`] for an unknown job,
    /// [`JobError::TransientStorageError`] if the descriptor cannot be removed.
    #[instrument(skip(self))]
    pub async fn delete_job(&self, job_id: &str) -> Result<CleanupSummary, JobError> {
        if self.jobs.get(job_id).await?.is_none() {
            return Err(JobError::NotFound(format!("job {job_id}")));
        }

        let prefix = self.output_prefix_for(job_id);
        let objects_deleted = match self.outputs.delete_prefix(&prefix).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(%prefix, "could not delete job output: {e}");
                0
            }
        };

        self.jobs.delete(job_id).await?;

        tracing::info!(objects_deleted, "deleted job");

        Ok(CleanupSummary {
            job_id: job_id.to_string(),
            objects_deleted,
        })
    }
}
