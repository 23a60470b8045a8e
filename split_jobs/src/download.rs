use tracing::instrument;
use types::{
    DownloadResponse,
    naming::{is_safe_filename, segment_key},
};

use crate::{JobService, error::JobError};

impl JobService {
    /// Issues a time-limited download URL for one segment of a job.
    ///
    /// # Errors
    /// [`JobError::NotFound`] if the job or the file does not exist, or the
    /// filename would reach outside the job's output prefix.
    #[instrument(skip(self))]
    pub async fn download_url(
        &self,
        job_id: &str,
        filename: &str,
    ) -> Result<DownloadResponse, JobError> {
        if !is_safe_filename(filename) {
            return Err(JobError::NotFound(format!("file {filename}")));
        }

        if self.jobs.get(job_id).await?.is_none() {
            return Err(JobError::NotFound(format!("job {job_id}")));
        }

        let key = segment_key(&self.settings.output_prefix, job_id, filename);

        if self.outputs.describe(&key).await?.is_none() {
            return Err(JobError::NotFound(format!("file {filename}")));
        }

        let ttl = self.settings.download_url_ttl;
        let download_url = self.outputs.presign_download(&key, ttl).await?;

        Ok(DownloadResponse {
            download_url,
            filename: filename.to_string(),
            expires_in: ttl.as_secs(),
        })
    }
}
