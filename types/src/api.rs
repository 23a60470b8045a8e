use serde::{Deserialize, Serialize};

use crate::{Job, JobStatus, PlanError, SegmentResult, SplitConfig, SplitMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    FixedPoints,
    Intervals,
}

/// Body of `POST /api/split-video`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitVideoRequest {
    pub source_reference: String,

    pub method: SplitMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_length: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_quality: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
}

impl SplitVideoRequest {
    /// Builds the validated split config described by this request.
    ///
    /// # Errors
    /// Returns a [`PlanError`] if the parameter for the chosen method is
    /// missing or the resulting config is invalid.
    pub fn split_config(&self) -> Result<SplitConfig, PlanError> {
        let mode = match self.method {
            SplitMethod::FixedPoints => SplitMode::FixedPoints {
                points: self
                    .points
                    .clone()
                    .ok_or(PlanError::MissingParameter("points"))?,
            },
            SplitMethod::Intervals => SplitMode::Intervals {
                interval_length: self
                    .interval_length
                    .ok_or(PlanError::MissingParameter("interval_length"))?,
            },
        };

        let mut config = SplitConfig::new(mode);
        if let Some(preserve_quality) = self.preserve_quality {
            config.preserve_quality = preserve_quality;
        }
        if let Some(output_format) = &self.output_format {
            config.output_format = output_format.trim().to_lowercase();
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitVideoResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Body of `GET /api/job-status/{job_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,

    pub status: JobStatus,

    pub progress: u8,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SegmentResult>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        let message = match job.status {
            JobStatus::Queued => "Job is queued for processing".to_string(),
            JobStatus::Processing => match job.expected_segments {
                Some(expected) => {
                    format!("Splitting video into {expected} segments")
                }
                None => "Splitting video".to_string(),
            },
            JobStatus::Completed => {
                format!("Video split into {} segments", job.results.len())
            }
            JobStatus::Failed => format!(
                "Job failed: {}",
                job.error.as_deref().unwrap_or("unknown error")
            ),
        };

        let progress = if job.status == JobStatus::Completed {
            100
        } else {
            job.progress.min(99)
        };

        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            progress,
            message,
            results: (!job.results.is_empty()).then(|| job.results.clone()),
            error: job.error.clone(),
        }
    }
}

/// Body of `GET /api/download/{job_id}/{filename}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub download_url: String,
    pub filename: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadUrlRequest {
    pub filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadUrlResponse {
    pub upload_url: String,
    pub source_reference: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRequest {
    pub source_reference: String,
}
