use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::split::SplitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a job may move from `self` to `next`.
    ///
    /// Transitions only ever go forward: queued, then processing, then one
    /// of completed or failed.
    pub const fn can_advance_to(self, next: Self) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A produced segment, as recorded by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentResult {
    pub index: u32,
    pub filename: String,
    pub key: String,
    pub start: f64,
    pub end: f64,
    pub duration: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,

    pub source_reference: String,

    pub split_config: SplitConfig,

    pub status: JobStatus,

    #[serde(default)]
    pub progress: u8,

    #[serde(default)]
    pub results: Vec<SegmentResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_segments: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_duration: Option<f64>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_confirmation: Option<String>,
}

impl Job {
    /// A freshly queued job with a new time-ordered id.
    pub fn new(source_reference: String, split_config: SplitConfig) -> Self {
        Self {
            job_id: uuid::Uuid::now_v7().to_string(),
            source_reference,
            split_config,
            status: JobStatus::Queued,
            progress: 0,
            results: Vec::new(),
            expected_segments: None,
            source_duration: None,
            created_at: Utc::now(),
            processing_started_at: None,
            completed_at: None,
            failed_at: None,
            error: None,
            dispatch_confirmation: None,
        }
    }
}
