use serde::{Deserialize, Serialize};

use crate::{MediaMetadata, SplitConfig};

/// Payload the dispatcher and the API send to the ffmpeg worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum WorkerRequest {
    ExtractMetadata {
        source_reference: String,
    },
    SplitVideo {
        source_reference: String,
        job_id: String,
        split_config: SplitConfig,
    },
}

impl WorkerRequest {
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::ExtractMetadata { .. } => "extract_metadata",
            Self::SplitVideo { .. } => "split_video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WorkerResponse {
    Metadata {
        metadata: MediaMetadata,
    },
    Split {
        job_id: String,
        segments_produced: usize,
        segments_failed: usize,
    },
    Error {
        error: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SplitMode;

    #[test]
    fn test_split_request_wire_shape() {
        let request = WorkerRequest::SplitVideo {
            source_reference: "movie.mp4".to_string(),
            job_id: "job-1".to_string(),
            split_config: SplitConfig::new(SplitMode::FixedPoints {
                points: vec![0.0, 120.0, 240.0],
            }),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["operation"], "split_video");
        assert_eq!(value["source_reference"], "movie.mp4");
        assert_eq!(value["job_id"], "job-1");
        assert_eq!(value["split_config"]["kind"], "fixed_points");
        assert_eq!(value["split_config"]["output_format"], "mp4");
    }

    #[test]
    fn test_metadata_request_parses() {
        let request: WorkerRequest = serde_json::from_str(
            r#"{"operation": "extract_metadata", "source_reference": "a.mkv"}"#,
        )
        .unwrap();

        assert_eq!(request.operation(), "extract_metadata");
        assert_eq!(
            request,
            WorkerRequest::ExtractMetadata {
                source_reference: "a.mkv".to_string()
            }
        );
    }
}
