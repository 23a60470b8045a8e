mod api;
mod job;
mod media;
pub mod naming;
mod split;
mod worker;

pub use api::{
    DownloadResponse, JobStatusResponse, MetadataRequest, SplitMethod,
    SplitVideoRequest, SplitVideoResponse, UploadUrlRequest,
    UploadUrlResponse,
};
pub use job::{Job, JobStatus, SegmentResult};
pub use media::{AudioTrack, MediaMetadata, SubtitleTrack, VideoTrack};
pub use split::{
    MAX_SEGMENTS, MIN_INTERVAL_LENGTH, OUTPUT_FORMATS, PlanError, SegmentSpan,
    SplitConfig, SplitMode, expected_segment_count, plan_for_source,
    plan_segments,
};
pub use worker::{WorkerRequest, WorkerResponse};
