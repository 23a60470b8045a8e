use std::path::Path;

use async_trait::async_trait;
use types::{MediaMetadata, SegmentSpan};
use vs_ffmpeg::FfmpegError;

/// The ffprobe and ffmpeg work the worker delegates.
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Reads duration and tracks from a local path or URL.
    async fn probe(&self, input: &str) -> Result<MediaMetadata, FfmpegError>;

    /// Writes `span` of `input` to `output`.
    async fn cut(
        &self,
        input: &Path,
        output: &Path,
        span: &SegmentSpan,
        preserve_quality: bool,
        output_format: &str,
    ) -> Result<(), FfmpegError>;
}

/// Runs the ffprobe and ffmpeg binaries on the `PATH`.
pub struct Ffmpeg;

#[async_trait]
impl MediaTools for Ffmpeg {
    async fn probe(&self, input: &str) -> Result<MediaMetadata, FfmpegError> {
        vs_ffmpeg::ffprobe::extract_metadata(input).await
    }

    async fn cut(
        &self,
        input: &Path,
        output: &Path,
        span: &SegmentSpan,
        preserve_quality: bool,
        output_format: &str,
    ) -> Result<(), FfmpegError> {
        vs_ffmpeg::split::extract_segment(
            input,
            output,
            span,
            preserve_quality,
            output_format,
        )
        .await
    }
}

/// Reports a fixed duration and writes a few bytes per segment, failing
/// the listed segment indexes.
#[cfg(test)]
pub struct FakeMedia {
    pub duration: f64,
    pub failing: Vec<u32>,
}

#[cfg(test)]
#[async_trait]
impl MediaTools for FakeMedia {
    async fn probe(&self, _input: &str) -> Result<MediaMetadata, FfmpegError> {
        Ok(MediaMetadata {
            duration: self.duration,
            format_name: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            ..MediaMetadata::default()
        })
    }

    async fn cut(
        &self,
        _input: &Path,
        output: &Path,
        span: &SegmentSpan,
        _preserve_quality: bool,
        _output_format: &str,
    ) -> Result<(), FfmpegError> {
        if self.failing.contains(&span.index) {
            return Err(FfmpegError::Failed {
                program: "ffmpeg",
                code: 1,
                stderr: "Invalid data found when processing input".to_string(),
            });
        }

        tokio::fs::write(output, [0u8; 16])
            .await
            .map_err(|source| FfmpegError::Spawn {
                program: "ffmpeg",
                source,
            })
    }
}
