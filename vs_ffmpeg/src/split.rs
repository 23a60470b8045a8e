use std::path::Path;

use tokio::process::Command;
use types::SegmentSpan;

use crate::{FfmpegError, check_status};

/// Maps an output format to the ffmpeg muxer that writes it.
pub fn muxer_for(output_format: &str) -> Option<&'static str> {
    match output_format {
        "mp4" => Some("mp4"),
        "mov" => Some("mov"),
        "mkv" => Some("matroska"),
        "webm" => Some("webm"),
        _ => None,
    }
}

pub fn content_type_for(output_format: &str) -> &'static str {
    match output_format {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Builds the ffmpeg command that cuts one segment out of `input`.
///
/// With `preserve_quality` the streams are copied as-is, which is fast but
/// snaps cuts to the nearest keyframe. Otherwise the segment is re-encoded
/// with a codec pair the target container accepts.
///
/// # Errors
/// Returns [`FfmpegError::UnsupportedFormat`] for formats without a muxer.
pub fn build_split_command(
    input: &Path,
    output: &Path,
    span: &SegmentSpan,
    preserve_quality: bool,
    output_format: &str,
) -> Result<Command, FfmpegError> {
    let muxer = muxer_for(output_format)
        .ok_or_else(|| FfmpegError::UnsupportedFormat(output_format.to_string()))?;

    let mut command = Command::new("ffmpeg");

    command
        .arg("-hide_banner")
        .arg("-nostdin")
        .arg("-y")
        // seeking before the input is fast and keyframe accurate
        .arg("-ss")
        .arg(format!("{:.3}", span.start))
        .arg("-i")
        .arg(input)
        .arg("-t")
        .arg(format!("{:.3}", span.duration()))
        .arg("-map")
        .arg("0:v?")
        .arg("-map")
        .arg("0:a?");

    if preserve_quality {
        command
            .arg("-c")
            .arg("copy")
            .arg("-avoid_negative_ts")
            .arg("make_zero");
    } else if output_format == "webm" {
        command
            .arg("-c:v")
            .arg("libvpx-vp9")
            .arg("-crf")
            .arg("32")
            .arg("-b:v")
            .arg("0")
            .arg("-c:a")
            .arg("libopus")
            .arg("-b:a")
            .arg("128k");
    } else {
        command
            .arg("-c:v")
            .arg("libx264")
            .arg("-preset")
            .arg("veryfast")
            .arg("-crf")
            .arg("20")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-c:a")
            .arg("aac")
            .arg("-b:a")
            .arg("192k");
    }

    if matches!(output_format, "mp4" | "mov") {
        command.arg("-movflags").arg("+faststart");
    }

    command.arg("-f").arg(muxer).arg(output);

    Ok(command)
}

/// Cuts one segment of `input` into `output`.
///
/// # Errors
/// Returns an error if ffmpeg cannot be spawned or fails to write the
/// segment.
#[tracing::instrument(skip(span), fields(index = span.index))]
pub async fn extract_segment(
    input: &Path,
    output: &Path,
    span: &SegmentSpan,
    preserve_quality: bool,
    output_format: &str,
) -> Result<(), FfmpegError> {
    tracing::info!(
        "Extracting segment {} [{:.3}, {:.3})",
        span.index,
        span.start,
        span.end
    );

    let mut command =
        build_split_command(input, output, span, preserve_quality, output_format)?;

    let command_output =
        command
            .output()
            .await
            .map_err(|source| FfmpegError::Spawn {
                program: "ffmpeg",
                source,
            })?;

    check_status("ffmpeg", &input.to_string_lossy(), &command_output)
}
