use serde::Deserialize;
use tokio::process::Command;
use types::{AudioTrack, MediaMetadata, SubtitleTrack, VideoTrack};

use crate::{FfmpegError, check_status, redacted_input};

/*
Sample ffprobe output (trimmed)
{
    "streams": [
        {
            "index": 0,
            "codec_name": "h264",
            "codec_type": "video",
            "width": 2560,
            "height": 1440,
            "pix_fmt": "yuv420p",
            "r_frame_rate": "60/1",
            "tags": {
                "DURATION": "00:20:04.167000000"
            }
        },
        {
            "index": 1,
            "codec_name": "aac",
            "codec_type": "audio",
            "sample_rate": "48000",
            "channels": 2,
            "channel_layout": "stereo",
            "tags": {
                "title": "track 1",
                "DURATION": "00:20:04.181000000"
            }
        }
    ],
    "format": {
        "filename": "2023-11-28 07-52-00.mkv",
        "nb_streams": 2,
        "format_name": "matroska,webm",
        "format_long_name": "Matroska / WebM",
        "start_time": "0.000000",
        "duration": "1204.181000",
        "size": "6090918208",
        "bit_rate": "40465134"
    }
}
*/

fn str_to_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(s.and_then(|s| s.parse().ok()))
}

fn str_to_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(s.and_then(|s| s.parse().ok()))
}

fn str_to_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(s.and_then(|s| s.parse().ok()))
}

#[derive(Debug, Deserialize)]
pub struct FFProbeStream {
    pub index: u32,
    pub codec_name: Option<String>,
    pub codec_long_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pix_fmt: Option<String>,
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
    #[serde(default)]
    #[serde(deserialize_with = "str_to_u32")]
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub channel_layout: Option<String>,
    #[serde(default)]
    #[serde(deserialize_with = "str_to_f64")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub tags: FFProbeTags,
}

#[derive(Debug, Default, Deserialize)]
pub struct FFProbeTags {
    // Matroska stores per-stream durations as a tag instead of a field.
    #[serde(rename = "DURATION")]
    pub duration: Option<String>,
    pub language: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FFProbeFormat {
    pub filename: Option<String>,
    pub nb_streams: Option<u32>,
    pub format_name: String,
    pub format_long_name: Option<String>,
    pub start_time: Option<String>,
    #[serde(default)]
    #[serde(deserialize_with = "str_to_f64")]
    pub duration: Option<f64>,
    #[serde(default)]
    #[serde(deserialize_with = "str_to_u64")]
    pub size: Option<u64>,
    #[serde(default)]
    #[serde(deserialize_with = "str_to_u64")]
    pub bit_rate: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct FFProbeOutput {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    pub format: FFProbeFormat,
}

impl FFProbeOutput {
    /// Duration in seconds as read from the container, falling back to the
    /// longest stream. The file size is never used to guess it.
    pub fn duration(&self) -> Option<f64> {
        let positive = |d: &f64| d.is_finite() && *d > 0.0;

        self.format.duration.filter(positive).or_else(|| {
            self.streams
                .iter()
                .filter_map(|stream| {
                    stream.duration.filter(positive).or_else(|| {
                        stream
                            .tags
                            .duration
                            .as_deref()
                            .and_then(parse_tag_duration)
                            .filter(positive)
                    })
                })
                .max_by(f64::total_cmp)
        })
    }
}

/// Parses a `HH:MM:SS.fraction` duration tag into seconds.
pub fn parse_tag_duration(tag: &str) -> Option<f64> {
    let mut parts = tag.trim().splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;

    Some(hours.mul_add(3600.0, minutes.mul_add(60.0, seconds)))
}

/// Runs ffprobe on a local path or URL.
///
/// Only the redacted form of `input` is logged.
///
/// # Errors
/// Returns an error if ffprobe cannot be spawned, exits unsuccessfully, or
/// prints output that is not the expected JSON document.
#[tracing::instrument(skip(input), fields(input = redacted_input(input)))]
pub async fn probe(input: &str) -> Result<FFProbeOutput, FfmpegError> {
    tracing::info!("Probing {}", redacted_input(input));

    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(input)
        .output()
        .await
        .map_err(|source| FfmpegError::Spawn {
            program: "ffprobe",
            source,
        })?;

    check_status("ffprobe", input, &output)?;

    let probe_output = serde_json::from_slice(&output.stdout).map_err(|e| {
        tracing::error!("Failed to parse ffprobe output: {}", e);
        FfmpegError::Parse(e)
    })?;

    Ok(probe_output)
}

/// Summarizes probe output into the metadata document clients receive.
///
/// # Errors
/// Returns [`FfmpegError::DurationUnavailable`] if neither the container nor
/// any stream reports a duration.
pub fn media_metadata(
    probe_output: &FFProbeOutput,
) -> Result<MediaMetadata, FfmpegError> {
    let duration = probe_output
        .duration()
        .ok_or(FfmpegError::DurationUnavailable)?;

    let mut metadata = MediaMetadata {
        duration,
        format_name: probe_output.format.format_name.clone(),
        format_long_name: probe_output.format.format_long_name.clone(),
        size_bytes: probe_output.format.size,
        bit_rate: probe_output.format.bit_rate,
        video_tracks: Vec::new(),
        audio_tracks: Vec::new(),
        subtitle_tracks: Vec::new(),
    };

    for stream in &probe_output.streams {
        match stream.codec_type.as_deref() {
            Some("video") => metadata.video_tracks.push(VideoTrack {
                index: stream.index,
                codec_name: stream.codec_name.clone(),
                width: stream.width,
                height: stream.height,
                frame_rate: stream
                    .avg_frame_rate
                    .clone()
                    .filter(|rate| rate != "0/0")
                    .or_else(|| stream.r_frame_rate.clone()),
                pix_fmt: stream.pix_fmt.clone(),
            }),
            Some("audio") => metadata.audio_tracks.push(AudioTrack {
                index: stream.index,
                codec_name: stream.codec_name.clone(),
                sample_rate: stream.sample_rate,
                channels: stream.channels,
                channel_layout: stream.channel_layout.clone(),
                language: stream.tags.language.clone(),
                title: stream.tags.title.clone(),
            }),
            Some("subtitle") => metadata.subtitle_tracks.push(SubtitleTrack {
                index: stream.index,
                codec_name: stream.codec_name.clone(),
                language: stream.tags.language.clone(),
                title: stream.tags.title.clone(),
            }),
            other => {
                tracing::debug!(
                    "Skipping stream {} of type {:?}",
                    stream.index,
                    other
                );
            }
        }
    }

    Ok(metadata)
}

/// Probes `input` and summarizes the result.
///
/// # Errors
/// See [`probe`] and [`media_metadata`].
pub async fn extract_metadata(input: &str) -> Result<MediaMetadata, FfmpegError> {
    let probe_output = probe(input).await?;
    media_metadata(&probe_output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MKV_OUTPUT: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "codec_type": "video",
                "width": 2560,
                "height": 1440,
                "pix_fmt": "yuv420p",
                "r_frame_rate": "60/1",
                "avg_frame_rate": "60/1",
                "tags": { "DURATION": "00:20:04.167000000" }
            },
            {
                "index": 1,
                "codec_name": "aac",
                "codec_type": "audio",
                "sample_rate": "48000",
                "channels": 2,
                "channel_layout": "stereo",
                "tags": { "title": "track 1", "language": "eng" }
            },
            {
                "index": 2,
                "codec_name": "subrip",
                "codec_type": "subtitle",
                "tags": { "language": "fra" }
            }
        ],
        "format": {
            "filename": "movie.mkv",
            "nb_streams": 3,
            "format_name": "matroska,webm",
            "format_long_name": "Matroska / WebM",
            "start_time": "0.000000",
            "duration": "1204.181000",
            "size": "6090918208",
            "bit_rate": "40465134"
        }
    }"#;

    #[test]
    fn test_parse_tag_duration() {
        assert_eq!(parse_tag_duration("00:20:04.5"), Some(1204.5));
        assert_eq!(parse_tag_duration("01:00:00.000000000"), Some(3600.0));
        assert_eq!(parse_tag_duration("garbage"), None);
    }

    #[test]
    fn test_media_metadata_from_container() {
        let output: FFProbeOutput = serde_json::from_str(MKV_OUTPUT).unwrap();
        let metadata = media_metadata(&output).unwrap();

        assert_eq!(metadata.duration, 1204.181);
        assert_eq!(metadata.format_name, "matroska,webm");
        assert_eq!(metadata.size_bytes, Some(6_090_918_208));
        assert_eq!(metadata.video_tracks.len(), 1);
        assert_eq!(metadata.video_tracks[0].width, Some(2560));
        assert_eq!(metadata.video_tracks[0].frame_rate.as_deref(), Some("60/1"));
        assert_eq!(metadata.audio_tracks[0].sample_rate, Some(48000));
        assert_eq!(metadata.audio_tracks[0].language.as_deref(), Some("eng"));
        assert_eq!(metadata.subtitle_tracks[0].codec_name.as_deref(), Some("subrip"));
    }

    #[test]
    fn test_duration_falls_back_to_stream_tags() {
        let output: FFProbeOutput = serde_json::from_str(
            r#"{
                "streams": [
                    { "index": 0, "codec_type": "video", "tags": { "DURATION": "00:01:40.000000000" } },
                    { "index": 1, "codec_type": "audio", "duration": "100.5" }
                ],
                "format": { "format_name": "matroska,webm", "size": "1000000" }
            }"#,
        )
        .unwrap();

        assert_eq!(output.duration(), Some(100.5));
    }

    #[test]
    fn test_size_alone_is_not_a_duration() {
        let output: FFProbeOutput = serde_json::from_str(
            r#"{
                "streams": [{ "index": 0, "codec_type": "video" }],
                "format": { "format_name": "mov,mp4", "size": "10485760", "bit_rate": "800000" }
            }"#,
        )
        .unwrap();

        assert!(matches!(
            media_metadata(&output),
            Err(FfmpegError::DurationUnavailable)
        ));
    }
}
