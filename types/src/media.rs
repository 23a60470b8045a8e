use serde::{Deserialize, Serialize};

/// What the worker reports about a source video, read from the bitstream.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Seconds.
    pub duration: f64,

    pub format_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_long_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,

    #[serde(default)]
    pub video_tracks: Vec<VideoTrack>,

    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,

    #[serde(default)]
    pub subtitle_tracks: Vec<SubtitleTrack>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTrack {
    pub index: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix_fmt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub index: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_layout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub index: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}
