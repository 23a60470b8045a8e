pub mod ffprobe;
pub mod split;

use thiserror::Error;

// Keeps error messages readable when ffmpeg dumps a long log.
const STDERR_TAIL_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with status {code}: {stderr}")]
    Failed {
        program: &'static str,
        code: i32,
        stderr: String,
    },
    #[error("failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no duration could be read from the media stream")]
    DurationUnavailable,
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

fn stderr_tail(stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let skip = stderr.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    stderr.chars().skip(skip).collect::<String>().trim().to_string()
}

/// `input` without its query string or fragment.
///
/// Presigned URLs carry their signature and session token in the query, so
/// only this form of an input may be logged or returned in an error.
pub fn redacted_input(input: &str) -> &str {
    input.split(['?', '#']).next().unwrap_or(input)
}

fn check_status(
    program: &'static str,
    input: &str,
    output: &std::process::Output,
) -> Result<(), FfmpegError> {
    if output.status.success() {
        return Ok(());
    }

    let mut stderr = stderr_tail(&output.stderr);
    let redacted = redacted_input(input);
    if redacted.len() < input.len() {
        stderr = stderr.replace(input, redacted);
    }
    tracing::error!("{program} failed: {stderr}");

    Err(FfmpegError::Failed {
        program,
        code: output.status.code().unwrap_or(-1),
        stderr,
    })
}
