//! Naming convention shared by the worker and the status poller.
//!
//! Segments are stored as `{output_prefix}/{job_id}/segment_{NNN}.{ext}` and
//! carry their boundaries as object metadata, so the poller can rebuild a
//! job's results from a listing without any other coordination.

use std::collections::HashMap;

use crate::{SegmentResult, SegmentSpan};

const SEGMENT_FILE_PREFIX: &str = "segment_";

pub const METADATA_INDEX: &str = "segment-index";
pub const METADATA_START: &str = "start";
pub const METADATA_END: &str = "end";
pub const METADATA_DURATION: &str = "duration";

/// The prefix every output object of a job lives under, with a trailing `/`.
pub fn job_output_prefix(output_prefix: &str, job_id: &str) -> String {
    let output_prefix = output_prefix.trim_end_matches('/');
    if output_prefix.is_empty() {
        format!("{job_id}/")
    } else {
        format!("{output_prefix}/{job_id}/")
    }
}

pub fn segment_filename(index: u32, output_format: &str) -> String {
    format!("{SEGMENT_FILE_PREFIX}{index:03}.{output_format}")
}

pub fn segment_key(output_prefix: &str, job_id: &str, filename: &str) -> String {
    format!("{}{filename}", job_output_prefix(output_prefix, job_id))
}

/// Extracts the index from a segment filename such as `segment_007.mp4`.
pub fn parse_segment_index(filename: &str) -> Option<u32> {
    let rest = filename.strip_prefix(SEGMENT_FILE_PREFIX)?;
    let (digits, _extension) = rest.split_once('.')?;
    digits.parse().ok()
}

/// A filename that can be joined onto a job prefix without escaping it.
pub fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && filename != "."
        && !filename.contains("..")
        && !filename.contains(['/', '\\'])
}

/// Object metadata the worker attaches to an uploaded segment.
pub fn segment_metadata(span: &SegmentSpan) -> HashMap<String, String> {
    HashMap::from([
        (METADATA_INDEX.to_string(), span.index.to_string()),
        (METADATA_START.to_string(), span.start.to_string()),
        (METADATA_END.to_string(), span.end.to_string()),
        (METADATA_DURATION.to_string(), span.duration().to_string()),
    ])
}

/// Rebuilds a segment's detailed result from its object metadata.
///
/// Returns `None` when the metadata is missing or unreadable; callers treat
/// such a segment as not yet described rather than inventing boundaries.
pub fn segment_result_from_metadata(
    key: &str,
    metadata: &HashMap<String, String>,
    size_bytes: Option<i64>,
) -> Option<SegmentResult> {
    let filename = key.rsplit('/').next().unwrap_or(key).to_string();

    let index = metadata
        .get(METADATA_INDEX)
        .and_then(|v| v.parse().ok())
        .or_else(|| parse_segment_index(&filename))?;
    let start: f64 = metadata.get(METADATA_START)?.parse().ok()?;
    let end: f64 = metadata.get(METADATA_END)?.parse().ok()?;
    let duration = metadata
        .get(METADATA_DURATION)
        .and_then(|v| v.parse().ok())
        .unwrap_or(end - start);

    Some(SegmentResult {
        index,
        filename,
        key: key.to_string(),
        start,
        end,
        duration,
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_output_prefix() {
        assert_eq!(job_output_prefix("jobs", "abc"), "jobs/abc/");
        assert_eq!(job_output_prefix("jobs/", "abc"), "jobs/abc/");
        assert_eq!(job_output_prefix("", "abc"), "abc/");
    }

    #[test]
    fn test_segment_key_uses_job_namespace() {
        let filename = segment_filename(2, "mp4");
        assert_eq!(filename, "segment_002.mp4");
        assert_eq!(
            segment_key("jobs", "job-1", &filename),
            "jobs/job-1/segment_002.mp4"
        );
    }

    #[test]
    fn test_parse_segment_index() {
        assert_eq!(parse_segment_index("segment_007.mp4"), Some(7));
        assert_eq!(parse_segment_index("segment_123.webm"), Some(123));
        assert_eq!(parse_segment_index("movie.mp4"), None);
        assert_eq!(parse_segment_index("segment_x.mp4"), None);
    }

    #[test]
    fn test_is_safe_filename() {
        assert!(is_safe_filename("segment_001.mp4"));
        assert!(!is_safe_filename("../secret.mp4"));
        assert!(!is_safe_filename("a/b.mp4"));
        assert!(!is_safe_filename(""));
    }

    #[test]
    fn test_metadata_describes_segment() {
        let span = SegmentSpan {
            index: 3,
            start: 120.0,
            end: 240.0,
        };
        let metadata = segment_metadata(&span);

        let result = segment_result_from_metadata(
            "jobs/j/segment_003.mp4",
            &metadata,
            Some(1024),
        )
        .unwrap();

        assert_eq!(result.index, 3);
        assert_eq!(result.filename, "segment_003.mp4");
        assert_eq!(result.start, 120.0);
        assert_eq!(result.end, 240.0);
        assert_eq!(result.duration, 120.0);
        assert_eq!(result.size_bytes, Some(1024));
    }

    #[test]
    fn test_missing_metadata_is_not_invented() {
        let result = segment_result_from_metadata(
            "jobs/j/segment_001.mp4",
            &HashMap::new(),
            None,
        );
        assert!(result.is_none());
    }
}
