use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Containers a split job may write its segments as.
pub const OUTPUT_FORMATS: &[&str] = &["mp4", "mov", "mkv", "webm"];

const DEFAULT_OUTPUT_FORMAT: &str = "mp4";

/// Most segments a single job may produce.
pub const MAX_SEGMENTS: usize = 1000;

/// Shortest interval a job may be split into, in seconds.
pub const MIN_INTERVAL_LENGTH: f64 = 1.0;

// Absorbs float noise so that e.g. 600 / 300 yields two intervals, not three.
const INTERVAL_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("fixed_points needs at least two points, got {0}")]
    TooFewPoints(usize),
    #[error("point {0} is negative or not a finite number")]
    InvalidPoint(f64),
    #[error("points must be strictly increasing ({previous} is followed by {next})")]
    NotIncreasing { previous: f64, next: f64 },
    #[error("interval_length must be a number of at least 1 second, got {0}")]
    InvalidInterval(f64),
    #[error("split would produce {count} segments, more than the limit of 1000")]
    TooManySegments { count: f64 },
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("intervals mode needs the source duration")]
    DurationRequired,
    #[error("source duration must be a positive number, got {0}")]
    InvalidDuration(f64),
}

/// How a source video is cut into segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitMode {
    /// Cut at the given offsets, in seconds.
    FixedPoints { points: Vec<f64> },
    /// Cut into consecutive chunks of `interval_length` seconds.
    Intervals { interval_length: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(flatten)]
    pub mode: SplitMode,

    #[serde(default = "default_preserve_quality")]
    pub preserve_quality: bool,

    #[serde(default = "default_output_format")]
    pub output_format: String,
}

const fn default_preserve_quality() -> bool {
    true
}

fn default_output_format() -> String {
    DEFAULT_OUTPUT_FORMAT.to_string()
}

impl SplitConfig {
    pub fn new(mode: SplitMode) -> Self {
        Self {
            mode,
            preserve_quality: default_preserve_quality(),
            output_format: default_output_format(),
        }
    }

    /// Checks the config a client submitted.
    ///
    /// Fixed points must hold at least two strictly increasing, non-negative
    /// offsets and at most [`MAX_SEGMENTS`] segments; intervals must be at
    /// least [`MIN_INTERVAL_LENGTH`] long. The output format must be one of
    /// [`OUTPUT_FORMATS`].
    ///
    /// # Errors
    /// Returns the first violated constraint as a [`PlanError`].
    pub fn validate(&self) -> Result<(), PlanError> {
        if !OUTPUT_FORMATS.contains(&self.output_format.as_str()) {
            return Err(PlanError::UnsupportedFormat(
                self.output_format.clone(),
            ));
        }

        match &self.mode {
            SplitMode::FixedPoints { points } => {
                if points.len() < 2 {
                    return Err(PlanError::TooFewPoints(points.len()));
                }
                check_count(points.len() - 1)?;

                for point in points {
                    check_point(*point)?;
                }

                for pair in points.windows(2) {
                    if pair[1] <= pair[0] {
                        return Err(PlanError::NotIncreasing {
                            previous: pair[0],
                            next: pair[1],
                        });
                    }
                }

                Ok(())
            }
            SplitMode::Intervals { interval_length } => {
                check_interval(*interval_length)
            }
        }
    }
}

fn check_point(point: f64) -> Result<(), PlanError> {
    if point.is_finite() && point >= 0.0 {
        Ok(())
    } else {
        Err(PlanError::InvalidPoint(point))
    }
}

fn check_interval(interval_length: f64) -> Result<(), PlanError> {
    if interval_length.is_finite() && interval_length >= MIN_INTERVAL_LENGTH {
        Ok(())
    } else {
        Err(PlanError::InvalidInterval(interval_length))
    }
}

#[allow(clippy::cast_precision_loss)]
fn check_count(count: usize) -> Result<usize, PlanError> {
    if count > MAX_SEGMENTS {
        Err(PlanError::TooManySegments {
            count: count as f64,
        })
    } else {
        Ok(count)
    }
}

fn checked_duration(source_duration: Option<f64>) -> Result<f64, PlanError> {
    let duration = source_duration.ok_or(PlanError::DurationRequired)?;
    if !duration.is_finite() || duration <= 0.0 {
        return Err(PlanError::InvalidDuration(duration));
    }
    Ok(duration)
}

/// `ceil(duration / interval_length)`, refusing anything above
/// [`MAX_SEGMENTS`] before a single span is built.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn interval_count(duration: f64, interval_length: f64) -> Result<usize, PlanError> {
    let count = (duration / interval_length - INTERVAL_EPSILON).ceil().max(1.0);
    if count > MAX_SEGMENTS as f64 {
        return Err(PlanError::TooManySegments { count });
    }
    Ok(count as usize)
}

/// Sorted, de-duplicated points of a fixed-points split.
fn distinct_points(points: &[f64]) -> Result<Vec<f64>, PlanError> {
    for point in points {
        check_point(*point)?;
    }

    let mut sorted = points.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();

    if sorted.len() < 2 {
        return Err(PlanError::TooFewPoints(sorted.len()));
    }
    check_count(sorted.len() - 1)?;

    Ok(sorted)
}

/// One planned output segment, `[start, end)` in seconds. Indexes start at 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSpan {
    pub index: u32,
    pub start: f64,
    pub end: f64,
}

impl SegmentSpan {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Computes the segment boundaries for a split.
///
/// Fixed points are sorted and de-duplicated first, and each consecutive
/// pair becomes one segment. Intervals cover `[0, source_duration]` in
/// chunks of `interval_length`; the last chunk may be shorter.
///
/// # Errors
/// Returns a [`PlanError`] if the points or interval are invalid, if the
/// split would exceed [`MAX_SEGMENTS`], or if intervals mode is planned
/// without a positive source duration.
pub fn plan_segments(
    mode: &SplitMode,
    source_duration: Option<f64>,
) -> Result<Vec<SegmentSpan>, PlanError> {
    match mode {
        SplitMode::FixedPoints { points } => {
            let sorted = distinct_points(points)?;

            Ok(sorted
                .windows(2)
                .zip(1..)
                .map(|(pair, index)| SegmentSpan {
                    index,
                    start: pair[0],
                    end: pair[1],
                })
                .collect())
        }
        SplitMode::Intervals { interval_length } => {
            check_interval(*interval_length)?;
            let duration = checked_duration(source_duration)?;
            let count = u32::try_from(interval_count(duration, *interval_length)?)
                .map_err(|_| PlanError::TooManySegments {
                    count: duration / interval_length,
                })?;

            Ok((0..count)
                .map(|i| {
                    let start = f64::from(i) * interval_length;
                    let end = if i + 1 == count {
                        duration
                    } else {
                        f64::from(i + 1) * interval_length
                    };

                    SegmentSpan {
                        index: i + 1,
                        start,
                        end,
                    }
                })
                .collect())
        }
    }
}

/// Number of segments a finished job should have, if it can be known yet.
///
/// Intervals mode returns `None` until the source duration is known.
pub fn expected_segment_count(
    mode: &SplitMode,
    source_duration: Option<f64>,
) -> Option<u32> {
    let count = match mode {
        SplitMode::FixedPoints { points } => {
            distinct_points(points).ok()?.len() - 1
        }
        SplitMode::Intervals { interval_length } => {
            check_interval(*interval_length).ok()?;
            let duration = checked_duration(source_duration).ok()?;
            interval_count(duration, *interval_length).ok()?
        }
    };

    u32::try_from(count).ok()
}

/// Plans the segments to cut from a source of known duration.
///
/// Fixed points past the end of the source are dropped and the last span is
/// clipped to the duration, so every planned span has content to cut.
///
/// # Errors
/// Returns a [`PlanError`] if the mode is invalid, the duration is not
/// positive, or no fixed-point span starts before the end of the source.
pub fn plan_for_source(
    mode: &SplitMode,
    source_duration: f64,
) -> Result<Vec<SegmentSpan>, PlanError> {
    if !source_duration.is_finite() || source_duration <= 0.0 {
        return Err(PlanError::InvalidDuration(source_duration));
    }

    let spans = plan_segments(mode, Some(source_duration))?;
    if matches!(mode, SplitMode::Intervals { .. }) {
        return Ok(spans);
    }

    let clipped: Vec<SegmentSpan> = spans
        .into_iter()
        .filter(|span| span.start < source_duration)
        .map(|span| SegmentSpan {
            end: span.end.min(source_duration),
            ..span
        })
        .collect();

    if clipped.is_empty() {
        return Err(PlanError::InvalidDuration(source_duration));
    }

    Ok(clipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixed(points: &[f64]) -> SplitMode {
        SplitMode::FixedPoints {
            points: points.to_vec(),
        }
    }

    #[test]
    fn test_validate_accepts_increasing_points() {
        let config = SplitConfig::new(fixed(&[0.0, 120.0, 240.0]));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_single_point() {
        let config = SplitConfig::new(fixed(&[10.0]));
        assert_eq!(config.validate(), Err(PlanError::TooFewPoints(1)));
    }

    #[test]
    fn test_validate_rejects_unsorted_points() {
        let config = SplitConfig::new(fixed(&[0.0, 50.0, 50.0]));
        assert_eq!(
            config.validate(),
            Err(PlanError::NotIncreasing {
                previous: 50.0,
                next: 50.0
            })
        );
    }

    #[test]
    fn test_validate_rejects_negative_point() {
        let config = SplitConfig::new(fixed(&[-1.0, 5.0]));
        assert_eq!(config.validate(), Err(PlanError::InvalidPoint(-1.0)));
    }

    #[test]
    fn test_validate_rejects_non_positive_interval() {
        let config = SplitConfig::new(SplitMode::Intervals {
            interval_length: 0.0,
        });
        assert_eq!(config.validate(), Err(PlanError::InvalidInterval(0.0)));
    }

    #[test]
    fn test_validate_rejects_unknown_format() {
        let mut config = SplitConfig::new(SplitMode::Intervals {
            interval_length: 30.0,
        });
        config.output_format = "gif".to_string();
        assert_eq!(
            config.validate(),
            Err(PlanError::UnsupportedFormat("gif".to_string()))
        );
    }

    #[test]
    fn test_fixed_points_cover_range_without_gaps() {
        let spans =
            plan_segments(&fixed(&[0.0, 30.5, 75.0, 200.0]), None).unwrap();

        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].start, 0.0);
        assert_eq!(spans.last().unwrap().end, 200.0);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        let indexes: Vec<u32> = spans.iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![1, 2, 3]);
    }

    #[test]
    fn test_fixed_points_are_sorted_and_deduplicated() {
        let spans =
            plan_segments(&fixed(&[240.0, 0.0, 120.0, 120.0]), None).unwrap();

        assert_eq!(
            spans,
            vec![
                SegmentSpan {
                    index: 1,
                    start: 0.0,
                    end: 120.0
                },
                SegmentSpan {
                    index: 2,
                    start: 120.0,
                    end: 240.0
                },
            ]
        );
    }

    #[test]
    fn test_intervals_last_segment_is_shorter() {
        let spans = plan_segments(
            &SplitMode::Intervals {
                interval_length: 300.0,
            },
            Some(700.0),
        )
        .unwrap();

        let durations: Vec<f64> = spans.iter().map(SegmentSpan::duration).collect();
        assert_eq!(durations, vec![300.0, 300.0, 100.0]);
    }

    #[test]
    fn test_intervals_exact_multiple() {
        let mode = SplitMode::Intervals {
            interval_length: 300.0,
        };
        assert_eq!(expected_segment_count(&mode, Some(600.0)), Some(2));
    }

    #[test]
    fn test_intervals_shorter_than_one_interval() {
        let spans = plan_segments(
            &SplitMode::Intervals {
                interval_length: 300.0,
            },
            Some(42.0),
        )
        .unwrap();

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end, 42.0);
    }

    #[test]
    fn test_intervals_need_duration() {
        let mode = SplitMode::Intervals {
            interval_length: 10.0,
        };
        assert_eq!(
            plan_segments(&mode, None),
            Err(PlanError::DurationRequired)
        );
        assert_eq!(expected_segment_count(&mode, None), None);
    }

    #[test]
    fn test_validate_rejects_tiny_interval() {
        let config = SplitConfig::new(SplitMode::Intervals {
            interval_length: 1e-7,
        });
        assert_eq!(config.validate(), Err(PlanError::InvalidInterval(1e-7)));
    }

    #[test]
    fn test_validate_rejects_too_many_points() {
        let points: Vec<f64> = (0..=MAX_SEGMENTS + 1).map(|i| i as f64).collect();
        let config = SplitConfig::new(fixed(&points));
        assert!(matches!(
            config.validate(),
            Err(PlanError::TooManySegments { .. })
        ));
    }

    #[test]
    fn test_long_source_exceeding_segment_limit_is_rejected() {
        let mode = SplitMode::Intervals {
            interval_length: 1.0,
        };
        let hours = 24.0 * 3600.0;

        assert_eq!(
            plan_for_source(&mode, hours),
            Err(PlanError::TooManySegments { count: hours })
        );
        assert_eq!(expected_segment_count(&mode, Some(hours)), None);
        assert_eq!(
            plan_for_source(&mode, MAX_SEGMENTS as f64).map(|spans| spans.len()),
            Ok(MAX_SEGMENTS)
        );
    }

    #[test]
    fn test_tiny_interval_is_rejected_before_planning() {
        let mode = SplitMode::Intervals {
            interval_length: 1e-7,
        };
        assert_eq!(
            plan_for_source(&mode, 3600.0),
            Err(PlanError::InvalidInterval(1e-7))
        );
    }

    #[test]
    fn test_expected_count_matches_plan() {
        let mode = SplitMode::Intervals {
            interval_length: 300.0,
        };
        assert_eq!(expected_segment_count(&mode, Some(700.0)), Some(3));
        assert_eq!(
            expected_segment_count(&fixed(&[240.0, 0.0, 120.0, 120.0]), None),
            Some(2)
        );
    }

    #[test]
    fn test_split_config_serde_shape() {
        let config: SplitConfig = serde_json::from_value(serde_json::json!({
            "kind": "intervals",
            "interval_length": 60.0
        }))
        .unwrap();

        assert_eq!(
            config,
            SplitConfig {
                mode: SplitMode::Intervals {
                    interval_length: 60.0
                },
                preserve_quality: true,
                output_format: "mp4".to_string(),
            }
        );
    }

    #[test]
    fn test_plan_for_source_clips_fixed_points() {
        let spans = plan_for_source(&fixed(&[0.0, 120.0, 300.0, 500.0]), 250.0).unwrap();

        assert_eq!(
            spans,
            vec![
                SegmentSpan {
                    index: 1,
                    start: 0.0,
                    end: 120.0
                },
                SegmentSpan {
                    index: 2,
                    start: 120.0,
                    end: 250.0
                },
            ]
        );

        assert_eq!(
            plan_for_source(&fixed(&[300.0, 400.0]), 250.0),
            Err(PlanError::InvalidDuration(250.0))
        );
    }
}
