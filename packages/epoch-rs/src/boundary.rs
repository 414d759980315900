//! Resolution of a window edge at a fixed time offset from a marker.
//!
//! Both directions share one walk. With `s = +1` for forward and `-1` for
//! backward, the ideal edge is `marker + s * duration` and a sample `i` is at
//! or beyond it when `s * (t[i] - ideal) >= 0`. The resolved sample is the one
//! at or beyond the ideal edge that is closest to it, so the raw samples
//! between the two resolved edges always cover the requested window.

use crate::error::{EpochError, Result};
use crate::interp::linear_approx;
use crate::types::{BoundaryResolution, Direction, Estimate, SignalStream};

pub fn resolve_boundary(
    stream: &SignalStream,
    marker_index: usize,
    marker_time: f64,
    duration: f64,
    direction: Direction,
) -> Result<BoundaryResolution> {
    let ts = stream.timestamps();
    let data = stream.data();
    let n = ts.len();

    if marker_index >= n {
        return Err(EpochError::InvalidParameter(format!(
            "marker index {} is outside a stream of {} samples",
            marker_index, n
        )));
    }
    if !duration.is_finite() || duration < 0.0 {
        return Err(EpochError::InvalidParameter(format!(
            "boundary duration must be a non-negative number, got {}",
            duration
        )));
    }

    let s = direction.sign();
    let ideal = marker_time + s * duration;
    let beyond = |i: usize| s * (ts[i] - ideal) >= 0.0;

    // Sample-count estimate of the edge, clamped to the stream
    let steps = (duration * stream.sample_rate()).ceil().min(n as f64) as usize;
    let initial = match direction {
        Direction::Backward => marker_index.saturating_sub(steps),
        Direction::Forward => (marker_index + steps).min(n - 1),
    };

    let offset = s * (ts[initial] - marker_time) - duration;
    let estimate = if offset > 0.0 {
        Estimate::Over
    } else if offset < 0.0 {
        Estimate::Under
    } else {
        Estimate::Exact
    };

    let mut final_index = initial;
    if beyond(initial) {
        // Tighten toward the marker while the next sample still covers the edge
        while let Some(next) = step(final_index, direction, false, n) {
            if !beyond(next) {
                break;
            }
            final_index = next;
        }
    } else {
        while !beyond(final_index) {
            final_index = step(final_index, direction, true, n).ok_or_else(|| {
                EpochError::BoundaryUnresolvable {
                    ideal_timestamp: ideal,
                    reason: format!(
                        "stream ends at {} before reaching the edge",
                        ts[final_index]
                    ),
                }
            })?;
        }
    }

    let final_timestamp = ts[final_index];
    let interpolated_value = if final_timestamp == ideal {
        data[final_index]
    } else {
        let inner = step(final_index, direction, false, n).ok_or_else(|| {
            EpochError::BoundaryUnresolvable {
                ideal_timestamp: ideal,
                reason: "no sample on the marker side of the edge to interpolate from".into(),
            }
        })?;
        linear_approx(
            data[inner],
            ts[inner],
            data[final_index],
            final_timestamp,
            ideal,
        )
    };

    Ok(BoundaryResolution {
        final_index,
        final_timestamp,
        total_error: final_timestamp - ideal,
        interpolated_value,
        interpolated_timestamp: ideal,
        points_from_marker: marker_index.abs_diff(final_index),
        direction,
        estimate,
    })
}

/// Neighbouring index, either away from the marker or back toward it.
fn step(i: usize, direction: Direction, away: bool, n: usize) -> Option<usize> {
    let forward = matches!(direction, Direction::Forward) == away;
    if forward {
        (i + 1 < n).then_some(i + 1)
    } else {
        i.checked_sub(1)
    }
}
