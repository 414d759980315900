use crate::boundary::resolve_boundary;
use crate::container::Trial;
use crate::error::{EpochError, Result};
use crate::types::{AlignmentResult, Direction, SignalStream, TrialWindow};

/// Cut the window around one aligned marker out of `stream`.
///
/// The returned trial starts exactly at `marker_time - baseline_time` and
/// ends exactly at `marker_time + trial_time`; both edge values are linearly
/// interpolated and every raw sample strictly between the edges is kept.
pub fn extract_trial(
    stream: &SignalStream,
    alignment: &AlignmentResult,
    marker_time: f64,
    window: &TrialWindow,
    trial_number: usize,
) -> Result<Trial> {
    let TrialWindow {
        baseline_time,
        trial_time,
    } = *window;

    if !baseline_time.is_finite() || !trial_time.is_finite() {
        return Err(EpochError::InvalidParameter(format!(
            "trial window must be finite, got baseline {} and trial {}",
            baseline_time, trial_time
        )));
    }
    if window.duration() <= 0.0 {
        return Err(EpochError::InvalidParameter(format!(
            "trial window has non-positive duration: baseline {} + trial {}",
            baseline_time, trial_time
        )));
    }

    let marker_index = alignment.chosen_index;
    let (start_dir, start_dur) = if baseline_time >= 0.0 {
        (Direction::Backward, baseline_time)
    } else {
        (Direction::Forward, -baseline_time)
    };
    let (end_dir, end_dur) = if trial_time >= 0.0 {
        (Direction::Forward, trial_time)
    } else {
        (Direction::Backward, -trial_time)
    };

    let start = resolve_boundary(stream, marker_index, marker_time, start_dur, start_dir)?;
    let end = resolve_boundary(stream, marker_index, marker_time, end_dur, end_dir)?;

    log::debug!(
        "Trial {}: start idx {} ({:?}, err {:.6}), end idx {} ({:?}, err {:.6})",
        trial_number,
        start.final_index,
        start.estimate,
        start.total_error,
        end.final_index,
        end.estimate,
        end.total_error
    );

    let ts = stream.timestamps();
    let data = stream.data();
    let ideal_start = start.interpolated_timestamp;
    let ideal_end = end.interpolated_timestamp;

    // Raw samples strictly inside (ideal_start, ideal_end). A resolved sample
    // sitting on or outside its edge is replaced by the interpolated point.
    let lo = if ts[start.final_index] <= ideal_start {
        start.final_index + 1
    } else {
        start.final_index
    };
    let hi = if ts[end.final_index] >= ideal_end {
        end.final_index
    } else {
        end.final_index + 1
    };
    let hi = hi.max(lo);

    let mut trial_ts = Vec::with_capacity(hi - lo + 2);
    let mut trial_data = Vec::with_capacity(hi - lo + 2);
    trial_ts.push(ideal_start);
    trial_data.push(start.interpolated_value);
    trial_ts.extend_from_slice(&ts[lo..hi]);
    trial_data.extend_from_slice(&data[lo..hi]);
    trial_ts.push(ideal_end);
    trial_data.push(end.interpolated_value);

    let marker_position = if (lo..hi).contains(&marker_index) {
        Some(marker_index - lo + 1)
    } else if ts[marker_index] == ideal_start {
        Some(0)
    } else if ts[marker_index] == ideal_end {
        Some(trial_ts.len() - 1)
    } else {
        None
    };

    Ok(Trial::new(
        trial_number,
        marker_time,
        marker_position,
        trial_ts,
        trial_data,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::align;
    use crate::types::{Axis, View};

    fn uniform(n: usize) -> SignalStream {
        let ts: Vec<f64> = (0..n).map(|i| i as f64 / 10.0).collect();
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        SignalStream::new(data, ts, 10.0).unwrap()
    }

    fn cut(stream: &SignalStream, marker: f64, b: f64, t: f64) -> Result<Trial> {
        let a = align(stream, marker)?;
        extract_trial(stream, &a, marker, &TrialWindow::new(b, t), 1)
    }

    #[test]
    fn test_window_on_uniform_grid() {
        let s = uniform(51);
        let trial = cut(&s, 2.5, 1.0, 1.0).unwrap();
        let ts = trial.series(View::Original, Axis::Timestamps).unwrap();
        let data = trial.series(View::Original, Axis::Data).unwrap();

        assert_eq!(ts.len(), 21);
        assert_eq!(ts[0], 1.5);
        assert_eq!(ts[20], 3.5);
        assert_eq!(data[0], 15.0);
        assert_eq!(data[20], 35.0);
        assert_eq!(trial.marker_position, Some(10));
        assert_eq!(data[10], 25.0);
    }

    #[test]
    fn test_off_grid_edges_are_interpolated() {
        let s = uniform(51);
        let trial = cut(&s, 2.52, 0.31, 0.44).unwrap();
        let ts = trial.series(View::Original, Axis::Timestamps).unwrap();
        let data = trial.series(View::Original, Axis::Data).unwrap();

        assert!((ts[0] - 2.21).abs() < 1e-12);
        assert!((ts[ts.len() - 1] - 2.96).abs() < 1e-12);
        assert!((data[0] - 22.1).abs() < 1e-9);
        assert!((data[data.len() - 1] - 29.6).abs() < 1e-9);
        // 2.3 ..= 2.9 kept raw
        assert_eq!(ts.len(), 9);
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
        let duration = ts[ts.len() - 1] - ts[0];
        assert!((duration - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_window_entirely_after_marker() {
        let s = uniform(51);
        let trial = cut(&s, 1.0, -0.5, 1.5).unwrap();
        let ts = trial.series(View::Original, Axis::Timestamps).unwrap();
        assert_eq!(ts[0], 1.5);
        assert_eq!(ts[ts.len() - 1], 2.5);
        assert_eq!(ts.len(), 11);
        assert_eq!(trial.marker_position, None);
    }

    #[test]
    fn test_window_entirely_before_marker() {
        let s = uniform(51);
        let trial = cut(&s, 3.0, 1.5, -0.5).unwrap();
        let ts = trial.series(View::Original, Axis::Timestamps).unwrap();
        assert_eq!(ts[0], 1.5);
        assert_eq!(ts[ts.len() - 1], 2.5);
        assert_eq!(trial.marker_position, None);
    }

    #[test]
    fn test_non_positive_window_rejected() {
        let s = uniform(51);
        assert!(matches!(
            cut(&s, 2.0, 0.5, -0.5),
            Err(EpochError::InvalidParameter(_))
        ));
        assert!(matches!(
            cut(&s, 2.0, -1.0, 0.5),
            Err(EpochError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_window_past_stream_end_fails() {
        let s = uniform(51);
        assert!(matches!(
            cut(&s, 4.8, 0.5, 0.5),
            Err(EpochError::BoundaryUnresolvable { .. })
        ));
    }
}
