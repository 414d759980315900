//! Dataset-level synchronization: every stream of a recording is cut to the
//! time span they all cover, optionally on one shared regular grid.

use crate::error::{EpochError, Result};
use crate::interp::{interp, linear_approx, linspace};
use crate::types::SignalStream;

/// Latest first timestamp and earliest last timestamp over `streams`.
pub fn common_span<'a>(streams: impl IntoIterator<Item = &'a SignalStream>) -> Option<(f64, f64)> {
    streams.into_iter().fold(None, |span, s| {
        let (first, last) = (s.first_timestamp(), s.last_timestamp());
        Some(match span {
            None => (first, last),
            Some((start, end)) => (start.max(first), end.min(last)),
        })
    })
}

/// Cut `stream` to `[start, end]`.
///
/// Samples inside the span are kept as they are. An edge that does not fall
/// on a sample gets a new point interpolated from its two neighbours.
pub fn trim_stream(stream: &SignalStream, start: f64, end: f64) -> Result<SignalStream> {
    if start >= end || start < stream.first_timestamp() || end > stream.last_timestamp() {
        return Err(EpochError::InvalidParameter(format!(
            "cannot trim stream [{}, {}] to [{}, {}]",
            stream.first_timestamp(),
            stream.last_timestamp(),
            start,
            end
        )));
    }
    let ts = stream.timestamps();
    let data = stream.data();

    // lo: first sample at or after start; hi: one past the last at or before end
    let lo = ts.partition_point(|&t| t < start);
    let hi = ts.partition_point(|&t| t <= end);

    let mut new_ts = Vec::with_capacity(hi.saturating_sub(lo) + 2);
    let mut new_data = Vec::with_capacity(new_ts.capacity());
    if ts[lo] > start {
        new_ts.push(start);
        new_data.push(linear_approx(data[lo - 1], ts[lo - 1], data[lo], ts[lo], start));
    }
    new_ts.extend_from_slice(&ts[lo..hi]);
    new_data.extend_from_slice(&data[lo..hi]);
    if ts[hi - 1] < end {
        new_ts.push(end);
        new_data.push(linear_approx(data[hi - 1], ts[hi - 1], data[hi], ts[hi], end));
    }

    SignalStream::new(new_data, new_ts, stream.sample_rate())
}

/// Interpolate `stream` onto an even grid at `sample_rate` over its own span.
pub fn regrid_stream(stream: &SignalStream, sample_rate: f64) -> Result<SignalStream> {
    let (start, end) = (stream.first_timestamp(), stream.last_timestamp());
    let points = (((end - start) * sample_rate).round() as usize + 1).max(2);
    let grid = linspace(start, end, points);
    let data = interp(&grid, stream.timestamps(), stream.data());
    SignalStream::new(data, grid, sample_rate)
}

/// Trim every stream to their shared span and, with a rate, regrid them.
///
/// A single stream is left untouched. Returns the span the streams now share.
pub fn sync_streams(
    streams: &mut [(String, SignalStream)],
    sample_rate: Option<f64>,
) -> Result<Option<(f64, f64)>> {
    if streams.len() < 2 {
        return Ok(None);
    }
    let Some((start, end)) = common_span(streams.iter().map(|(_, s)| s)) else {
        return Ok(None);
    };
    if start >= end {
        return Err(EpochError::InvalidParameter(format!(
            "streams do not overlap: latest start {} is not before earliest end {}",
            start, end
        )));
    }

    for (name, stream) in streams.iter_mut() {
        let mut synced = trim_stream(stream, start, end)?;
        if let Some(rate) = sample_rate {
            synced = regrid_stream(&synced, rate)?;
        }
        log::debug!(
            "Stream '{}': {} -> {} samples on [{}, {}]",
            name,
            stream.len(),
            synced.len(),
            start,
            end
        );
        *stream = synced;
    }
    Ok(Some((start, end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(offset: f64, n: usize) -> SignalStream {
        let ts: Vec<f64> = (0..n).map(|i| offset + i as f64 / 10.0).collect();
        let data: Vec<f64> = ts.iter().map(|t| 2.0 * t).collect();
        SignalStream::new(data, ts, 10.0).unwrap()
    }

    #[test]
    fn test_common_span() {
        let a = stream(0.0, 101);
        let b = stream(0.35, 101);
        let (start, end) = common_span([&a, &b]).unwrap();
        assert_eq!(start, 0.35);
        assert_eq!(end, 10.0);
        assert!(common_span(Vec::<&SignalStream>::new()).is_none());
    }

    #[test]
    fn test_trim_interpolates_new_edges() {
        let s = stream(0.0, 101);
        let t = trim_stream(&s, 0.35, 9.52).unwrap();
        assert_eq!(t.first_timestamp(), 0.35);
        assert_eq!(t.last_timestamp(), 9.52);
        assert!((t.data()[0] - 0.7).abs() < 1e-9);
        assert!((t.data()[t.len() - 1] - 19.04).abs() < 1e-9);
        // 0.4 ..= 9.5 kept raw
        assert_eq!(t.len(), 94);
        assert_eq!(t.sample_rate(), 10.0);
    }

    #[test]
    fn test_trim_on_samples_keeps_them() {
        let s = stream(0.0, 11);
        let t = trim_stream(&s, 0.0, 1.0).unwrap();
        assert_eq!(t.timestamps(), s.timestamps());
        assert!(trim_stream(&s, 0.5, 0.5).is_err());
        assert!(trim_stream(&s, -0.1, 0.5).is_err());
    }

    #[test]
    fn test_sync_gives_matching_edges() {
        let mut streams = vec![
            ("pupil".to_string(), stream(0.0, 101)),
            ("gaze".to_string(), stream(0.35, 101)),
        ];
        let span = sync_streams(&mut streams, None).unwrap();
        assert_eq!(span, Some((0.35, 10.0)));
        for (_, s) in &streams {
            assert_eq!(s.first_timestamp(), 0.35);
            assert_eq!(s.last_timestamp(), 10.0);
        }
    }

    #[test]
    fn test_sync_regrids_at_rate() {
        let mut streams = vec![
            ("pupil".to_string(), stream(0.0, 101)),
            ("gaze".to_string(), stream(0.35, 101)),
        ];
        sync_streams(&mut streams, Some(20.0)).unwrap();
        let (a, b) = (&streams[0].1, &streams[1].1);
        // 9.65 s at 20 Hz
        assert_eq!(a.len(), 194);
        assert_eq!(a.timestamps(), b.timestamps());
        assert_eq!(a.sample_rate(), 20.0);
        // Both streams carry the same linear signal
        for (x, y) in a.data().iter().zip(b.data()) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sync_rejects_disjoint_streams() {
        let mut streams = vec![
            ("pupil".to_string(), stream(0.0, 11)),
            ("gaze".to_string(), stream(5.0, 11)),
        ];
        assert!(sync_streams(&mut streams, None).is_err());

        let mut single = vec![("pupil".to_string(), stream(0.0, 11))];
        assert_eq!(sync_streams(&mut single, Some(5.0)).unwrap(), None);
        assert_eq!(single[0].1.len(), 11);
    }
}
