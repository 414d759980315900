//! Marker-to-sample alignment.
//!
//! A marker time is bracketed by the unique pair of consecutive samples with
//! `timestamps[i-1] < marker <= timestamps[i]` and resolved to whichever of the
//! two is closer. The current sample wins ties.

use crate::error::{EpochError, Result};
use crate::types::{AlignmentResult, SignalStream};

/// Align a single marker against `stream`.
pub fn align(stream: &SignalStream, marker_time: f64) -> Result<AlignmentResult> {
    let ts = stream.timestamps();
    check_in_range(stream, marker_time)?;
    let i = ts.partition_point(|&t| t < marker_time);
    Ok(choose(ts, i, marker_time))
}

fn check_in_range(stream: &SignalStream, marker_time: f64) -> Result<()> {
    let first = stream.first_timestamp();
    let last = stream.last_timestamp();
    if !marker_time.is_finite() || marker_time < first || marker_time > last {
        return Err(EpochError::MarkerNotFound {
            marker_time,
            first,
            last,
        });
    }
    Ok(())
}

/// Pick between `ts[i-1]` and `ts[i]`, where `i` is the first index with
/// `ts[i] >= marker_time`.
fn choose(ts: &[f64], i: usize, marker_time: f64) -> AlignmentResult {
    if i == 0 {
        return AlignmentResult {
            chosen_index: 0,
            chosen_timestamp: ts[0],
            signed_error: ts[0] - marker_time,
            took_previous: false,
        };
    }

    let prev = ts[i - 1];
    let curr = ts[i];
    let took_previous = (marker_time - prev) < (curr - marker_time);
    let chosen_index = if took_previous { i - 1 } else { i };
    let chosen_timestamp = ts[chosen_index];

    AlignmentResult {
        chosen_index,
        chosen_timestamp,
        signed_error: chosen_timestamp - marker_time,
        took_previous,
    }
}

/// Outcome of scanning one marker.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Found {
        /// Position of the marker in the scanned list
        ordinal: usize,
        marker_time: f64,
        alignment: AlignmentResult,
    },
    Missing {
        ordinal: usize,
        marker_time: f64,
    },
}

impl ScanEvent {
    pub fn ordinal(&self) -> usize {
        match self {
            ScanEvent::Found { ordinal, .. } | ScanEvent::Missing { ordinal, .. } => *ordinal,
        }
    }
}

/// Forward scan over a trigger's marker times.
///
/// For ascending markers the cursor only moves forward, so a full scan is
/// linear in the stream length. Out-of-order markers fall back to a binary
/// search from the start.
pub struct MarkerScan<'a> {
    stream: &'a SignalStream,
    markers: &'a [f64],
    next_marker: usize,
    cursor: usize,
}

impl<'a> MarkerScan<'a> {
    pub fn new(stream: &'a SignalStream, markers: &'a [f64]) -> Self {
        Self {
            stream,
            markers,
            next_marker: 0,
            cursor: 0,
        }
    }

    fn seek(&mut self, marker_time: f64) -> usize {
        let ts = self.stream.timestamps();
        if self.cursor > 0 && ts[self.cursor - 1] >= marker_time {
            self.cursor = ts.partition_point(|&t| t < marker_time);
        }
        while self.cursor < ts.len() && ts[self.cursor] < marker_time {
            self.cursor += 1;
        }
        self.cursor
    }
}

impl Iterator for MarkerScan<'_> {
    type Item = ScanEvent;

    fn next(&mut self) -> Option<ScanEvent> {
        let ordinal = self.next_marker;
        let marker_time = *self.markers.get(ordinal)?;
        self.next_marker += 1;

        if check_in_range(self.stream, marker_time).is_err() {
            return Some(ScanEvent::Missing {
                ordinal,
                marker_time,
            });
        }

        let i = self.seek(marker_time);
        let alignment = choose(self.stream.timestamps(), i, marker_time);
        Some(ScanEvent::Found {
            ordinal,
            marker_time,
            alignment,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.markers.len() - self.next_marker;
        (remaining, Some(remaining))
    }
}
