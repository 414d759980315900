use serde::{Deserialize, Serialize};

use crate::error::{EpochError, Result};

/// Continuous signal with a timestamp per sample.
///
/// Immutable once constructed. Timestamps are strictly increasing and finite,
/// `data` and `timestamps` have the same length and the stream holds at least
/// one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalStream {
    data: Vec<f64>,
    timestamps: Vec<f64>,
    sample_rate: f64,
}

impl SignalStream {
    pub fn new(data: Vec<f64>, timestamps: Vec<f64>, sample_rate: f64) -> Result<Self> {
        if data.is_empty() || timestamps.is_empty() {
            return Err(EpochError::EmptyStream);
        }
        if data.len() != timestamps.len() {
            return Err(EpochError::MismatchedLengths {
                data: data.len(),
                timestamps: timestamps.len(),
            });
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(EpochError::InvalidParameter(format!(
                "sample_rate must be positive, got {}",
                sample_rate
            )));
        }
        if !timestamps[0].is_finite() {
            return Err(EpochError::UnorderedTimestamps(0));
        }
        for i in 1..timestamps.len() {
            if !timestamps[i].is_finite() || timestamps[i] <= timestamps[i - 1] {
                return Err(EpochError::UnorderedTimestamps(i));
            }
        }

        Ok(Self {
            data,
            timestamps,
            sample_rate,
        })
    }

    /// Build a stream whose rate is estimated as `len / (last - first)`.
    pub fn with_estimated_rate(data: Vec<f64>, timestamps: Vec<f64>) -> Result<Self> {
        let (first, last) = match (timestamps.first(), timestamps.last()) {
            (Some(&f), Some(&l)) => (f, l),
            _ => return Err(EpochError::EmptyStream),
        };
        if last == first {
            return Err(EpochError::InvalidParameter(format!(
                "cannot estimate sample rate: first and last timestamps are both {}",
                first
            )));
        }
        let rate = timestamps.len() as f64 / (last - first);
        Self::new(data, timestamps, rate)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn first_timestamp(&self) -> f64 {
        self.timestamps[0]
    }

    pub fn last_timestamp(&self) -> f64 {
        self.timestamps[self.timestamps.len() - 1]
    }
}

/// Event markers as delivered by a loader: parallel name/time arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkerSet {
    pub eventnames: Vec<String>,
    pub timestamps: Vec<f64>,
}

impl MarkerSet {
    pub fn new(eventnames: Vec<String>, timestamps: Vec<f64>) -> Result<Self> {
        if eventnames.len() != timestamps.len() {
            return Err(EpochError::MismatchedLengths {
                data: eventnames.len(),
                timestamps: timestamps.len(),
            });
        }
        Ok(Self {
            eventnames,
            timestamps,
        })
    }

    /// Times of every occurrence of `name`, ascending.
    pub fn times_for(&self, name: &str) -> Vec<f64> {
        let mut times: Vec<f64> = self
            .eventnames
            .iter()
            .zip(&self.timestamps)
            .filter(|(n, _)| n.as_str() == name)
            .map(|(_, &t)| t)
            .collect();
        times.sort_by(|a, b| a.total_cmp(b));
        times
    }

    pub fn contains(&self, name: &str) -> bool {
        self.eventnames.iter().any(|n| n == name)
    }

    /// Distinct event names in first-seen order.
    pub fn names(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for name in &self.eventnames {
            if !seen.contains(name) {
                seen.push(name.clone());
            }
        }
        seen
    }
}

/// Sample chosen for a marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    pub chosen_index: usize,
    pub chosen_timestamp: f64,
    /// `chosen_timestamp - marker_time`
    pub signed_error: f64,
    pub took_previous: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Backward,
    Forward,
}

impl Direction {
    /// +1 when moving toward later samples.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Backward => -1.0,
            Direction::Forward => 1.0,
        }
    }
}

/// Classification of the first boundary guess relative to the ideal edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Estimate {
    Over,
    Under,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryResolution {
    pub final_index: usize,
    pub final_timestamp: f64,
    /// `final_timestamp - ideal_timestamp`
    pub total_error: f64,
    pub interpolated_value: f64,
    pub interpolated_timestamp: f64,
    pub points_from_marker: usize,
    pub direction: Direction,
    pub estimate: Estimate,
}

/// Signed window around a marker: `[marker - baseline_time, marker + trial_time]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialWindow {
    pub baseline_time: f64,
    pub trial_time: f64,
}

impl TrialWindow {
    pub fn new(baseline_time: f64, trial_time: f64) -> Self {
        Self {
            baseline_time,
            trial_time,
        }
    }

    pub fn duration(&self) -> f64 {
        self.baseline_time + self.trial_time
    }
}

/// Named representation of a trial's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Original,
    Proc,
    BaselineRemoved,
    PercentChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Data,
    Timestamps,
}
