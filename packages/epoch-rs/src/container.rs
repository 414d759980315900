//! Result tree: dataset -> datastream -> trigger -> trial.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::TriggerConfig;
use crate::types::{Axis, SignalStream, View};

/// One extracted window around a marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    /// 1-based position of the marker among the trigger's markers
    pub trial_number: usize,
    pub marker_time: f64,
    /// Absolute time of the first sample
    pub start_time: f64,
    /// Index of the aligned marker sample, if inside the window
    pub marker_position: Option<usize>,
    pub rejected: bool,
    pub baseline_mean: Option<f64>,
    timestamps: Vec<f64>,
    original: Vec<f64>,
    proc: Vec<f64>,
    baseline_removed: Option<Vec<f64>>,
    percent_change: Option<Vec<f64>>,
}

impl Trial {
    pub fn new(
        trial_number: usize,
        marker_time: f64,
        marker_position: Option<usize>,
        timestamps: Vec<f64>,
        data: Vec<f64>,
    ) -> Self {
        let start_time = timestamps.first().copied().unwrap_or(marker_time);
        Self {
            trial_number,
            marker_time,
            start_time,
            marker_position,
            rejected: false,
            baseline_mean: None,
            timestamps,
            original: data.clone(),
            proc: data,
            baseline_removed: None,
            percent_change: None,
        }
    }

    /// Samples of `view` along `axis`, or `None` if the view was never computed.
    pub fn series(&self, view: View, axis: Axis) -> Option<&[f64]> {
        let data = match view {
            View::Original => Some(self.original.as_slice()),
            View::Proc => Some(self.proc.as_slice()),
            View::BaselineRemoved => self.baseline_removed.as_deref(),
            View::PercentChange => self.percent_change.as_deref(),
        }?;
        match axis {
            Axis::Data => Some(data),
            Axis::Timestamps => Some(self.timestamps.as_slice()),
        }
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn duration(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    pub(crate) fn original(&self) -> &[f64] {
        &self.original
    }

    pub(crate) fn proc(&self) -> &[f64] {
        &self.proc
    }

    pub(crate) fn set_proc(&mut self, proc: Vec<f64>) {
        self.proc = proc;
    }

    /// Replace the time axis and both base views together.
    pub(crate) fn set_resampled(&mut self, timestamps: Vec<f64>, original: Vec<f64>, proc: Vec<f64>) {
        self.timestamps = timestamps;
        self.original = original;
        self.proc = proc;
    }

    pub(crate) fn set_baseline_removed(&mut self, mean: f64, values: Vec<f64>) {
        self.baseline_mean = Some(mean);
        self.baseline_removed = Some(values);
    }

    pub(crate) fn set_percent_change(&mut self, values: Vec<f64>) {
        self.percent_change = Some(values);
    }
}

/// Per-marker alignment record, one entry per located marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerAudit {
    pub data_indices: Vec<usize>,
    pub data_times: Vec<f64>,
    pub data_errors: Vec<f64>,
    pub took_previous: Vec<bool>,
}

impl TriggerAudit {
    pub fn len(&self) -> usize {
        self.data_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_indices.is_empty()
    }

    fn extend(&mut self, other: TriggerAudit) {
        self.data_indices.extend(other.data_indices);
        self.data_times.extend(other.data_times);
        self.data_errors.extend(other.data_errors);
        self.took_previous.extend(other.took_previous);
    }
}

/// All trials of one trigger name within one stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    pub config: TriggerConfig,
    pub trials: Vec<Trial>,
    pub audit: TriggerAudit,
    pub missing_markers: usize,
    /// Trial numbers whose window could not be cut
    pub dropped_trials: Vec<usize>,
    /// Set when a post-processing stage aborted; trials are kept as they were
    pub failure: Option<String>,
}

impl Trigger {
    pub fn new(name: impl Into<String>, config: TriggerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            trials: Vec::new(),
            audit: TriggerAudit::default(),
            missing_markers: 0,
            dropped_trials: Vec::new(),
            failure: None,
        }
    }

    pub fn all_trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn active_trials(&self) -> impl Iterator<Item = &Trial> {
        self.trials.iter().filter(|t| !t.rejected)
    }

    pub fn trial(&self, trial_number: usize) -> Option<&Trial> {
        self.trials.iter().find(|t| t.trial_number == trial_number)
    }

    /// Rows of `view` data, one per trial that has the view.
    pub fn matrix(&self, view: View, include_rejected: bool) -> Vec<Vec<f64>> {
        self.trials
            .iter()
            .filter(|t| include_rejected || !t.rejected)
            .filter_map(|t| t.series(view, Axis::Data).map(<[f64]>::to_vec))
            .collect()
    }

    /// Mark the given trial numbers as rejected. Returns how many changed.
    pub fn reject_trials(&mut self, trial_numbers: &[usize]) -> usize {
        let mut changed = 0;
        for trial in self.trials.iter_mut() {
            if !trial.rejected && trial_numbers.contains(&trial.trial_number) {
                trial.rejected = true;
                changed += 1;
            }
        }
        changed
    }

    /// Highest trial number handed out so far, kept, dropped or skipped.
    fn last_trial_number(&self) -> usize {
        let kept = self.trials.iter().map(|t| t.trial_number).max();
        let dropped = self.dropped_trials.iter().copied().max();
        let scanned = self.audit.len() + self.missing_markers;
        kept.into_iter().chain(dropped).fold(scanned, usize::max)
    }

    fn merge(&mut self, other: Trigger) {
        let offset = self.last_trial_number();
        self.trials.extend(other.trials.into_iter().map(|mut t| {
            t.trial_number += offset;
            t
        }));
        self.dropped_trials
            .extend(other.dropped_trials.into_iter().map(|n| n + offset));
        self.audit.extend(other.audit);
        self.missing_markers += other.missing_markers;
        if self.failure.is_none() {
            self.failure = other.failure;
        }
    }
}

/// One signal stream and the triggers extracted from it.
#[derive(Debug, Clone, Serialize)]
pub struct Datastream {
    pub name: String,
    #[serde(skip)]
    pub stream: SignalStream,
    pub sample_rate: f64,
    pub triggers: BTreeMap<String, Trigger>,
}

impl Datastream {
    pub fn new(name: impl Into<String>, stream: SignalStream) -> Self {
        let sample_rate = stream.sample_rate();
        Self {
            name: name.into(),
            stream,
            sample_rate,
            triggers: BTreeMap::new(),
        }
    }

    pub fn trigger(&self, name: &str) -> Option<&Trigger> {
        self.triggers.get(name)
    }

    pub fn reject_trials(&mut self, trigger: &str, trial_numbers: &[usize]) -> usize {
        self.triggers
            .get_mut(trigger)
            .map(|t| t.reject_trials(trial_numbers))
            .unwrap_or(0)
    }
}

/// All streams of one recording.
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    pub name: String,
    pub streams: BTreeMap<String, Datastream>,
    pub rejected: bool,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            streams: BTreeMap::new(),
            rejected: false,
        }
    }

    pub fn stream(&self, name: &str) -> Option<&Datastream> {
        self.streams.get(name)
    }

    pub fn reject_trials(&mut self, stream: &str, trigger: &str, trial_numbers: &[usize]) -> usize {
        self.streams
            .get_mut(stream)
            .map(|s| s.reject_trials(trigger, trial_numbers))
            .unwrap_or(0)
    }

    /// Append another dataset's results.
    ///
    /// Triggers present on both sides keep this dataset's trials first and
    /// renumber the incoming ones after them. Streams and triggers only
    /// present in `other` are moved over as they are.
    pub fn merge(&mut self, other: Dataset) {
        for (stream_name, other_stream) in other.streams {
            match self.streams.get_mut(&stream_name) {
                Some(existing) => {
                    for (trigger_name, other_trigger) in other_stream.triggers {
                        match existing.triggers.get_mut(&trigger_name) {
                            Some(trigger) => trigger.merge(other_trigger),
                            None => {
                                existing.triggers.insert(trigger_name, other_trigger);
                            }
                        }
                    }
                }
                None => {
                    self.streams.insert(stream_name, other_stream);
                }
            }
        }
        self.rejected = self.rejected && other.rejected;
    }

    pub fn trial_count(&self) -> usize {
        self.streams
            .values()
            .flat_map(|s| s.triggers.values())
            .map(|t| t.trials.len())
            .sum()
    }
}

/// Unit of work that could not complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitFailure {
    pub dataset: String,
    pub stream: Option<String>,
    pub trigger: Option<String>,
    pub error: String,
}

impl std::fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dataset)?;
        if let Some(stream) = &self.stream {
            write!(f, "/{}", stream)?;
        }
        if let Some(trigger) = &self.trigger {
            write!(f, "/{}", trigger)?;
        }
        write!(f, ": {}", self.error)
    }
}

/// Output of one orchestrated run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub id: String,
    pub created_at: String,
    pub datasets: Vec<Dataset>,
    pub failures: Vec<UnitFailure>,
}

impl RunReport {
    pub fn new(datasets: Vec<Dataset>, failures: Vec<UnitFailure>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            datasets,
            failures,
        }
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.name == name)
    }

    pub fn trial_count(&self) -> usize {
        self.datasets.iter().map(Dataset::trial_count).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
