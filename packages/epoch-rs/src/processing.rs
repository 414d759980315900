//! Trial filters and trigger-level stages.
//!
//! Processors are named in configuration as `{ "name": ..., "params": {...} }`
//! and parsed into closed enums before any work starts, so a misspelled name
//! or a missing parameter fails the whole run up front.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::container::Trial;
use crate::error::{EpochError, Result};
use crate::interp::{interp, interp_at, linspace, round_to};
use crate::types::{Axis, View};

/// Allowed spread between trial durations before resampling refuses to align them.
pub const DURATION_TOLERANCE: f64 = 1e-6;

/// Decimal places used when merging trial time axes.
pub const RESAMPLE_DECIMALS: i32 = 3;

/// Processor reference as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSpec {
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ProcessorSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    fn f64_param(&self, key: &str) -> Result<Option<f64>> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or_else(|| {
                EpochError::InvalidConfig(format!(
                    "{}: parameter '{}' must be a number, got {}",
                    self.name, key, v
                ))
            }),
        }
    }

    fn required_f64(&self, key: &str) -> Result<f64> {
        self.f64_param(key)?.ok_or_else(|| {
            EpochError::InvalidConfig(format!("{}: missing parameter '{}'", self.name, key))
        })
    }

    fn usize_param(&self, key: &str) -> Result<Option<usize>> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v.as_u64().map(|n| Some(n as usize)).ok_or_else(|| {
                EpochError::InvalidConfig(format!(
                    "{}: parameter '{}' must be a non-negative integer, got {}",
                    self.name, key, v
                ))
            }),
        }
    }
}

/// Whether a processor runs on single trials or on a whole trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    TrialFilter,
    TriggerStage,
}

/// Registry entry describing a processor.
/// Note: Only Serialize is derived since static references can't be deserialized
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorInfo {
    pub name: &'static str,
    pub kind: ProcessorKind,
    pub params: &'static [&'static str],
    pub documentation: &'static str,
}

impl ProcessorInfo {
    pub fn from_name(name: &str) -> Option<&'static ProcessorInfo> {
        PROCESSOR_REGISTRY.iter().find(|p| p.name == name)
    }

    pub fn of_kind(kind: ProcessorKind) -> impl Iterator<Item = &'static ProcessorInfo> {
        PROCESSOR_REGISTRY.iter().filter(move |p| p.kind == kind)
    }
}

pub const PROCESSOR_REGISTRY: &[ProcessorInfo] = &[
    ProcessorInfo {
        name: "moving_average",
        kind: ProcessorKind::TrialFilter,
        params: &["window_size"],
        documentation: "Centered moving average over the processed data. Even windows grow by one; edges are mirrored.",
    },
    ProcessorInfo {
        name: "rm_zero_value_trials",
        kind: ProcessorKind::TrialFilter,
        params: &["zeros_to_count", "digit_tolerance"],
        documentation: "Reject a trial with more than zeros_to_count samples that round to zero at digit_tolerance decimals.",
    },
    ProcessorInfo {
        name: "reject_above",
        kind: ProcessorKind::TrialFilter,
        params: &["threshold"],
        documentation: "Reject a trial whose processed data reaches or exceeds threshold.",
    },
    ProcessorInfo {
        name: "reject_below",
        kind: ProcessorKind::TrialFilter,
        params: &["threshold"],
        documentation: "Reject a trial whose processed data reaches or falls under threshold.",
    },
    ProcessorInfo {
        name: "filter_fft",
        kind: ProcessorKind::TrialFilter,
        params: &["highest_freq", "lowest_freq"],
        documentation: "Band-pass the processed data in the frequency domain, keeping lowest_freq..=highest_freq Hz and the mean. The trial is mirror-padded by half its length on each side.",
    },
    ProcessorInfo {
        name: "resample",
        kind: ProcessorKind::TriggerStage,
        params: &["sample_rate"],
        documentation: "Shift trials to start at 0 and interpolate them onto one shared time axis.",
    },
    ProcessorInfo {
        name: "rm_baseline",
        kind: ProcessorKind::TriggerStage,
        params: &[],
        documentation: "Subtract the mean of the baseline range from each trial.",
    },
    ProcessorInfo {
        name: "percent_change",
        kind: ProcessorKind::TriggerStage,
        params: &[],
        documentation: "Divide baseline-removed data by the baseline mean. Requires rm_baseline.",
    },
];

fn known_names(kind: ProcessorKind) -> String {
    ProcessorInfo::of_kind(kind)
        .map(|p| p.name)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum TrialFilter {
    MovingAverage { window_size: usize },
    #[serde(rename = "rm_zero_value_trials")]
    RejectZeroRuns {
        zeros_to_count: usize,
        digit_tolerance: i32,
    },
    RejectAbove { threshold: f64 },
    RejectBelow { threshold: f64 },
    FilterFft { highest_freq: f64, lowest_freq: f64 },
}

impl TrialFilter {
    pub fn from_spec(spec: &ProcessorSpec) -> Result<Self> {
        match spec.name.as_str() {
            "moving_average" => {
                let window_size = spec.usize_param("window_size")?.ok_or_else(|| {
                    EpochError::InvalidConfig("moving_average: missing parameter 'window_size'".into())
                })?;
                if window_size == 0 {
                    return Err(EpochError::InvalidConfig(
                        "moving_average: window_size must be at least 1".into(),
                    ));
                }
                Ok(TrialFilter::MovingAverage { window_size })
            }
            "rm_zero_value_trials" => Ok(TrialFilter::RejectZeroRuns {
                zeros_to_count: spec.usize_param("zeros_to_count")?.unwrap_or(1),
                digit_tolerance: spec.usize_param("digit_tolerance")?.unwrap_or(0) as i32,
            }),
            "reject_above" => Ok(TrialFilter::RejectAbove {
                threshold: spec.required_f64("threshold")?,
            }),
            "reject_below" => Ok(TrialFilter::RejectBelow {
                threshold: spec.required_f64("threshold")?,
            }),
            "filter_fft" => {
                let highest_freq = spec.required_f64("highest_freq")?;
                let lowest_freq = spec.f64_param("lowest_freq")?.unwrap_or(0.0);
                if lowest_freq < 0.0 || lowest_freq > highest_freq {
                    return Err(EpochError::InvalidConfig(format!(
                        "filter_fft: need 0 <= lowest_freq <= highest_freq, got {} and {}",
                        lowest_freq, highest_freq
                    )));
                }
                Ok(TrialFilter::FilterFft {
                    highest_freq,
                    lowest_freq,
                })
            }
            other => Err(EpochError::UnknownProcessor {
                name: other.to_string(),
                known: known_names(ProcessorKind::TrialFilter),
            }),
        }
    }

    /// Apply to the trial's processed data. Rejection filters only set the flag.
    ///
    /// `sample_rate` is the rate of the stream the trial was cut from.
    pub fn apply(&self, trial: &mut Trial, sample_rate: f64) {
        match *self {
            TrialFilter::MovingAverage { window_size } => {
                let smoothed = moving_average(trial.proc(), window_size);
                trial.set_proc(smoothed);
            }
            TrialFilter::RejectZeroRuns {
                zeros_to_count,
                digit_tolerance,
            } => {
                let zeros = trial
                    .proc()
                    .iter()
                    .filter(|&&v| round_to(v, digit_tolerance) == 0.0)
                    .count();
                if zeros > zeros_to_count {
                    log::info!(
                        "Rejecting trial {}: {} samples round to zero",
                        trial.trial_number,
                        zeros
                    );
                    trial.rejected = true;
                }
            }
            TrialFilter::RejectAbove { threshold } => {
                if trial.proc().iter().any(|&v| v >= threshold) {
                    log::info!(
                        "Rejecting trial {}: value at or above {}",
                        trial.trial_number,
                        threshold
                    );
                    trial.rejected = true;
                }
            }
            TrialFilter::RejectBelow { threshold } => {
                if trial.proc().iter().any(|&v| v <= threshold) {
                    log::info!(
                        "Rejecting trial {}: value at or below {}",
                        trial.trial_number,
                        threshold
                    );
                    trial.rejected = true;
                }
            }
            TrialFilter::FilterFft {
                highest_freq,
                lowest_freq,
            } => {
                let filtered = filter_fft(trial.proc(), lowest_freq, highest_freq, sample_rate);
                trial.set_proc(filtered);
            }
        }
    }
}

/// Frequency of bin `k` in an `n`-point transform, laid out like numpy's `fftfreq`.
fn bin_frequency(k: usize, n: usize, sample_rate: f64) -> f64 {
    let signed = if k <= (n - 1) / 2 {
        k as f64
    } else {
        k as f64 - n as f64
    };
    signed * sample_rate / n as f64
}

/// Zero every frequency outside `[low, high]` Hz except the DC bin.
///
/// The first half of `data` is mirrored in front and the second half behind
/// before transforming, and the middle `data.len()` samples are returned.
pub fn filter_fft(data: &[f64], low: f64, high: f64, sample_rate: f64) -> Vec<f64> {
    let len = data.len();
    if len < 2 {
        return data.to_vec();
    }
    let half = len / 2;

    let mut buffer: Vec<Complex<f64>> = data[..half]
        .iter()
        .rev()
        .chain(data)
        .chain(data[half..].iter().rev())
        .map(|&x| Complex::new(x, 0.0))
        .collect();
    let n = buffer.len();

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    for (k, bin) in buffer.iter_mut().enumerate().skip(1) {
        let freq = bin_frequency(k, n, sample_rate).abs();
        if freq < low || freq > high {
            *bin = Complex::new(0.0, 0.0);
        }
    }

    planner.plan_fft_inverse(n).process(&mut buffer);
    buffer[half..half + len]
        .iter()
        .map(|c| c.re / n as f64)
        .collect()
}

/// Centered moving average with symmetric edge padding.
pub fn moving_average(data: &[f64], window_size: usize) -> Vec<f64> {
    let n = data.len();
    if n == 0 {
        return Vec::new();
    }
    let window = if window_size % 2 == 0 {
        window_size + 1
    } else {
        window_size
    };
    let half = (window / 2) as isize;
    let last = n as isize - 1;

    let mirrored = |j: isize| -> f64 {
        let k = if j < 0 {
            -j - 1
        } else if j > last {
            2 * last + 1 - j
        } else {
            j
        };
        data[k.clamp(0, last) as usize]
    };

    (0..n as isize)
        .map(|i| {
            let sum: f64 = (i - half..=i + half).map(mirrored).sum();
            sum / window as f64
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum TriggerStage {
    /// Target rate overrides the trigger's configured `sample_rate`
    Resample { sample_rate: Option<f64> },
    #[serde(rename = "rm_baseline")]
    RemoveBaseline,
    PercentChange,
}

impl TriggerStage {
    pub fn from_spec(spec: &ProcessorSpec) -> Result<Self> {
        match spec.name.as_str() {
            "resample" => {
                let sample_rate = spec.f64_param("sample_rate")?;
                if let Some(rate) = sample_rate {
                    if !rate.is_finite() || rate <= 0.0 {
                        return Err(EpochError::InvalidConfig(format!(
                            "resample: sample_rate must be positive, got {}",
                            rate
                        )));
                    }
                }
                Ok(TriggerStage::Resample { sample_rate })
            }
            "rm_baseline" => Ok(TriggerStage::RemoveBaseline),
            "percent_change" => Ok(TriggerStage::PercentChange),
            other => Err(EpochError::UnknownProcessor {
                name: other.to_string(),
                known: known_names(ProcessorKind::TriggerStage),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TriggerStage::Resample { .. } => "resample",
            TriggerStage::RemoveBaseline => "rm_baseline",
            TriggerStage::PercentChange => "percent_change",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TriggerStage::Resample { .. } => 0,
            TriggerStage::RemoveBaseline => 1,
            TriggerStage::PercentChange => 2,
        }
    }

    /// Parse a stage list and check it runs resample, rm_baseline,
    /// percent_change in that relative order with no repeats.
    pub fn parse_pipeline(specs: &[ProcessorSpec]) -> Result<Vec<TriggerStage>> {
        let stages = specs
            .iter()
            .map(TriggerStage::from_spec)
            .collect::<Result<Vec<_>>>()?;

        for pair in stages.windows(2) {
            if pair[0].rank() >= pair[1].rank() {
                return Err(EpochError::InvalidConfig(format!(
                    "trigger stage '{}' cannot follow '{}'",
                    pair[1].name(),
                    pair[0].name()
                )));
            }
        }
        let has_percent = stages.contains(&TriggerStage::PercentChange);
        let has_baseline = stages.contains(&TriggerStage::RemoveBaseline);
        if has_percent && !has_baseline {
            return Err(EpochError::InvalidConfig(
                "percent_change requires rm_baseline earlier in the pipeline".into(),
            ));
        }
        Ok(stages)
    }
}

pub fn default_trigger_stages() -> Vec<ProcessorSpec> {
    vec![
        ProcessorSpec::new("resample"),
        ProcessorSpec::new("rm_baseline"),
        ProcessorSpec::new("percent_change"),
    ]
}

/// Shift every trial to start at 0 and put all of them on one time axis.
///
/// Without a rate the axis is the union of every trial's times rounded to
/// [`RESAMPLE_DECIMALS`]; with a rate it is an even grid over the shared
/// duration. Both the original and processed views are interpolated.
pub fn resample(trials: &mut [Trial], sample_rate: Option<f64>) -> Result<()> {
    let Some(expected) = trials.first().map(Trial::duration) else {
        return Ok(());
    };
    for trial in trials.iter() {
        let got = trial.duration();
        if (got - expected).abs() > DURATION_TOLERANCE {
            return Err(EpochError::DurationMismatch { got, expected });
        }
    }

    let normalized: Vec<Vec<f64>> = trials
        .iter()
        .map(|t| {
            let t0 = t.timestamps()[0];
            t.timestamps().iter().map(|ts| ts - t0).collect()
        })
        .collect();

    let grid = match sample_rate {
        Some(rate) => {
            let points = ((expected * rate).round() as usize + 1).max(2);
            linspace(0.0, expected, points)
        }
        None => {
            let mut union: Vec<f64> = normalized
                .iter()
                .flatten()
                .map(|&t| round_to(t, RESAMPLE_DECIMALS))
                .collect();
            union.sort_by(|a, b| a.total_cmp(b));
            union.dedup();
            union
        }
    };

    for (trial, times) in trials.iter_mut().zip(&normalized) {
        let original = interp(&grid, times, trial.original());
        let proc = interp(&grid, times, trial.proc());
        trial.set_resampled(grid.clone(), original, proc);
    }
    log::debug!("Resampled {} trials onto {} points", trials.len(), grid.len());
    Ok(())
}

/// Mean of `proc` over `[start, end]` seconds from the trial start.
///
/// Both edges are interpolated and every sample strictly inside is counted
/// once; a zero-width range contributes a single interpolated point.
pub fn baseline_mean(trial: &Trial, range: [f64; 2]) -> Result<f64> {
    let [start, end] = range;
    let duration = trial.duration();
    let invalid = |reason: &str| EpochError::BaselineRangeInvalid {
        start,
        end,
        duration,
        reason: reason.to_string(),
    };
    if !start.is_finite() || !end.is_finite() {
        return Err(invalid("range must be finite"));
    }
    if start < 0.0 {
        return Err(invalid("start is negative"));
    }
    if start > end {
        return Err(invalid("start is after end"));
    }
    if end > duration + DURATION_TOLERANCE {
        return Err(invalid("end is past the trial"));
    }

    let t0 = trial.timestamps()[0];
    let rel: Vec<f64> = trial.timestamps().iter().map(|t| t - t0).collect();
    let proc = trial.proc();

    let mut sum = interp_at(start, &rel, proc);
    let mut count = 1usize;
    for (t, v) in rel.iter().zip(proc) {
        if *t > start && *t < end {
            sum += v;
            count += 1;
        }
    }
    if end > start {
        sum += interp_at(end, &rel, proc);
        count += 1;
    }
    Ok(sum / count as f64)
}

pub fn remove_baseline(trials: &mut [Trial], range: [f64; 2]) -> Result<()> {
    let means = trials
        .iter()
        .map(|t| baseline_mean(t, range))
        .collect::<Result<Vec<_>>>()?;

    for (trial, mean) in trials.iter_mut().zip(means) {
        let removed = trial.proc().iter().map(|v| v - mean).collect();
        trial.set_baseline_removed(mean, removed);
    }
    Ok(())
}

/// Divide baseline-removed data by the baseline mean.
///
/// Trials whose mean is zero or not finite are rejected and get no
/// percent-change view. Returns the trial numbers rejected here.
pub fn percent_change(trials: &mut [Trial], trigger: &str) -> Vec<usize> {
    let mut rejected = Vec::new();
    for trial in trials.iter_mut() {
        let Some(removed) = trial.series(View::BaselineRemoved, Axis::Data) else {
            continue;
        };
        match trial.baseline_mean {
            Some(mean) if mean != 0.0 && mean.is_finite() => {
                let pc: Vec<f64> = removed.iter().map(|v| v / mean).collect();
                trial.set_percent_change(pc);
            }
            _ => {
                let err = EpochError::UndefinedBaselineMean(trial.trial_number);
                log::warn!("{}: {}; not computing percent change", trigger, err);
                trial.rejected = true;
                rejected.push(trial.trial_number);
            }
        }
    }
    rejected
}
