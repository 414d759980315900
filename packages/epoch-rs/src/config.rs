use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EpochError, Result};
use crate::processing::{default_trigger_stages, ProcessorSpec, TrialFilter, TriggerStage};
use crate::types::TrialWindow;

fn default_baseline_time() -> f64 {
    1.0
}

fn default_trial_time() -> f64 {
    1.0
}

/// Top-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Trigger names to extract
    pub triggers: Vec<String>,
    /// Seconds before the marker
    #[serde(default = "default_baseline_time")]
    pub baseline_time: f64,
    /// Seconds after the marker
    #[serde(default = "default_trial_time")]
    pub trial_time: f64,
    /// Target rate for the resample stage
    #[serde(default)]
    pub sample_rate: Option<f64>,
    /// Baseline window in seconds from the trial start
    #[serde(default)]
    pub baseline_range: Option<[f64; 2]>,
    #[serde(default)]
    pub trial_filters: Vec<ProcessorSpec>,
    #[serde(default = "default_trigger_stages")]
    pub trigger_stages: Vec<ProcessorSpec>,
    /// `None` lets rayon pick; 0 or 1 runs everything on the caller's thread
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub markers_only: bool,
    /// Trim every stream of a recording to their shared span before segmenting
    #[serde(default)]
    pub sync_streams: Option<StreamSync>,
    /// Keyed by `dataset[:stream[:trigger[:trialN]]]`
    #[serde(default)]
    pub overrides: BTreeMap<String, Override>,
}

/// Dataset-level stream synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamSync {
    /// Regrid every trimmed stream at this rate
    #[serde(default)]
    pub sample_rate: Option<f64>,
}

/// Partial settings applied on top of the base configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Override {
    pub triggers: Option<Vec<String>>,
    pub baseline_time: Option<f64>,
    pub trial_time: Option<f64>,
    pub sample_rate: Option<f64>,
    pub baseline_range: Option<[f64; 2]>,
}

impl Override {
    fn only_sets_window(&self) -> bool {
        self.triggers.is_none() && self.sample_rate.is_none() && self.baseline_range.is_none()
    }
}

/// Parsed form of an override key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OverrideKey<'a> {
    dataset: &'a str,
    stream: Option<&'a str>,
    trigger: Option<&'a str>,
    trial: Option<usize>,
}

impl<'a> OverrideKey<'a> {
    fn parse(key: &'a str) -> Result<Self> {
        let parts: Vec<&str> = key.split(':').collect();
        if parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(EpochError::InvalidConfig(format!(
                "override key '{}' must look like dataset[:stream[:trigger[:trialN]]]",
                key
            )));
        }
        let trial = match parts.get(3) {
            Some(part) => Some(
                part.strip_prefix("trial")
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|&n| n > 0)
                    .ok_or_else(|| {
                        EpochError::InvalidConfig(format!(
                            "override key '{}': '{}' is not of the form trialN",
                            key, part
                        ))
                    })?,
            ),
            None => None,
        };
        Ok(Self {
            dataset: parts[0],
            stream: parts.get(1).copied(),
            trigger: parts.get(2).copied(),
            trial,
        })
    }

    /// Whether this key applies to everything `other` addresses.
    fn covers(&self, other: &OverrideKey<'_>) -> bool {
        self.dataset == other.dataset
            && (self.stream.is_none() || self.stream == other.stream)
            && (self.trigger.is_none() || self.trigger == other.trigger)
            && (self.trial.is_none() || self.trial == other.trial)
    }

    fn depth(&self) -> usize {
        [self.stream.is_some(), self.trigger.is_some(), self.trial.is_some()]
            .iter()
            .filter(|&&set| set)
            .count()
    }
}

/// Immutable per-trigger settings, resolved once and handed to a segmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub baseline_time: f64,
    pub trial_time: f64,
    pub sample_rate: Option<f64>,
    pub baseline_range: Option<[f64; 2]>,
    pub trial_filters: Vec<TrialFilter>,
    pub trigger_stages: Vec<TriggerStage>,
    pub markers_only: bool,
    /// Per-trial windows keyed by trial number
    #[serde(default)]
    pub trial_windows: BTreeMap<usize, TrialWindow>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            baseline_time: default_baseline_time(),
            trial_time: default_trial_time(),
            sample_rate: None,
            baseline_range: None,
            trial_filters: Vec::new(),
            trigger_stages: vec![
                TriggerStage::Resample { sample_rate: None },
                TriggerStage::RemoveBaseline,
                TriggerStage::PercentChange,
            ],
            markers_only: false,
            trial_windows: BTreeMap::new(),
        }
    }
}

impl TriggerConfig {
    pub fn window(&self) -> TrialWindow {
        TrialWindow::new(self.baseline_time, self.trial_time)
    }

    pub fn window_for(&self, trial_number: usize) -> TrialWindow {
        self.trial_windows
            .get(&trial_number)
            .copied()
            .unwrap_or_else(|| self.window())
    }
}

impl PipelineConfig {
    pub fn new(triggers: Vec<String>, baseline_time: f64, trial_time: f64) -> Self {
        Self {
            triggers,
            baseline_time,
            trial_time,
            sample_rate: None,
            baseline_range: None,
            trial_filters: Vec::new(),
            trigger_stages: default_trigger_stages(),
            max_workers: None,
            markers_only: false,
            sync_streams: None,
            overrides: BTreeMap::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check everything that can be checked without data.
    pub fn validate(&self) -> Result<()> {
        if self.triggers.is_empty() {
            return Err(EpochError::InvalidConfig("no triggers configured".into()));
        }
        check_window(self.baseline_time, self.trial_time, "base configuration")?;
        check_rate(self.sample_rate, "base configuration")?;
        check_range(self.baseline_range, "base configuration")?;
        if let Some(sync) = self.sync_streams {
            check_rate(sync.sample_rate, "sync_streams")?;
        }

        for spec in &self.trial_filters {
            TrialFilter::from_spec(spec)?;
        }
        TriggerStage::parse_pipeline(&self.trigger_stages)?;

        for (key, ov) in &self.overrides {
            let parsed = OverrideKey::parse(key)?;
            if parsed.trial.is_some() && !ov.only_sets_window() {
                return Err(EpochError::InvalidConfig(format!(
                    "override '{}': trial overrides may only set baseline_time and trial_time",
                    key
                )));
            }
            if parsed.trigger.is_some() && ov.triggers.is_some() {
                return Err(EpochError::InvalidConfig(format!(
                    "override '{}': trigger lists can only be overridden per dataset or stream",
                    key
                )));
            }
            let window = self.effective_window(&parsed);
            check_window(window.baseline_time, window.trial_time, key)?;
            check_rate(ov.sample_rate, key)?;
            check_range(ov.baseline_range, key)?;
            if ov.triggers.as_ref().is_some_and(|t| t.is_empty()) {
                return Err(EpochError::InvalidConfig(format!(
                    "override '{}': empty trigger list",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Window obtained by stacking every override that covers `key` over the base.
    fn effective_window(&self, key: &OverrideKey<'_>) -> TrialWindow {
        let mut chain: Vec<(OverrideKey<'_>, &Override)> = self
            .overrides
            .iter()
            .filter_map(|(k, ov)| OverrideKey::parse(k).ok().map(|k| (k, ov)))
            .filter(|(k, _)| k.covers(key))
            .collect();
        chain.sort_by_key(|(k, _)| k.depth());

        chain
            .into_iter()
            .fold(self.base_window(), |window, (_, ov)| {
                TrialWindow::new(
                    ov.baseline_time.unwrap_or(window.baseline_time),
                    ov.trial_time.unwrap_or(window.trial_time),
                )
            })
    }

    fn base_window(&self) -> TrialWindow {
        TrialWindow::new(self.baseline_time, self.trial_time)
    }

    /// Matching overrides from least to most specific.
    fn matching<'a>(
        &'a self,
        dataset: &str,
        stream: Option<&str>,
        trigger: Option<&str>,
    ) -> Vec<(OverrideKey<'a>, &'a Override)> {
        let mut found: Vec<(OverrideKey<'a>, &'a Override)> = self
            .overrides
            .iter()
            .filter_map(|(key, ov)| OverrideKey::parse(key).ok().map(|k| (k, ov)))
            .filter(|(k, _)| {
                k.trial.is_none()
                    && k.dataset == dataset
                    && (k.stream.is_none() || k.stream == stream)
                    && (k.trigger.is_none() || k.trigger == trigger)
            })
            .collect();
        found.sort_by_key(|(k, _)| k.depth());
        found
    }

    /// Trigger names to extract from one stream.
    pub fn triggers_for(&self, dataset: &str, stream: &str) -> Vec<String> {
        self.matching(dataset, Some(stream), None)
            .into_iter()
            .rev()
            .find_map(|(_, ov)| ov.triggers.clone())
            .unwrap_or_else(|| self.triggers.clone())
    }

    /// Settings snapshot for one `(dataset, stream, trigger)` unit.
    pub fn resolve(&self, dataset: &str, stream: &str, trigger: &str) -> Result<TriggerConfig> {
        let mut resolved = TriggerConfig {
            baseline_time: self.baseline_time,
            trial_time: self.trial_time,
            sample_rate: self.sample_rate,
            baseline_range: self.baseline_range,
            trial_filters: self
                .trial_filters
                .iter()
                .map(TrialFilter::from_spec)
                .collect::<Result<Vec<_>>>()?,
            trigger_stages: TriggerStage::parse_pipeline(&self.trigger_stages)?,
            markers_only: self.markers_only,
            trial_windows: BTreeMap::new(),
        };

        for (_, ov) in self.matching(dataset, Some(stream), Some(trigger)) {
            if let Some(b) = ov.baseline_time {
                resolved.baseline_time = b;
            }
            if let Some(t) = ov.trial_time {
                resolved.trial_time = t;
            }
            if ov.sample_rate.is_some() {
                resolved.sample_rate = ov.sample_rate;
            }
            if ov.baseline_range.is_some() {
                resolved.baseline_range = ov.baseline_range;
            }
        }
        let context = format!("{}:{}:{}", dataset, stream, trigger);
        check_window(resolved.baseline_time, resolved.trial_time, &context)?;

        for (key, ov) in &self.overrides {
            let Ok(parsed) = OverrideKey::parse(key) else {
                continue;
            };
            let Some(trial) = parsed.trial else {
                continue;
            };
            if parsed.dataset == dataset
                && parsed.stream == Some(stream)
                && parsed.trigger == Some(trigger)
            {
                let window = TrialWindow::new(
                    ov.baseline_time.unwrap_or(resolved.baseline_time),
                    ov.trial_time.unwrap_or(resolved.trial_time),
                );
                check_window(window.baseline_time, window.trial_time, key)?;
                resolved.trial_windows.insert(trial, window);
            }
        }

        Ok(resolved)
    }
}

fn check_window(baseline_time: f64, trial_time: f64, context: &str) -> Result<()> {
    if !baseline_time.is_finite() || !trial_time.is_finite() {
        return Err(EpochError::InvalidConfig(format!(
            "{}: baseline_time and trial_time must be finite",
            context
        )));
    }
    if baseline_time + trial_time <= 0.0 {
        return Err(EpochError::InvalidConfig(format!(
            "{}: baseline_time + trial_time must be positive, got {}",
            context,
            baseline_time + trial_time
        )));
    }
    Ok(())
}

fn check_rate(rate: Option<f64>, context: &str) -> Result<()> {
    match rate {
        Some(r) if !r.is_finite() || r <= 0.0 => Err(EpochError::InvalidConfig(format!(
            "{}: sample_rate must be positive, got {}",
            context, r
        ))),
        _ => Ok(()),
    }
}

fn check_range(range: Option<[f64; 2]>, context: &str) -> Result<()> {
    match range {
        Some([start, end]) if !start.is_finite() || !end.is_finite() || start < 0.0 || start > end => {
            Err(EpochError::InvalidConfig(format!(
                "{}: baseline_range [{}, {}] must satisfy 0 <= start <= end",
                context, start, end
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PipelineConfig {
        PipelineConfig::from_json_str(
            r#"{
                "triggers": ["go", "stop"],
                "baseline_time": 0.5,
                "trial_time": 2.0,
                "baseline_range": [0.0, 0.5],
                "overrides": {
                    "s01": {"trial_time": 3.0},
                    "s01:pupil": {"triggers": ["go"], "sample_rate": 60.0},
                    "s01:pupil:go": {"baseline_time": 1.0},
                    "s01:pupil:go:trial2": {"trial_time": 4.0}
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = PipelineConfig::from_json_str(r#"{"triggers": ["go"]}"#).unwrap();
        assert_eq!(cfg.baseline_time, 1.0);
        assert_eq!(cfg.trial_time, 1.0);
        assert_eq!(cfg.trigger_stages.len(), 3);
        assert!(!cfg.markers_only);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_resolve_applies_most_specific_override() {
        let cfg = base();
        cfg.validate().unwrap();

        let go = cfg.resolve("s01", "pupil", "go").unwrap();
        assert_eq!(go.baseline_time, 1.0);
        assert_eq!(go.trial_time, 3.0);
        assert_eq!(go.sample_rate, Some(60.0));
        assert_eq!(go.window_for(2), TrialWindow::new(1.0, 4.0));
        assert_eq!(go.window_for(1), TrialWindow::new(1.0, 3.0));

        let other = cfg.resolve("s02", "pupil", "go").unwrap();
        assert_eq!(other.window(), TrialWindow::new(0.5, 2.0));
        assert!(other.trial_windows.is_empty());
    }

    #[test]
    fn test_triggers_for_stream() {
        let cfg = base();
        assert_eq!(cfg.triggers_for("s01", "pupil"), vec!["go".to_string()]);
        assert_eq!(cfg.triggers_for("s01", "gaze").len(), 2);
    }

    #[test]
    fn test_validation_errors() {
        let mut cfg = base();
        cfg.trial_filters.push(ProcessorSpec::new("filter_wavelet"));
        assert!(matches!(
            cfg.validate(),
            Err(EpochError::UnknownProcessor { .. })
        ));

        let mut cfg = base();
        cfg.overrides.insert(
            "s01:pupil:go:trial3".into(),
            Override {
                sample_rate: Some(10.0),
                ..Override::default()
            },
        );
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.overrides.insert("s01:pupil:go:third".into(), Override::default());
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.baseline_time = -2.0;
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.baseline_range = Some([0.4, 0.1]);
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.triggers.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.sync_streams = Some(StreamSync {
            sample_rate: Some(0.0),
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_checks_override_windows() {
        let cfg = PipelineConfig::from_json_str(
            r#"{"triggers": ["go"], "baseline_time": 1.0, "trial_time": 1.0,
                "overrides": {"s02": {"baseline_time": -1.5}}}"#,
        )
        .unwrap();
        assert!(matches!(cfg.validate(), Err(EpochError::InvalidConfig(msg)) if msg.starts_with("s02:")));

        // Trial windows stack on the trigger's window
        let mut cfg = base();
        cfg.overrides.insert(
            "s01:pupil:go:trial2".into(),
            Override {
                baseline_time: Some(-4.0),
                ..Override::default()
            },
        );
        assert!(cfg.validate().is_err());

        // A dataset window must also hold for streams without their own override
        let mut cfg = base();
        cfg.overrides.insert(
            "s03".into(),
            Override {
                baseline_time: Some(-2.5),
                ..Override::default()
            },
        );
        cfg.overrides.insert(
            "s03:pupil".into(),
            Override {
                trial_time: Some(3.0),
                ..Override::default()
            },
        );
        assert!(cfg.validate().is_err());
        cfg.overrides.remove("s03");
        cfg.validate().unwrap();
    }

    #[test]
    fn test_unknown_override_field_is_rejected() {
        let err = PipelineConfig::from_json_str(
            r#"{"triggers": ["go"], "overrides": {"s01": {"window": 2}}}"#,
        );
        assert!(matches!(err, Err(EpochError::JsonError(_))));
    }
}
