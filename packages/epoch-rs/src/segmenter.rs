use crate::alignment::{MarkerScan, ScanEvent};
use crate::config::TriggerConfig;
use crate::container::Trigger;
use crate::error::Result;
use crate::extractor::extract_trial;
use crate::processing::{percent_change, remove_baseline, resample, TriggerStage};
use crate::profile_scope;
use crate::types::SignalStream;

/// Turns one trigger's markers on one stream into trials.
pub struct Segmenter {
    config: TriggerConfig,
}

impl Segmenter {
    pub fn new(config: TriggerConfig) -> Self {
        Self { config }
    }

    /// Align every marker, cut its window and run the configured stages.
    ///
    /// Markers outside the stream and windows that cannot be cut are counted
    /// and logged. A failing stage leaves the trials as they were before it
    /// and is recorded in [`Trigger::failure`].
    pub fn segment(&self, stream: &SignalStream, name: &str, marker_times: &[f64]) -> Trigger {
        profile_scope!(format!("segment '{}'", name));
        let mut trigger = Trigger::new(name, self.config.clone());

        for event in MarkerScan::new(stream, marker_times) {
            let trial_number = event.ordinal() + 1;
            match event {
                ScanEvent::Found {
                    marker_time,
                    alignment,
                    ..
                } => {
                    trigger.audit.data_indices.push(alignment.chosen_index);
                    trigger.audit.data_times.push(alignment.chosen_timestamp);
                    trigger.audit.data_errors.push(alignment.signed_error);
                    trigger.audit.took_previous.push(alignment.took_previous);

                    if self.config.markers_only {
                        continue;
                    }
                    let window = self.config.window_for(trial_number);
                    match extract_trial(stream, &alignment, marker_time, &window, trial_number) {
                        Ok(trial) => trigger.trials.push(trial),
                        Err(e) => {
                            log::warn!("{}: dropping trial {}: {}", name, trial_number, e);
                            trigger.dropped_trials.push(trial_number);
                        }
                    }
                }
                ScanEvent::Missing { marker_time, .. } => {
                    log::warn!(
                        "{}: skipping marker {} at {}: outside the stream",
                        name,
                        trial_number,
                        marker_time
                    );
                    trigger.missing_markers += 1;
                }
            }
        }

        if trigger.missing_markers > 0 {
            log::warn!(
                "{}: missing {} markers from stream",
                name,
                trigger.missing_markers
            );
        }
        if self.config.markers_only {
            log::info!("{}: located {} markers", name, trigger.audit.len());
            return trigger;
        }

        for trial in trigger.trials.iter_mut() {
            for filter in &self.config.trial_filters {
                filter.apply(trial, stream.sample_rate());
            }
        }

        if let Err(e) = self.run_stages(&mut trigger) {
            log::error!("{}: post-processing stopped: {}", name, e);
            trigger.failure = Some(e.to_string());
        }

        log::info!(
            "{}: {} trials ({} rejected, {} dropped)",
            name,
            trigger.trials.len(),
            trigger.trials.iter().filter(|t| t.rejected).count(),
            trigger.dropped_trials.len()
        );
        trigger
    }

    fn run_stages(&self, trigger: &mut Trigger) -> Result<()> {
        for stage in &self.config.trigger_stages {
            match stage {
                TriggerStage::Resample { sample_rate } => {
                    resample(&mut trigger.trials, sample_rate.or(self.config.sample_rate))?;
                }
                TriggerStage::RemoveBaseline => match self.config.baseline_range {
                    Some(range) => remove_baseline(&mut trigger.trials, range)?,
                    None => {
                        log::info!("{}: no baseline range, skipping rm_baseline", trigger.name);
                    }
                },
                TriggerStage::PercentChange => {
                    if self.config.baseline_range.is_none() {
                        log::info!("{}: no baseline range, skipping percent_change", trigger.name);
                        continue;
                    }
                    percent_change(&mut trigger.trials, &trigger.name);
                }
            }
        }
        Ok(())
    }
}
