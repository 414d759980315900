use rayon::prelude::*;

use crate::config::{PipelineConfig, TriggerConfig};
use crate::container::{Dataset, Datastream, RunReport, UnitFailure};
use crate::error::{EpochError, Result};
use crate::profile_scope;
use crate::recording::Recording;
use crate::segmenter::Segmenter;
use crate::sync::sync_streams;
use crate::types::SignalStream;

/// Which level of the dataset/stream/trigger tree runs in parallel.
///
/// Each level includes the ones above it: `Streams` parallelizes datasets
/// and the streams inside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerPlan {
    Sequential,
    Datasets,
    Streams,
    Triggers,
}

impl WorkerPlan {
    /// Deepest level whose cumulative unit count fits in `max_workers`.
    pub fn new(max_workers: usize, datasets: usize, streams: usize, triggers: usize) -> Self {
        if max_workers <= 1 {
            WorkerPlan::Sequential
        } else if max_workers >= datasets + streams + triggers {
            WorkerPlan::Triggers
        } else if max_workers >= datasets + streams {
            WorkerPlan::Streams
        } else if max_workers >= datasets {
            WorkerPlan::Datasets
        } else {
            WorkerPlan::Sequential
        }
    }
}

struct TriggerUnit {
    name: String,
    config: TriggerConfig,
    markers: Vec<f64>,
}

struct PreparedStream {
    name: String,
    stream: SignalStream,
    units: Vec<TriggerUnit>,
}

struct PreparedDataset {
    name: String,
    streams: Vec<PreparedStream>,
    failures: Vec<UnitFailure>,
}

/// Runs the configured extraction over a set of recordings.
pub struct EpochRunner {
    config: PipelineConfig,
}

impl EpochRunner {
    /// Validate `config` and build a runner for it.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every recording and collect the results.
    ///
    /// Invalid streams are reported in [`RunReport::failures`] and skipped;
    /// only configuration problems abort the run.
    pub fn run(&self, recordings: Vec<Recording>) -> Result<RunReport> {
        profile_scope!("run");

        let prepared = recordings
            .into_iter()
            .map(|r| self.prepare(r))
            .collect::<Result<Vec<_>>>()?;

        let datasets = prepared.len();
        let streams: usize = prepared.iter().map(|d| d.streams.len()).sum();
        let triggers: usize = prepared
            .iter()
            .flat_map(|d| d.streams.iter())
            .map(|s| s.units.len())
            .sum();

        let outputs = match self.config.max_workers {
            Some(n) if n <= 1 => {
                log::info!(
                    "Processing {} datasets, {} streams, {} trigger units sequentially",
                    datasets,
                    streams,
                    triggers
                );
                process_all(prepared, WorkerPlan::Sequential)
            }
            Some(n) => {
                let plan = WorkerPlan::new(n, datasets, streams, triggers);
                log::info!(
                    "Processing {} datasets, {} streams, {} trigger units with {} workers ({:?})",
                    datasets,
                    streams,
                    triggers,
                    n,
                    plan
                );
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| EpochError::InvalidParameter(format!("thread pool: {}", e)))?;
                pool.install(|| process_all(prepared, plan))
            }
            None => {
                let n = rayon::current_num_threads();
                let plan = WorkerPlan::new(n, datasets, streams, triggers);
                log::info!(
                    "Processing {} datasets, {} streams, {} trigger units on {} threads ({:?})",
                    datasets,
                    streams,
                    triggers,
                    n,
                    plan
                );
                process_all(prepared, plan)
            }
        };

        let mut all_datasets = Vec::with_capacity(outputs.len());
        let mut failures = Vec::new();
        for (dataset, mut dataset_failures) in outputs {
            all_datasets.push(dataset);
            failures.append(&mut dataset_failures);
        }
        for failure in &failures {
            log::warn!("Failed: {}", failure);
        }

        Ok(RunReport::new(all_datasets, failures))
    }

    /// Validate streams and resolve per-trigger settings for one recording.
    fn prepare(&self, recording: Recording) -> Result<PreparedDataset> {
        let Recording {
            name,
            streams,
            markers,
        } = recording;
        let mut prepared = PreparedDataset {
            name,
            streams: Vec::new(),
            failures: Vec::new(),
        };

        let mut signals = Vec::with_capacity(streams.len());
        for (stream_name, record) in streams {
            match record.into_signal() {
                Ok(s) => signals.push((stream_name, s)),
                Err(e) => {
                    log::warn!("{}: rejecting stream '{}': {}", prepared.name, stream_name, e);
                    prepared.failures.push(UnitFailure {
                        dataset: prepared.name.clone(),
                        stream: Some(stream_name),
                        trigger: None,
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Some(sync) = self.config.sync_streams {
            match sync_streams(&mut signals, sync.sample_rate) {
                Ok(Some((start, end))) => log::info!(
                    "{}: synchronized {} streams to [{}, {}]",
                    prepared.name,
                    signals.len(),
                    start,
                    end
                ),
                Ok(None) => {}
                Err(e) => {
                    log::warn!("{}: rejecting all streams: {}", prepared.name, e);
                    prepared.failures.push(UnitFailure {
                        dataset: prepared.name.clone(),
                        stream: None,
                        trigger: None,
                        error: e.to_string(),
                    });
                    signals.clear();
                }
            }
        }

        for (stream_name, stream) in signals {
            let mut units = Vec::new();
            for trigger in self.config.triggers_for(&prepared.name, &stream_name) {
                if !markers.contains(&trigger) {
                    log::warn!(
                        "{}: trigger '{}' has no markers in this recording",
                        prepared.name,
                        trigger
                    );
                    continue;
                }
                let config = self.config.resolve(&prepared.name, &stream_name, &trigger)?;
                units.push(TriggerUnit {
                    markers: markers.times_for(&trigger),
                    name: trigger,
                    config,
                });
            }

            prepared.streams.push(PreparedStream {
                name: stream_name,
                stream,
                units,
            });
        }
        Ok(prepared)
    }
}

/// Map over owned items, in parallel on the current rayon pool when asked.
fn map_units<T, R, F>(items: Vec<T>, parallel: bool, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    if parallel {
        items.into_par_iter().map(f).collect()
    } else {
        items.into_iter().map(f).collect()
    }
}

fn process_all(
    datasets: Vec<PreparedDataset>,
    plan: WorkerPlan,
) -> Vec<(Dataset, Vec<UnitFailure>)> {
    map_units(datasets, plan >= WorkerPlan::Datasets, |d| {
        process_dataset(d, plan)
    })
}

fn process_dataset(prepared: PreparedDataset, plan: WorkerPlan) -> (Dataset, Vec<UnitFailure>) {
    profile_scope!(format!("dataset '{}'", prepared.name));
    let PreparedDataset {
        name,
        streams,
        mut failures,
    } = prepared;

    let mut dataset = Dataset::new(&name);
    let results = map_units(streams, plan >= WorkerPlan::Streams, |s| {
        process_stream(&name, s, plan >= WorkerPlan::Triggers)
    });
    for (datastream, mut stream_failures) in results {
        failures.append(&mut stream_failures);
        dataset.streams.insert(datastream.name.clone(), datastream);
    }
    if dataset.streams.is_empty() {
        log::warn!("{}: no usable streams, rejecting dataset", name);
        dataset.rejected = true;
    }
    (dataset, failures)
}

fn process_stream(
    dataset: &str,
    prepared: PreparedStream,
    parallel_triggers: bool,
) -> (Datastream, Vec<UnitFailure>) {
    let PreparedStream {
        name,
        stream,
        units,
    } = prepared;

    let triggers = map_units(units, parallel_triggers, |unit| {
        Segmenter::new(unit.config).segment(&stream, &unit.name, &unit.markers)
    });

    let mut failures = Vec::new();
    let mut datastream = Datastream::new(name, stream);
    for trigger in triggers {
        if let Some(error) = &trigger.failure {
            failures.push(UnitFailure {
                dataset: dataset.to_string(),
                stream: Some(datastream.name.clone()),
                trigger: Some(trigger.name.clone()),
                error: error.clone(),
            });
        }
        datastream.triggers.insert(trigger.name.clone(), trigger);
    }
    (datastream, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Override, StreamSync};
    use crate::recording::StreamRecord;
    use crate::types::{Axis, MarkerSet, View};
    use std::collections::BTreeMap;

    fn recording(name: &str) -> Recording {
        let timestamps: Vec<f64> = (0..101).map(|i| i as f64 / 10.0).collect();
        let data: Vec<f64> = (0..101).map(|i| 2.0 + (i as f64 / 7.0).sin()).collect();
        let mut streams = BTreeMap::new();
        streams.insert(
            "pupil".to_string(),
            StreamRecord {
                data,
                timestamps: timestamps.clone(),
                sample_rate: Some(10.0),
            },
        );
        streams.insert(
            "broken".to_string(),
            StreamRecord {
                data: vec![1.0, 2.0],
                timestamps: vec![0.0],
                sample_rate: Some(10.0),
            },
        );
        Recording {
            name: name.to_string(),
            streams,
            markers: MarkerSet::new(
                vec!["go".into(), "stop".into(), "go".into()],
                vec![2.0, 5.0, 7.0],
            )
            .unwrap(),
        }
    }

    fn config(max_workers: Option<usize>) -> PipelineConfig {
        let mut cfg = PipelineConfig::new(vec!["go".into(), "stop".into(), "blink".into()], 1.0, 2.0);
        cfg.baseline_range = Some([0.0, 1.0]);
        cfg.max_workers = max_workers;
        cfg
    }

    #[test]
    fn test_worker_plan_levels() {
        assert_eq!(WorkerPlan::new(1, 1, 1, 1), WorkerPlan::Sequential);
        assert_eq!(WorkerPlan::new(2, 3, 3, 6), WorkerPlan::Sequential);
        assert_eq!(WorkerPlan::new(3, 3, 3, 6), WorkerPlan::Datasets);
        assert_eq!(WorkerPlan::new(6, 3, 3, 6), WorkerPlan::Streams);
        assert_eq!(WorkerPlan::new(12, 3, 3, 6), WorkerPlan::Triggers);
    }

    #[test]
    fn test_trigger_failures_stay_in_their_trigger() {
        let mut cfg = config(Some(4));
        // Trial 1 of a/go is longer than trial 2, so resampling cannot line them up
        cfg.overrides.insert(
            "a:pupil:go:trial1".into(),
            Override {
                trial_time: Some(3.0),
                ..Override::default()
            },
        );
        // b/stop trials are 3 s long
        cfg.overrides.insert(
            "b:pupil:stop".into(),
            Override {
                baseline_range: Some([0.0, 5.0]),
                ..Override::default()
            },
        );

        let report = EpochRunner::new(cfg)
            .unwrap()
            .run(vec![recording("a"), recording("b")])
            .unwrap();

        let mut trigger_failures: Vec<(&str, &str, &str)> = report
            .failures
            .iter()
            .filter_map(|f| {
                Some((f.dataset.as_str(), f.trigger.as_deref()?, f.error.as_str()))
            })
            .collect();
        trigger_failures.sort();
        assert_eq!(trigger_failures.len(), 2);
        assert_eq!(trigger_failures[0].0, "a");
        assert_eq!(trigger_failures[0].1, "go");
        assert!(trigger_failures[0].2.contains("matching durations"));
        assert_eq!(trigger_failures[1].0, "b");
        assert_eq!(trigger_failures[1].1, "stop");
        assert!(trigger_failures[1].2.contains("Invalid baseline range"));
        assert_eq!(report.failures.len(), 4);

        let has_percent_change = |dataset: &str, trigger: &str| {
            let t = report
                .dataset(dataset)
                .unwrap()
                .stream("pupil")
                .unwrap()
                .trigger(trigger)
                .unwrap();
            !t.trials.is_empty()
                && t.trials
                    .iter()
                    .all(|tr| tr.series(View::PercentChange, Axis::Data).is_some())
        };
        assert!(has_percent_change("a", "stop"));
        assert!(has_percent_change("b", "go"));
        assert!(!has_percent_change("a", "go"));
        assert!(!has_percent_change("b", "stop"));

        // Failed triggers keep their trials
        let a_go = report.dataset("a").unwrap().stream("pupil").unwrap().trigger("go").unwrap();
        assert_eq!(a_go.trials.len(), 2);
        assert!(a_go.failure.is_some());
    }

    #[test]
    fn test_sync_streams_before_segmenting() {
        let mut streams = BTreeMap::new();
        for (name, offset) in [("pupil", 0.0), ("gaze", 0.35)] {
            let timestamps: Vec<f64> = (0..101).map(|i| offset + i as f64 / 10.0).collect();
            let data: Vec<f64> = timestamps.iter().map(|t| 3.0 + t).collect();
            streams.insert(
                name.to_string(),
                StreamRecord {
                    data,
                    timestamps,
                    sample_rate: Some(10.0),
                },
            );
        }
        let recording = Recording {
            name: "s01".into(),
            streams,
            markers: MarkerSet::new(vec!["go".into()], vec![2.0]).unwrap(),
        };

        let mut cfg = config(Some(1));
        cfg.sync_streams = Some(StreamSync {
            sample_rate: Some(20.0),
        });
        let report = EpochRunner::new(cfg).unwrap().run(vec![recording]).unwrap();
        assert!(report.is_clean(), "failures: {:?}", report.failures);

        let dataset = report.dataset("s01").unwrap();
        let pupil = &dataset.stream("pupil").unwrap().stream;
        let gaze = &dataset.stream("gaze").unwrap().stream;
        assert_eq!(pupil.first_timestamp(), 0.35);
        assert_eq!(gaze.first_timestamp(), 0.35);
        assert_eq!(pupil.last_timestamp(), 10.0);
        assert_eq!(gaze.last_timestamp(), 10.0);
        assert_eq!(pupil.timestamps(), gaze.timestamps());
        assert_eq!(dataset.stream("gaze").unwrap().sample_rate, 20.0);

        for stream in ["pupil", "gaze"] {
            let go = dataset.stream(stream).unwrap().trigger("go").unwrap();
            assert_eq!(go.trials.len(), 1);
        }
    }

    #[test]
    fn test_disjoint_streams_reject_the_dataset() {
        let mut rec = recording("s01");
        if let Some(pupil) = rec.streams.get_mut("pupil") {
            pupil.timestamps.iter_mut().for_each(|t| *t += 20.0);
        }
        rec.streams.insert(
            "gaze".into(),
            StreamRecord {
                data: vec![1.0; 11],
                timestamps: (0..11).map(|i| i as f64).collect(),
                sample_rate: None,
            },
        );

        let mut cfg = config(Some(1));
        cfg.sync_streams = Some(StreamSync::default());
        let report = EpochRunner::new(cfg).unwrap().run(vec![rec]).unwrap();

        let dataset = report.dataset("s01").unwrap();
        assert!(dataset.rejected);
        assert!(dataset.streams.is_empty());
        assert!(report
            .failures
            .iter()
            .any(|f| f.stream.is_none() && f.error.contains("do not overlap")));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut cfg = config(None);
        cfg.trigger_stages.reverse();
        assert!(EpochRunner::new(cfg).is_err());
    }

    #[test]
    fn test_run_reports_broken_streams_and_results() {
        let runner = EpochRunner::new(config(Some(1))).unwrap();
        let report = runner.run(vec![recording("s01")]).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stream.as_deref(), Some("broken"));

        let dataset = report.dataset("s01").unwrap();
        assert!(!dataset.rejected);
        let pupil = dataset.stream("pupil").unwrap();
        assert_eq!(pupil.triggers.len(), 2);
        assert_eq!(pupil.trigger("go").unwrap().trials.len(), 2);
        assert_eq!(pupil.trigger("stop").unwrap().trials.len(), 1);
        assert!(pupil.trigger("blink").is_none());
        assert!(!report.id.is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = EpochRunner::new(config(Some(1)))
            .unwrap()
            .run(vec![recording("a"), recording("b")])
            .unwrap();
        let parallel = EpochRunner::new(config(Some(16)))
            .unwrap()
            .run(vec![recording("a"), recording("b")])
            .unwrap();

        assert_eq!(sequential.trial_count(), parallel.trial_count());
        for (s, p) in sequential.datasets.iter().zip(&parallel.datasets) {
            assert_eq!(s.name, p.name);
            let st = s.stream("pupil").unwrap().trigger("go").unwrap();
            let pt = p.stream("pupil").unwrap().trigger("go").unwrap();
            assert_eq!(
                st.matrix(View::PercentChange, true),
                pt.matrix(View::PercentChange, true)
            );
        }
    }
}
