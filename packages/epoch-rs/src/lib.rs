pub mod alignment;
pub mod boundary;
pub mod config;
pub mod container;
pub mod error;
pub mod extractor;
pub mod interp;
pub mod processing;
pub mod profiling;
pub mod recording;
pub mod runner;
pub mod segmenter;
pub mod sync;
pub mod types;

pub use alignment::{align, MarkerScan, ScanEvent};
pub use boundary::resolve_boundary;
pub use config::{Override, PipelineConfig, StreamSync, TriggerConfig};
pub use container::{Dataset, Datastream, RunReport, Trial, Trigger, TriggerAudit, UnitFailure};
pub use error::{EpochError, Result};
pub use extractor::extract_trial;
pub use interp::linear_approx;
pub use processing::{ProcessorInfo, ProcessorKind, ProcessorSpec, TrialFilter, TriggerStage};
pub use recording::{Recording, StreamRecord};
pub use runner::{EpochRunner, WorkerPlan};
pub use segmenter::Segmenter;
pub use sync::sync_streams;
pub use types::*;
