//! JSON recording format: named streams plus the recording's event markers.
//!
//! ```json
//! {
//!   "name": "s01",
//!   "streams": {
//!     "pupil": { "data": [...], "timestamps": [...], "sample_rate": 60.0 }
//!   },
//!   "markers": { "eventnames": ["go", ...], "timestamps": [12.5, ...] }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EpochError, Result};
use crate::types::{MarkerSet, SignalStream};

/// A stream as stored on disk, not yet validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRecord {
    pub data: Vec<f64>,
    pub timestamps: Vec<f64>,
    /// Estimated from the timestamps when absent
    #[serde(default)]
    pub sample_rate: Option<f64>,
}

impl StreamRecord {
    pub fn into_signal(self) -> Result<SignalStream> {
        match self.sample_rate {
            Some(rate) => SignalStream::new(self.data, self.timestamps, rate),
            None => SignalStream::with_estimated_rate(self.data, self.timestamps),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    #[serde(default)]
    pub name: String,
    pub streams: BTreeMap<String, StreamRecord>,
    #[serde(default)]
    pub markers: MarkerSet,
}

impl Recording {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let recording: Recording = serde_json::from_str(json)?;
        if recording.markers.eventnames.len() != recording.markers.timestamps.len() {
            return Err(EpochError::MismatchedLengths {
                data: recording.markers.eventnames.len(),
                timestamps: recording.markers.timestamps.len(),
            });
        }
        Ok(recording)
    }

    /// Read a recording file. An unnamed recording takes the file stem as its name.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut recording = Self::from_json_str(&content)?;
        if recording.name.is_empty() {
            recording.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "recording".to_string());
        }
        log::info!(
            "Loaded recording '{}' with {} streams and {} markers",
            recording.name,
            recording.streams.len(),
            recording.markers.timestamps.len()
        );
        Ok(recording)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "name": "s01",
        "streams": {
            "pupil": {"data": [1, 2, 3], "timestamps": [0.0, 0.5, 1.0], "sample_rate": 2.0},
            "gaze": {"data": [1, 2], "timestamps": [0.0, 2.0]}
        },
        "markers": {"eventnames": ["go"], "timestamps": [0.4]}
    }"#;

    #[test]
    fn test_parse_recording() {
        let rec = Recording::from_json_str(SAMPLE).unwrap();
        assert_eq!(rec.name, "s01");
        assert_eq!(rec.streams.len(), 2);
        assert_eq!(rec.markers.times_for("go"), vec![0.4]);

        let gaze = rec.streams["gaze"].clone().into_signal().unwrap();
        assert!((gaze.sample_rate() - 1.0).abs() < 1e-12);
        let pupil = rec.streams["pupil"].clone().into_signal().unwrap();
        assert_eq!(pupil.sample_rate(), 2.0);
    }

    #[test]
    fn test_mismatched_markers_rejected() {
        let json = r#"{"streams": {}, "markers": {"eventnames": ["a", "b"], "timestamps": [1.0]}}"#;
        assert!(matches!(
            Recording::from_json_str(json),
            Err(EpochError::MismatchedLengths { .. })
        ));
    }

    #[test]
    fn test_load_uses_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subject7.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, r#"{{"streams": {{}}}}"#).unwrap();

        let rec = Recording::load(&path).unwrap();
        assert_eq!(rec.name, "subject7");
        assert!(rec.markers.eventnames.is_empty());
    }
}
