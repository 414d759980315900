use thiserror::Error;

#[derive(Error, Debug)]
pub enum EpochError {
    #[error("Marker at {marker_time} is outside the stream range [{first}, {last}]")]
    MarkerNotFound {
        marker_time: f64,
        first: f64,
        last: f64,
    },

    #[error("Cannot resolve boundary at {ideal_timestamp}: {reason}")]
    BoundaryUnresolvable { ideal_timestamp: f64, reason: String },

    #[error("Trials do not have matching durations: got {got}, expected {expected}")]
    DurationMismatch { got: f64, expected: f64 },

    #[error("Invalid baseline range [{start}, {end}] for trial duration {duration}: {reason}")]
    BaselineRangeInvalid {
        start: f64,
        end: f64,
        duration: f64,
        reason: String,
    },

    #[error("Baseline mean is zero or undefined for trial {0}")]
    UndefinedBaselineMean(usize),

    #[error("Stream is empty")]
    EmptyStream,

    #[error("Stream has {data} data points but {timestamps} timestamps")]
    MismatchedLengths { data: usize, timestamps: usize },

    #[error("Timestamps are not strictly increasing at index {0}")]
    UnorderedTimestamps(usize),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown processor '{name}'. Known processors: {known}")]
    UnknownProcessor { name: String, known: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl EpochError {
    /// Whether the error only affects a single marker or trial.
    ///
    /// Recoverable errors are logged and skipped; everything else stops the
    /// enclosing stream or trigger.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EpochError::MarkerNotFound { .. }
                | EpochError::BoundaryUnresolvable { .. }
                | EpochError::UndefinedBaselineMean(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EpochError>;
