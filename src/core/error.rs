//! Error types for station operations.

use std::path::PathBuf;

use thiserror::Error;

/// Actuator, sensor or location-source I/O failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// The device is not connected or stopped answering.
    #[error("device disconnected: {0}")]
    Disconnected(String),
    /// The device answered but reported a fault.
    #[error("device fault: {0}")]
    Fault(String),
}

/// Reasons a single scan was aborted.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Homing could not be confirmed.
    #[error("homing failed: {0}")]
    HomingFailed(#[source] DeviceError),
    /// The positioner failed while moving through the sweep.
    #[error("actuator failed at step {step_no}: {source}")]
    Actuator {
        /// Sweep step at which the move failed (0 = move to sweep start).
        step_no: u32,
        /// Underlying device error.
        #[source]
        source: DeviceError,
    },
    /// The dataset could not be written to the artifact store.
    #[error("failed to persist scan: {0}")]
    Persist(#[from] StoreError),
}

/// A job submission refused by the dispatcher. Never queued.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchRejected {
    /// All analysis slots are busy.
    #[error("dispatch ceiling reached: {active} of {capacity} jobs active")]
    AtCapacity {
        /// Jobs in flight after reaping.
        active: usize,
        /// Configured ceiling.
        capacity: usize,
    },
    /// The dispatcher has been shut down.
    #[error("dispatcher has been shut down")]
    Shutdown,
}

/// Time-conversion errors. These indicate programmer or config mistakes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TimeError {
    /// Unit other than decimal hours or decimal days.
    #[error("unsupported time unit `{0}`; expected `decimal hours` or `decimal days`")]
    InvalidUnit(String),
    /// Output format other than clock or text.
    #[error("unsupported output format `{0}`; expected `datetime` or `hms`")]
    InvalidOutputFormat(String),
    /// The value does not map onto a time of day.
    #[error("value {0} is outside a single day")]
    OutOfRange(f64),
    /// Clock text could not be parsed.
    #[error("cannot parse clock time `{0}`")]
    InvalidClock(String),
}

/// Durable storage failures (position file, dataset artifacts, status file).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Stored content could not be decoded.
    #[error("corrupt data at {path}: {reason}")]
    Corrupt {
        /// Path being decoded.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
    /// Serialization failure.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure reported by an analysis job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// The analysis process could not be started.
    #[error("failed to launch analysis: {0}")]
    Launch(String),
    /// The analysis process exited unsuccessfully.
    #[error("analysis exited with status {code:?}: {stderr}")]
    Exited {
        /// Exit code, if any.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// The job body panicked.
    #[error("analysis panicked: {0}")]
    Panicked(String),
    /// Any other failure reported by the executor.
    #[error("analysis failed: {0}")]
    Failed(String),
}

/// Unrecoverable conditions that stop the station.
#[derive(Debug, Error)]
pub enum StationError {
    /// A required device is missing at startup.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(#[source] DeviceError),
    /// Homing failed on too many consecutive scans.
    #[error("homing stalled after {attempts} consecutive failures")]
    HomingStalled {
        /// Consecutive failed homing attempts.
        attempts: u32,
        /// Last homing error.
        #[source]
        last: DeviceError,
    },
    /// Configuration rejected during validation.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Analysis workers could not be started.
    #[error("dispatcher setup failed: {0}")]
    Dispatcher(String),
    /// Durable storage could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
