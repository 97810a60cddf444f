//! Station domain: positioning, acquisition, scheduling and analysis dispatch.

pub mod acquisition;
pub mod control_loop;
pub mod dispatcher;
pub mod error;
pub mod positioner;
pub mod schedule;
pub mod status;
pub mod time_convert;

pub use acquisition::{
    AcquiredScan, ArtifactStore, LocationFix, LocationTimeSource, ScanAcquirer, ScanDataset, ScanSample,
    SensorDevice, StationContext, ROW_HEADER_LEN,
};
pub use control_loop::{ControlLoop, IterationOutcome, LoopSettings, StationRig};
pub use dispatcher::{
    AnalysisContext, AnalysisExecutor, AnalysisJob, AnalysisReport, DispatchStats, JobCompletion, JobDispatcher,
    JobHandle,
};
pub use error::{
    AnalysisError, AppResult, DeviceError, DispatchRejected, ScanError, StationError, StoreError, TimeError,
};
pub use positioner::{
    Direction, HomingState, PositionController, PositionStore, PositionerDevice, PositionerState, StepMode,
};
pub use schedule::{should_scan, ScheduleWindow};
pub use status::{StationPhase, StationStatus, StatusBoard, StatusReporter};
pub use time_convert::{
    from_fractional, from_fractional_seq, to_fractional, ClockTime, Fractional, FractionalTime, OutputFormat,
    TimeUnit,
};
