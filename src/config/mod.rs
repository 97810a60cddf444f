//! Configuration models for the station, its scan geometry and analysis workers.

pub mod station;

pub use station::{AnalysisConfig, DispatchConfig, HomingConfig, ScanConfig, StationConfig};
