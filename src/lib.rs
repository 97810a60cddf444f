//! # Scan Station
//!
//! Control core for an unattended scanning spectrometer station.
//!
//! During a configured daily window the station repeatedly homes a stepper
//! positioner, takes a dark reading, sweeps a fixed set of positions reading
//! an intensity sensor at each, persists the dataset and hands it to a
//! bounded pool of analysis workers. Outside the window it idles.
//!
//! ## Key Pieces
//!
//! - **PositionController**: step counting, persisted position, home-switch homing
//! - **ScanAcquirer**: the fixed dark-plus-sweep protocol
//! - **JobDispatcher**: admission-controlled analysis workers; a busy pool rejects, never queues
//! - **ControlLoop**: schedule gate and the perpetual acquire/dispatch cycle
//! - **StatusReporter**: heartbeat file for remote monitoring
//!
//! Devices are capability traits ([`crate::core::PositionerDevice`],
//! [`crate::core::SensorDevice`], [`crate::core::LocationTimeSource`]) so the loop runs the
//! same against hardware, [`infra::simulated`] devices or test fakes.
//!
//! ```rust,ignore
//! use scan_station::builders::StationBuilder;
//! use scan_station::config::StationConfig;
//! use scan_station::infra::analysis_process::LogOnlyExecutor;
//! use scan_station::infra::simulated::{SimulatedPositioner, SimulatedSensor, SystemClockSource};
//!
//! let config = StationConfig::from_json_file("station.json")?;
//! let mut station = StationBuilder::new(&config).build(
//!     SimulatedPositioner::default(),
//!     SimulatedSensor::default(),
//!     SystemClockSource::default(),
//!     LogOnlyExecutor,
//! )?;
//! station.run()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Station domain: positioning, acquisition, scheduling and dispatch.
pub mod core;
/// Configuration models for the station and its workers.
pub mod config;
/// Builders to assemble a station from configuration.
pub mod builders;
/// Infrastructure adapters: stores, executors and simulated devices.
pub mod infra;
/// Shared utilities.
pub mod util;
