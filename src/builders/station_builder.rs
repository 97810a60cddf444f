//! Build a [`ControlLoop`] from a validated [`StationConfig`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::info;

use crate::config::StationConfig;
use crate::core::{
    AnalysisContext, AnalysisExecutor, ArtifactStore, ControlLoop, JobDispatcher, LocationTimeSource, LoopSettings,
    PositionController, PositionStore, PositionerDevice, ScanAcquirer, ScheduleWindow, SensorDevice, StationError,
    StationRig, StationStatus, StatusBoard,
};
use crate::infra::artifact_store::FsArtifactStore;
use crate::infra::position_store::FilePositionStore;
use crate::util::clock::{Sleeper, ThreadSleeper};

/// Wires devices, stores and the analysis executor into a station loop.
///
/// Stores default to the filesystem paths in the configuration; tests swap
/// in memory-backed ones.
pub struct StationBuilder<'a> {
    config: &'a StationConfig,
    sleeper: Arc<dyn Sleeper>,
    position_store: Option<Box<dyn PositionStore>>,
    artifacts: Option<Box<dyn ArtifactStore>>,
    status: Option<StatusBoard>,
}

impl<'a> StationBuilder<'a> {
    /// Start a builder for `config`.
    #[must_use]
    pub fn new(config: &'a StationConfig) -> Self {
        Self {
            config,
            sleeper: Arc::new(ThreadSleeper),
            position_store: None,
            artifacts: None,
            status: None,
        }
    }

    /// Use `sleeper` for settle and idle delays.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Use `store` instead of the configured position file.
    #[must_use]
    pub fn with_position_store(mut self, store: Box<dyn PositionStore>) -> Self {
        self.position_store = Some(store);
        self
    }

    /// Use `store` instead of the configured results tree.
    #[must_use]
    pub fn with_artifact_store(mut self, store: Box<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(store);
        self
    }

    /// Publish status into an existing board.
    #[must_use]
    pub fn with_status_board(mut self, board: StatusBoard) -> Self {
        self.status = Some(board);
        self
    }

    /// Validate the configuration, check the sensor and assemble the loop.
    ///
    /// # Errors
    ///
    /// - `StationError::Config` if the configuration is invalid
    /// - `StationError::DeviceUnavailable` if the sensor does not answer
    /// - `StationError::Store` if the position file cannot be opened
    /// - `StationError::Dispatcher` if analysis workers cannot start
    pub fn build<D, S, L, E>(
        self,
        positioner: D,
        mut sensor: S,
        location: L,
        executor: E,
    ) -> Result<ControlLoop<D, S, L, E>, StationError>
    where
        D: PositionerDevice,
        S: SensorDevice,
        L: LocationTimeSource,
        E: AnalysisExecutor,
    {
        let cfg = self.config;
        cfg.validate().map_err(StationError::Config)?;
        let window = ScheduleWindow::new(cfg.start_time, cfg.stop_time).map_err(StationError::Config)?;

        let serial = sensor.serial_number().map_err(StationError::DeviceUnavailable)?;
        sensor
            .set_integration_time(cfg.integration_time_us)
            .map_err(StationError::DeviceUnavailable)?;
        info!(
            serial = %serial,
            channels = sensor.channel_count(),
            integration_time_us = cfg.integration_time_us,
            "Sensor connected"
        );

        let position_store: Box<dyn PositionStore> = match self.position_store {
            Some(store) => store,
            None => Box::new(FilePositionStore::new(&cfg.position_file)?),
        };
        let artifacts: Box<dyn ArtifactStore> = match self.artifacts {
            Some(store) => store,
            None => Box::new(FsArtifactStore::new(&cfg.results_root)),
        };

        let controller = PositionController::new(positioner, position_store, Arc::clone(&self.sleeper), &cfg.homing);
        let dispatcher = JobDispatcher::new(&cfg.dispatch, executor)?;
        let status = self
            .status
            .unwrap_or_else(|| Arc::new(RwLock::new(StationStatus::new(cfg.station_name.clone()))));

        let settings = LoopSettings {
            station_name: cfg.station_name.clone(),
            window,
            idle_interval: Duration::from_secs(cfg.idle_interval_secs),
            max_homing_failures: cfg.homing.max_consecutive_failures,
        };

        info!(station = %cfg.station_name, capacity = cfg.dispatch.capacity, "Station assembled");

        Ok(ControlLoop::new(
            settings,
            StationRig {
                controller,
                sensor,
                location,
                artifacts,
            },
            ScanAcquirer::new(&cfg.scan),
            dispatcher,
            Arc::new(AnalysisContext::from_config(cfg)),
            self.sleeper,
            status,
        ))
    }
}
