//! Top-level station driver.
//!
//! Every iteration reads the fix, checks the daily window and either
//! acquires one scan and hands it to the dispatcher, or sleeps. Scans are
//! strictly sequential; analysis overlaps with the next acquisition.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::core::acquisition::{ArtifactStore, LocationTimeSource, ScanAcquirer, SensorDevice, StationContext};
use crate::core::dispatcher::{AnalysisContext, AnalysisExecutor, AnalysisJob, JobCompletion, JobDispatcher, JobHandle};
use crate::core::error::{DispatchRejected, ScanError, StationError};
use crate::core::positioner::{PositionController, PositionerDevice};
use crate::core::schedule::{should_scan, ScheduleWindow};
use crate::core::status::{StationPhase, StatusBoard};
use crate::core::time_convert::{to_fractional, ClockTime, TimeUnit};
use crate::util::clock::Sleeper;

/// What one iteration did.
#[derive(Debug)]
pub enum IterationOutcome {
    /// Outside the window; slept for the idle interval.
    Idle {
        /// Fractional hour that was evaluated.
        fraction: f64,
    },
    /// A scan was acquired and persisted.
    Scanned {
        /// Number assigned to the scan.
        scan_no: u64,
        /// Artifact locator.
        locator: PathBuf,
        /// Dispatch outcome; a rejection leaves the scan unanalysed on disk.
        dispatch: Result<JobHandle, DispatchRejected>,
    },
    /// The scan was aborted; the loop carries on.
    ScanFailed {
        /// Number the scan would have had.
        scan_no: u64,
        /// Why it was aborted.
        error: ScanError,
    },
}

/// Devices and stores a station runs against.
pub struct StationRig<D, S, L>
where
    D: PositionerDevice,
    S: SensorDevice,
    L: LocationTimeSource,
{
    /// Positioner with its persisted state.
    pub controller: PositionController<D>,
    /// Intensity sensor.
    pub sensor: S,
    /// Geolocation and time source.
    pub location: L,
    /// Dataset store.
    pub artifacts: Box<dyn ArtifactStore>,
}

/// Loop timing and limits.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Station identity.
    pub station_name: String,
    /// Daily operating window.
    pub window: ScheduleWindow,
    /// Sleep outside the window.
    pub idle_interval: Duration,
    /// Consecutive homing failures treated as a stall.
    pub max_homing_failures: u32,
}

/// The perpetual station loop.
pub struct ControlLoop<D, S, L, E>
where
    D: PositionerDevice,
    S: SensorDevice,
    L: LocationTimeSource,
    E: AnalysisExecutor,
{
    settings: LoopSettings,
    rig: StationRig<D, S, L>,
    acquirer: ScanAcquirer,
    dispatcher: JobDispatcher<E>,
    analysis: Arc<AnalysisContext>,
    sleeper: Arc<dyn Sleeper>,
    status: StatusBoard,
    scan_no: u64,
    homing_failures: u32,
}

impl<D, S, L, E> ControlLoop<D, S, L, E>
where
    D: PositionerDevice,
    S: SensorDevice,
    L: LocationTimeSource,
    E: AnalysisExecutor,
{
    /// Assemble a loop from its parts. See `builders::StationBuilder` for
    /// construction from configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: LoopSettings,
        rig: StationRig<D, S, L>,
        acquirer: ScanAcquirer,
        dispatcher: JobDispatcher<E>,
        analysis: Arc<AnalysisContext>,
        sleeper: Arc<dyn Sleeper>,
        status: StatusBoard,
    ) -> Self {
        Self {
            settings,
            rig,
            acquirer,
            dispatcher,
            analysis,
            sleeper,
            status,
            scan_no: 0,
            homing_failures: 0,
        }
    }

    /// Number the next scan will get.
    #[must_use]
    pub const fn scan_no(&self) -> u64 {
        self.scan_no
    }

    /// The positioner controller.
    pub const fn controller(&self) -> &PositionController<D> {
        &self.rig.controller
    }

    /// The analysis dispatcher.
    pub const fn dispatcher(&self) -> &JobDispatcher<E> {
        &self.dispatcher
    }

    /// Shared status snapshot.
    #[must_use]
    pub fn status_board(&self) -> StatusBoard {
        Arc::clone(&self.status)
    }

    /// Run until a fatal error.
    ///
    /// # Errors
    ///
    /// Returns the fatal `StationError` that stopped the station.
    pub fn run(&mut self) -> Result<Infallible, StationError> {
        info!(
            station = %self.settings.station_name,
            start = self.settings.window.start_fraction,
            stop = self.settings.window.stop_fraction,
            "Station loop starting"
        );
        loop {
            self.run_iteration()?;
        }
    }

    /// Run one iteration of the loop.
    ///
    /// # Errors
    ///
    /// Returns `StationError::HomingStalled` once homing has failed on
    /// `max_homing_failures` consecutive scans.
    pub fn run_iteration(&mut self) -> Result<IterationOutcome, StationError> {
        self.dispatcher.reap();

        let fix = self.rig.location.read();
        let fraction = to_fractional(&ClockTime::from(&fix.timestamp), TimeUnit::Hours);
        if let Err(e) = self.rig.artifacts.prepare_day(fix.timestamp.date_naive()) {
            warn!(error = %e, "Could not prepare results directories");
        }

        if !should_scan(fraction, &self.settings.window) {
            self.publish(StationPhase::Idle);
            info!(fraction, "Station sleeping");
            self.sleeper.sleep(self.settings.idle_interval);
            return Ok(IterationOutcome::Idle { fraction });
        }

        let scan_no = self.scan_no;
        info!(scan_no, "Begin scan");
        self.publish(StationPhase::Scanning);

        let ctx = StationContext {
            station_name: self.settings.station_name.clone(),
            scan_no,
        };
        let result = self.acquirer.acquire(
            &mut self.rig.controller,
            &mut self.rig.sensor,
            &mut self.rig.location,
            self.rig.artifacts.as_mut(),
            &ctx,
        );

        match result {
            Ok(scan) => {
                self.homing_failures = 0;
                self.scan_no += 1;
                let locator = scan.locator.clone();
                let finished_at = scan.dataset.start_time;

                let dispatch = self.dispatcher.submit(AnalysisJob::new(scan, Arc::clone(&self.analysis)));
                if let Err(e) = &dispatch {
                    warn!(scan_no, error = %e, "Scan {scan_no} not analysed");
                }

                self.status.write().last_scan_at = Some(finished_at);
                self.publish(StationPhase::Idle);
                Ok(IterationOutcome::Scanned {
                    scan_no,
                    locator,
                    dispatch,
                })
            }
            Err(ScanError::HomingFailed(e)) => {
                self.homing_failures += 1;
                error!(scan_no, attempts = self.homing_failures, error = %e, "Homing failed, scan skipped");
                if self.homing_failures >= self.settings.max_homing_failures {
                    self.publish(StationPhase::Stopped);
                    return Err(StationError::HomingStalled {
                        attempts: self.homing_failures,
                        last: e,
                    });
                }
                Ok(IterationOutcome::ScanFailed {
                    scan_no,
                    error: ScanError::HomingFailed(e),
                })
            }
            Err(e) => {
                error!(scan_no, error = %e, "Scan aborted");
                Ok(IterationOutcome::ScanFailed { scan_no, error: e })
            }
        }
    }

    /// Wait up to `timeout` for in-flight analyses, then stop the workers.
    pub fn shutdown(&mut self, timeout: Duration) -> Vec<JobCompletion> {
        let done = self.dispatcher.drain(timeout);
        self.dispatcher.shutdown();
        self.publish(StationPhase::Stopped);
        done
    }

    fn publish(&self, phase: StationPhase) {
        let state = self.rig.controller.state();
        let mut status = self.status.write();
        status.phase = phase;
        status.scan_no = self.scan_no;
        status.position = state.position;
        status.homed = state.homed;
        status.active_jobs = self.dispatcher.active_count();
        status.updated_at = Utc::now();
    }
}
