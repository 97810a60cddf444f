//! Scan acquisition: one dark reading followed by a fixed positional sweep.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::core::error::{DeviceError, ScanError, StoreError};
use crate::core::positioner::{Direction, PositionController, PositionerDevice, StepMode};
use crate::core::time_convert::ClockTime;

/// Number of metadata columns preceding the sensor values in a payload row.
pub const ROW_HEADER_LEN: usize = 7;

/// Intensity sensor capability.
pub trait SensorDevice: Send {
    /// Read one spectrum.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` when the read fails.
    fn read_intensities(&mut self) -> Result<Vec<f64>, DeviceError>;

    /// Number of values in every reading.
    fn channel_count(&self) -> usize;

    /// Device serial number; doubles as a presence check at startup.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` when the device is not answering.
    fn serial_number(&self) -> Result<String, DeviceError>;

    /// Set the integration time in microseconds.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` when the device rejects the setting.
    fn set_integration_time(&mut self, micros: u64) -> Result<(), DeviceError>;
}

/// One reading of the geolocation and time source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
    /// Metres above sea level.
    pub altitude: f64,
    /// UTC time of the fix.
    pub timestamp: DateTime<Utc>,
}

/// Geolocation and time capability.
pub trait LocationTimeSource: Send {
    /// Current position and time.
    fn read(&mut self) -> LocationFix;
}

/// Durable store for scan datasets, keyed by station, date and scan number.
pub trait ArtifactStore: Send {
    /// Make sure the dated output tree for `date` exists.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the directories cannot be created.
    fn prepare_day(&mut self, date: NaiveDate) -> Result<(), StoreError>;

    /// Persist a dataset and return its locator.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the write fails.
    fn save(&mut self, dataset: &ScanDataset) -> Result<PathBuf, StoreError>;
}

/// One row of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSample {
    /// 0 for the dark reading, 1..=N for positional readings.
    pub index: u32,
    /// Clock at acquisition; `None` for the dark reading.
    pub clock: Option<ClockTime>,
    /// Positioner step count when the reading was taken.
    pub positioner_reading: i64,
    /// Reserved for calibration metadata; always 0.
    pub coadds: u32,
    /// Reserved for calibration metadata; always 0.
    pub integration_time: f64,
    /// Sensor values, one per channel.
    pub sensor_values: Vec<f64>,
    /// Set when the sensor read failed and `sensor_values` is zero-filled.
    #[serde(default)]
    pub read_failed: bool,
}

impl ScanSample {
    /// Payload row: `[index, hour, minute, second, position, coadds, integration_time, values...]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_row(&self) -> Vec<f64> {
        let clock = self.clock.unwrap_or_default();
        let mut row = Vec::with_capacity(ROW_HEADER_LEN + self.sensor_values.len());
        row.extend([
            f64::from(self.index),
            f64::from(clock.hour),
            f64::from(clock.minute),
            f64::from(clock.second),
            self.positioner_reading as f64,
            f64::from(self.coadds),
            self.integration_time,
        ]);
        row.extend_from_slice(&self.sensor_values);
        row
    }
}

/// The dataset produced by one scan. Dark sample first, then positional order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDataset {
    /// Station that produced the scan.
    pub station_id: String,
    /// Clock of the last positional reading, whole seconds.
    pub start_time: DateTime<Utc>,
    /// Scan number within this process lifetime.
    pub scan_sequence_no: u64,
    /// Last location fix taken during the sweep.
    pub location: LocationFix,
    /// Dark sample followed by the positional samples.
    pub samples: Vec<ScanSample>,
}

impl ScanDataset {
    /// The dark reading.
    #[must_use]
    pub fn dark(&self) -> Option<&ScanSample> {
        self.samples.first()
    }

    /// The positional readings.
    #[must_use]
    pub fn positional(&self) -> &[ScanSample] {
        self.samples.get(1..).unwrap_or_default()
    }

    /// Number of zero-filled samples.
    #[must_use]
    pub fn failed_reads(&self) -> usize {
        self.samples.iter().filter(|s| s.read_failed).count()
    }

    /// Numeric payload, one row per sample.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.samples.iter().map(ScanSample::to_row).collect()
    }
}

/// Per-scan station identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationContext {
    /// Station name used in logs and artifact names.
    pub station_name: String,
    /// Number assigned to the scan being acquired.
    pub scan_no: u64,
}

/// A persisted scan.
#[derive(Debug, Clone)]
pub struct AcquiredScan {
    /// Where the artifact store put the dataset.
    pub locator: PathBuf,
    /// The dataset itself.
    pub dataset: ScanDataset,
}

/// Runs the fixed scan protocol.
#[derive(Debug, Clone)]
pub struct ScanAcquirer {
    start_offset: u32,
    positions: u32,
    step_increment: u32,
    step_mode: StepMode,
}

impl ScanAcquirer {
    /// Build an acquirer from the scan geometry.
    #[must_use]
    pub const fn new(scan: &ScanConfig) -> Self {
        Self {
            start_offset: scan.start_offset,
            positions: scan.positions,
            step_increment: scan.step_increment,
            step_mode: scan.step_mode,
        }
    }

    /// Samples per scan, dark included.
    #[must_use]
    pub const fn sample_count(&self) -> usize {
        self.positions as usize + 1
    }

    /// Acquire one scan and persist it.
    ///
    /// Sensor failures are zero-filled so the dataset always holds
    /// `positions + 1` samples.
    ///
    /// # Errors
    ///
    /// - `ScanError::HomingFailed` if homing fails
    /// - `ScanError::Actuator` if a sweep move fails
    /// - `ScanError::Persist` if the artifact store rejects the dataset
    pub fn acquire<D, S, L>(
        &self,
        controller: &mut PositionController<D>,
        sensor: &mut S,
        location: &mut L,
        store: &mut dyn ArtifactStore,
        ctx: &StationContext,
    ) -> Result<AcquiredScan, ScanError>
    where
        D: PositionerDevice,
        S: SensorDevice + ?Sized,
        L: LocationTimeSource + ?Sized,
    {
        let scan_no = ctx.scan_no;
        controller.home().map_err(ScanError::HomingFailed)?;

        let mut samples = Vec::with_capacity(self.sample_count());
        let (dark, read_failed) = read_or_zero(sensor, scan_no, 0);
        samples.push(ScanSample {
            index: 0,
            clock: None,
            positioner_reading: controller.position(),
            coadds: 0,
            integration_time: 0.0,
            sensor_values: dark,
            read_failed,
        });

        info!(scan_no, "Moving to start position");
        controller
            .step(self.start_offset, Direction::Forward, self.step_mode)
            .map_err(|source| ScanError::Actuator { step_no: 0, source })?;

        let mut last_fix = None;
        for step_no in 1..=self.positions {
            let (values, read_failed) = read_or_zero(sensor, scan_no, step_no);
            let fix = location.read();
            let clock = ClockTime::from(&fix.timestamp);
            samples.push(ScanSample {
                index: step_no,
                clock: Some(ClockTime::hms(clock.hour, clock.minute, clock.second)),
                positioner_reading: controller.position(),
                coadds: 0,
                integration_time: 0.0,
                sensor_values: values,
                read_failed,
            });
            last_fix = Some(fix);

            controller
                .step(self.step_increment, Direction::Forward, self.step_mode)
                .map_err(|source| ScanError::Actuator { step_no, source })?;
        }

        let last_fix = last_fix.unwrap_or_else(|| location.read());
        let dataset = ScanDataset {
            station_id: ctx.station_name.clone(),
            start_time: last_fix.timestamp.trunc_subsecs(0),
            scan_sequence_no: scan_no,
            location: last_fix,
            samples,
        };
        info!(scan_no, failed_reads = dataset.failed_reads(), "Scan complete");

        let locator = store.save(&dataset)?;
        Ok(AcquiredScan { locator, dataset })
    }
}

fn read_or_zero<S: SensorDevice + ?Sized>(sensor: &mut S, scan_no: u64, step_no: u32) -> (Vec<f64>, bool) {
    match sensor.read_intensities() {
        Ok(values) => (values, false),
        Err(e) => {
            warn!(scan_no, step_no, error = %e, "Sensor read failed, zero-filling sample");
            (vec![0.0; sensor.channel_count()], true)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::config::HomingConfig;
    use crate::infra::artifact_store::InMemoryArtifactStore;
    use crate::infra::position_store::InMemoryPositionStore;
    use crate::util::clock::RecordingSleeper;

    /// Sits on the home switch; pulses fail from `fail_from` onwards.
    struct ParkedPositioner {
        pulses: usize,
        fail_from: Option<usize>,
    }

    impl PositionerDevice for ParkedPositioner {
        fn pulse(&mut self, _direction: Direction, _mode: StepMode) -> Result<(), DeviceError> {
            if self.fail_from.is_some_and(|n| self.pulses >= n) {
                return Err(DeviceError::Disconnected("motor hat".into()));
            }
            self.pulses += 1;
            Ok(())
        }

        fn read_home_switch(&mut self) -> bool {
            true
        }
    }

    struct FakeSensor {
        channels: usize,
        reads: u32,
        fail: fn(u32) -> bool,
    }

    impl SensorDevice for FakeSensor {
        fn read_intensities(&mut self) -> Result<Vec<f64>, DeviceError> {
            let n = self.reads;
            self.reads += 1;
            if (self.fail)(n) {
                return Err(DeviceError::Fault("usb timeout".into()));
            }
            Ok(vec![f64::from(n) + 1.0; self.channels])
        }

        fn channel_count(&self) -> usize {
            self.channels
        }

        fn serial_number(&self) -> Result<String, DeviceError> {
            Ok("FAKE0001".into())
        }

        fn set_integration_time(&mut self, _micros: u64) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    /// Advances one second per read.
    struct TickingGps {
        next: DateTime<Utc>,
    }

    impl LocationTimeSource for TickingGps {
        fn read(&mut self) -> LocationFix {
            let fix = LocationFix {
                latitude: 14.38,
                longitude: -90.6,
                altitude: 2500.0,
                timestamp: self.next,
            };
            self.next += chrono::Duration::seconds(1);
            fix
        }
    }

    fn controller(fail_from: Option<usize>) -> PositionController<ParkedPositioner> {
        PositionController::new(
            ParkedPositioner { pulses: 0, fail_from },
            Box::new(InMemoryPositionStore::new()),
            Arc::new(RecordingSleeper::new()),
            &HomingConfig::default(),
        )
    }

    fn gps() -> TickingGps {
        TickingGps {
            next: Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap(),
        }
    }

    fn ctx(scan_no: u64) -> StationContext {
        StationContext {
            station_name: "TEST".into(),
            scan_no,
        }
    }

    #[test]
    fn scan_has_dark_plus_positional_samples() {
        let acquirer = ScanAcquirer::new(&ScanConfig::default());
        let mut ctrl = controller(None);
        let mut sensor = FakeSensor { channels: 8, reads: 0, fail: |_| false };
        let mut store = InMemoryArtifactStore::new();

        let scan = acquirer
            .acquire(&mut ctrl, &mut sensor, &mut gps(), &mut store, &ctx(7))
            .unwrap();
        let ds = &scan.dataset;

        assert_eq!(ds.samples.len(), 101);
        assert_eq!(ds.scan_sequence_no, 7);
        let dark = ds.dark().unwrap();
        assert_eq!(dark.index, 0);
        assert_eq!(dark.clock, None);
        assert_eq!(dark.positioner_reading, 0);
        assert_eq!(dark.sensor_values, vec![1.0; 8]);

        for (i, sample) in ds.positional().iter().enumerate() {
            let step_no = i as i64 + 1;
            assert_eq!(i64::from(sample.index), step_no);
            assert_eq!(sample.positioner_reading, 50 + 2 * (step_no - 1));
            assert_eq!(sample.coadds, 0);
        }
        assert_eq!(ctrl.position(), 250);
        assert_eq!(store.saved().len(), 1);
    }

    #[test]
    fn start_time_comes_from_last_reading() {
        let acquirer = ScanAcquirer::new(&ScanConfig::default());
        let mut ctrl = controller(None);
        let mut sensor = FakeSensor { channels: 2, reads: 0, fail: |_| false };
        let mut store = InMemoryArtifactStore::new();

        let scan = acquirer
            .acquire(&mut ctrl, &mut sensor, &mut gps(), &mut store, &ctx(0))
            .unwrap();

        // 100 reads starting at 10:00:00 -> the last one is 10:01:39.
        let expected = Utc.with_ymd_and_hms(2024, 3, 9, 10, 1, 39).unwrap();
        assert_eq!(scan.dataset.start_time, expected);
        let last = scan.dataset.samples.last().unwrap();
        assert_eq!(last.clock, Some(ClockTime::hms(10, 1, 39)));
    }

    #[test]
    fn failed_reads_are_zero_filled_not_dropped() {
        let acquirer = ScanAcquirer::new(&ScanConfig::default());
        let mut ctrl = controller(None);
        let mut sensor = FakeSensor { channels: 4, reads: 0, fail: |_| true };
        let mut store = InMemoryArtifactStore::new();

        let scan = acquirer
            .acquire(&mut ctrl, &mut sensor, &mut gps(), &mut store, &ctx(1))
            .unwrap();

        assert_eq!(scan.dataset.samples.len(), 101);
        assert_eq!(scan.dataset.failed_reads(), 101);
        assert!(scan
            .dataset
            .samples
            .iter()
            .all(|s| s.sensor_values == vec![0.0; 4]));
    }

    #[test]
    fn homing_failure_aborts_scan() {
        let acquirer = ScanAcquirer::new(&ScanConfig::default());
        let mut ctrl = controller(Some(0));
        let mut sensor = FakeSensor { channels: 4, reads: 0, fail: |_| false };
        let mut store = InMemoryArtifactStore::new();

        let err = acquirer
            .acquire(&mut ctrl, &mut sensor, &mut gps(), &mut store, &ctx(1))
            .unwrap_err();

        assert!(matches!(err, ScanError::HomingFailed(DeviceError::Disconnected(_))));
        assert!(store.saved().is_empty());
    }

    #[test]
    fn actuator_failure_mid_sweep_reports_step() {
        let acquirer = ScanAcquirer::new(&ScanConfig::default());
        // Homing from the switch takes 101 pulses, the offset 50 more; fail on step 3's advance.
        let mut ctrl = controller(Some(101 + 50 + 2 * 2));
        let mut sensor = FakeSensor { channels: 4, reads: 0, fail: |_| false };
        let mut store = InMemoryArtifactStore::new();

        let err = acquirer
            .acquire(&mut ctrl, &mut sensor, &mut gps(), &mut store, &ctx(1))
            .unwrap_err();

        assert!(matches!(err, ScanError::Actuator { step_no: 3, .. }));
    }

    #[test]
    fn rows_put_header_before_values() {
        let sample = ScanSample {
            index: 3,
            clock: Some(ClockTime::hms(9, 8, 7)),
            positioner_reading: -12,
            coadds: 0,
            integration_time: 0.0,
            sensor_values: vec![0.5, 0.25],
            read_failed: false,
        };
        assert_eq!(sample.to_row(), vec![3.0, 9.0, 8.0, 7.0, -12.0, 0.0, 0.0, 0.5, 0.25]);
    }
}
