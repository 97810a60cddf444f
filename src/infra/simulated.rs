//! Simulated devices for bench runs without hardware.

use chrono::Utc;
use tracing::debug;

use crate::core::acquisition::{LocationFix, LocationTimeSource, SensorDevice};
use crate::core::error::DeviceError;
use crate::core::positioner::{Direction, PositionerDevice, StepMode};

/// Rotary positioner whose home switch closes over a fixed arc.
#[derive(Debug, Clone)]
pub struct SimulatedPositioner {
    steps_per_rev: u32,
    switch_width: u32,
    angle: u32,
    pulses: u64,
}

impl SimulatedPositioner {
    /// Positioner with `steps_per_rev` pulses per revolution, starting at
    /// `start_angle`. The switch is closed for angles below `switch_width`.
    #[must_use]
    pub fn new(steps_per_rev: u32, switch_width: u32, start_angle: u32) -> Self {
        let steps_per_rev = steps_per_rev.max(1);
        Self {
            steps_per_rev,
            switch_width: switch_width.min(steps_per_rev),
            angle: start_angle % steps_per_rev,
            pulses: 0,
        }
    }

    /// Current angle in pulses.
    #[must_use]
    pub const fn angle(&self) -> u32 {
        self.angle
    }

    /// Pulses issued so far.
    #[must_use]
    pub const fn pulses(&self) -> u64 {
        self.pulses
    }
}

impl Default for SimulatedPositioner {
    fn default() -> Self {
        Self::new(400, 4, 137)
    }
}

impl PositionerDevice for SimulatedPositioner {
    fn pulse(&mut self, direction: Direction, _mode: StepMode) -> Result<(), DeviceError> {
        self.angle = match direction {
            Direction::Forward => (self.angle + 1) % self.steps_per_rev,
            Direction::Backward => (self.angle + self.steps_per_rev - 1) % self.steps_per_rev,
        };
        self.pulses += 1;
        Ok(())
    }

    fn read_home_switch(&mut self) -> bool {
        self.angle < self.switch_width
    }
}

/// Sensor producing a smooth synthetic spectrum.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    channels: usize,
    integration_us: u64,
    reads: u64,
}

impl SimulatedSensor {
    /// Sensor with `channels` values per reading.
    #[must_use]
    pub const fn new(channels: usize) -> Self {
        Self {
            channels,
            integration_us: 1_000_000,
            reads: 0,
        }
    }

    /// Integration time currently set, in microseconds.
    #[must_use]
    pub const fn integration_time(&self) -> u64 {
        self.integration_us
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(2048)
    }
}

#[allow(clippy::cast_precision_loss)]
impl SensorDevice for SimulatedSensor {
    fn read_intensities(&mut self) -> Result<Vec<f64>, DeviceError> {
        self.reads += 1;
        let centre = self.channels as f64 / 2.0;
        let width = (self.channels as f64 / 6.0).max(1.0);
        let gain = self.integration_us as f64 / 1_000.0;
        // A slow drift between reads keeps consecutive spectra distinct.
        let drift = (self.reads % 50) as f64 / 50.0;
        Ok((0..self.channels)
            .map(|i| {
                let x = (i as f64 - centre) / width;
                gain * (-x * x / 2.0).exp() * (1.0 + 0.05 * drift)
            })
            .collect())
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn serial_number(&self) -> Result<String, DeviceError> {
        Ok("SIM00001".into())
    }

    fn set_integration_time(&mut self, micros: u64) -> Result<(), DeviceError> {
        if micros == 0 {
            return Err(DeviceError::Fault("integration time must be positive".into()));
        }
        debug!(micros, "Simulated integration time set");
        self.integration_us = micros;
        Ok(())
    }
}

/// System clock paired with a fixed site position.
#[derive(Debug, Clone, Copy)]
pub struct SystemClockSource {
    latitude: f64,
    longitude: f64,
    altitude: f64,
}

impl SystemClockSource {
    /// Source reporting the given site.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }
}

impl Default for SystemClockSource {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl LocationTimeSource for SystemClockSource {
    fn read(&mut self) -> LocationFix {
        LocationFix {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_pulses_wrap_onto_the_switch() {
        let mut positioner = SimulatedPositioner::new(10, 2, 3);
        assert!(!positioner.read_home_switch());
        positioner.pulse(Direction::Backward, StepMode::Interleave).unwrap();
        positioner.pulse(Direction::Backward, StepMode::Interleave).unwrap();
        assert_eq!(positioner.angle(), 1);
        assert!(positioner.read_home_switch());

        for _ in 0..2 {
            positioner.pulse(Direction::Backward, StepMode::Interleave).unwrap();
        }
        assert_eq!(positioner.angle(), 9);
        assert!(!positioner.read_home_switch());
        assert_eq!(positioner.pulses(), 4);
    }

    #[test]
    fn sensor_reading_has_channel_count_values() {
        let mut sensor = SimulatedSensor::new(64);
        sensor.set_integration_time(500_000).unwrap();
        let values = sensor.read_intensities().unwrap();
        assert_eq!(values.len(), 64);
        assert!(values[32] > values[0]);
        assert!(sensor.set_integration_time(0).is_err());
        assert_eq!(sensor.integration_time(), 500_000);
    }
}
