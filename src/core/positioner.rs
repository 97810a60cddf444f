//! Positioner state machine: homing, relative stepping and advisory
//! persistence of the step counter.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::HomingConfig;
use crate::core::error::{DeviceError, StoreError};
use crate::util::clock::Sleeper;

/// Stepping direction of the positioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Increases the step counter.
    Forward,
    /// Decreases the step counter. Homing travels this way.
    Backward,
}

/// Stepper drive style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    /// Single coil, lowest power.
    Single,
    /// Two coils, more torque.
    Double,
    /// Alternating single/double, half-step resolution.
    #[default]
    Interleave,
    /// Micro-stepping, slow and precise.
    Micro,
}

/// Homing state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomingState {
    /// Position is not trustworthy.
    Unhomed,
    /// A homing pass is in progress.
    Homing,
    /// Position is relative to a confirmed home.
    Homed,
}

/// Logical state of the positioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionerState {
    /// Steps since the last confirmed home; negative is backward.
    pub position: i64,
    /// Whether `position` is relative to a confirmed home.
    pub homed: bool,
}

/// Actuator and home-switch capability.
pub trait PositionerDevice: Send {
    /// Issue one actuation pulse.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` when the driver rejects the pulse.
    fn pulse(&mut self, direction: Direction, mode: StepMode) -> Result<(), DeviceError>;

    /// Whether the home switch is currently triggered.
    fn read_home_switch(&mut self) -> bool;
}

/// Stable storage for the step counter.
pub trait PositionStore: Send {
    /// Last stored position, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the storage exists but cannot be read.
    fn load(&mut self) -> Result<Option<i64>, StoreError>;

    /// Overwrite the stored position.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the write fails.
    fn save(&mut self, position: i64) -> Result<(), StoreError>;
}

const HOME_DIRECTION: Direction = Direction::Backward;
const HOMING_MODE: StepMode = StepMode::Interleave;

/// Owns the positioner's logical state.
///
/// Methods take `&mut self`; a single owner serializes every move.
pub struct PositionController<D: PositionerDevice> {
    device: D,
    store: Box<dyn PositionStore>,
    sleeper: Arc<dyn Sleeper>,
    clearing_steps: u32,
    settle: Duration,
    state: HomingState,
    position: i64,
    persist_failures: u64,
}

impl<D: PositionerDevice> PositionController<D> {
    /// Create a controller, seeding the counter from `store`.
    ///
    /// The seeded position is advisory: the controller starts `Unhomed`.
    pub fn new(
        device: D,
        mut store: Box<dyn PositionStore>,
        sleeper: Arc<dyn Sleeper>,
        homing: &HomingConfig,
    ) -> Self {
        let position = match store.load() {
            Ok(Some(p)) => {
                info!(position = p, "Restored positioner position (unhomed)");
                p
            }
            Ok(None) => 0,
            Err(e) => {
                warn!(error = %e, "Could not read persisted position, starting from 0");
                0
            }
        };
        Self {
            device,
            store,
            sleeper,
            clearing_steps: homing.clearing_steps,
            settle: Duration::from_millis(homing.settle_ms),
            state: HomingState::Unhomed,
            position,
            persist_failures: 0,
        }
    }

    /// Current step counter.
    #[must_use]
    pub const fn position(&self) -> i64 {
        self.position
    }

    /// Current homing state.
    #[must_use]
    pub const fn homing_state(&self) -> HomingState {
        self.state
    }

    /// Snapshot of the logical state.
    #[must_use]
    pub const fn state(&self) -> PositionerState {
        PositionerState {
            position: self.position,
            homed: matches!(self.state, HomingState::Homed),
        }
    }

    /// Number of position writes that failed since construction.
    #[must_use]
    pub const fn persist_failures(&self) -> u64 {
        self.persist_failures
    }

    /// Access the underlying device.
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Drive to the home switch and zero the counter.
    ///
    /// If the switch is already triggered the head first moves
    /// `clearing_steps` to leave it, so the edge is found again from outside.
    /// A trigger only counts once it still reads triggered after the settle
    /// delay. There is no step ceiling: a dead switch keeps this searching.
    ///
    /// # Errors
    ///
    /// Returns the `DeviceError` of a failed pulse; the state is then `Unhomed`.
    pub fn home(&mut self) -> Result<(), DeviceError> {
        self.state = HomingState::Homing;
        match self.seek_home() {
            Ok(steps) => {
                self.position = 0;
                self.persist();
                self.state = HomingState::Homed;
                info!(steps_to_home = steps, "Positioner homed");
                Ok(())
            }
            Err(e) => {
                self.state = HomingState::Unhomed;
                warn!(error = %e, position = self.position, "Homing aborted");
                Err(e)
            }
        }
    }

    fn seek_home(&mut self) -> Result<u64, DeviceError> {
        if self.device.read_home_switch() {
            debug!(steps = self.clearing_steps, "Home switch already triggered, clearing it");
            self.step(self.clearing_steps, HOME_DIRECTION, HOMING_MODE)?;
        }

        let mut steps: u64 = 0;
        loop {
            self.step(1, HOME_DIRECTION, HOMING_MODE)?;
            steps += 1;

            if self.device.read_home_switch() {
                self.sleeper.sleep(self.settle);
                if self.device.read_home_switch() {
                    return Ok(steps);
                }
                debug!(steps, "Home switch released during settle, continuing");
            }
        }
    }

    /// Move `count` pulses and account them in the counter.
    ///
    /// The new position is written to the store after the move. A failed
    /// write is logged and counted, never returned: the motion already
    /// happened.
    ///
    /// # Errors
    ///
    /// Returns the `DeviceError` of a failed pulse. Pulses completed before
    /// it are still counted and persisted, and the controller becomes
    /// `Unhomed`.
    pub fn step(&mut self, count: u32, direction: Direction, mode: StepMode) -> Result<(), DeviceError> {
        let mut done: u32 = 0;
        let mut failure = None;
        while done < count {
            if let Err(e) = self.device.pulse(direction, mode) {
                failure = Some(e);
                break;
            }
            done += 1;
        }

        match direction {
            Direction::Forward => self.position += i64::from(done),
            Direction::Backward => self.position -= i64::from(done),
        }
        self.persist();

        match failure {
            None => Ok(()),
            Some(e) => {
                self.state = HomingState::Unhomed;
                warn!(
                    error = %e,
                    requested = count,
                    completed = done,
                    position = self.position,
                    "Positioner move failed"
                );
                Err(e)
            }
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(self.position) {
            self.persist_failures += 1;
            warn!(error = %e, position = self.position, "Failed to persist positioner position");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::infra::position_store::InMemoryPositionStore;
    use crate::util::clock::RecordingSleeper;

    /// Scripted positioner: switch reads pop from a script, then read `true`.
    struct ScriptedPositioner {
        reads: VecDeque<bool>,
        pulses: Vec<Direction>,
        fail_at: Option<usize>,
    }

    impl ScriptedPositioner {
        fn new(reads: impl IntoIterator<Item = bool>) -> Self {
            Self {
                reads: reads.into_iter().collect(),
                pulses: Vec::new(),
                fail_at: None,
            }
        }
    }

    impl PositionerDevice for ScriptedPositioner {
        fn pulse(&mut self, direction: Direction, _mode: StepMode) -> Result<(), DeviceError> {
            if self.fail_at == Some(self.pulses.len()) {
                return Err(DeviceError::Fault("stalled".into()));
            }
            self.pulses.push(direction);
            Ok(())
        }

        fn read_home_switch(&mut self) -> bool {
            self.reads.pop_front().unwrap_or(true)
        }
    }

    struct FailingStore;

    impl PositionStore for FailingStore {
        fn load(&mut self) -> Result<Option<i64>, StoreError> {
            Ok(None)
        }

        fn save(&mut self, _position: i64) -> Result<(), StoreError> {
            Err(StoreError::io("position.txt", std::io::Error::other("read-only")))
        }
    }

    fn controller(
        device: ScriptedPositioner,
        store: InMemoryPositionStore,
    ) -> (PositionController<ScriptedPositioner>, RecordingSleeper) {
        let sleeper = RecordingSleeper::new();
        let ctrl = PositionController::new(
            device,
            Box::new(store),
            Arc::new(sleeper.clone()),
            &HomingConfig::default(),
        );
        (ctrl, sleeper)
    }

    #[test]
    fn starts_unhomed_from_persisted_position() {
        let store = InMemoryPositionStore::with_position(-42);
        let (ctrl, _) = controller(ScriptedPositioner::new([]), store);
        assert_eq!(ctrl.position(), -42);
        assert_eq!(ctrl.homing_state(), HomingState::Unhomed);
        assert!(!ctrl.state().homed);
    }

    #[test]
    fn home_zeroes_position_regardless_of_start() {
        let store = InMemoryPositionStore::with_position(1234);
        // Not on the switch; found after three steps, still triggered after settling.
        let device = ScriptedPositioner::new([false, false, false, true, true]);
        let (mut ctrl, sleeper) = controller(device, store.clone());

        ctrl.home().unwrap();

        assert_eq!(ctrl.position(), 0);
        assert_eq!(ctrl.homing_state(), HomingState::Homed);
        assert_eq!(ctrl.device().pulses.len(), 3);
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(1)]);
        assert_eq!(store.current(), Some(0));
    }

    #[test]
    fn home_clears_switch_before_searching() {
        // Initial read triggered -> 100 clearing pulses, then found after one more.
        let device = ScriptedPositioner::new([true, true, true]);
        let (mut ctrl, sleeper) = controller(device, InMemoryPositionStore::new());

        ctrl.home().unwrap();

        let pulses = &ctrl.device().pulses;
        assert_eq!(pulses.len(), 101);
        assert!(pulses.iter().all(|d| *d == Direction::Backward));
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(1)]);
        assert_eq!(ctrl.position(), 0);
    }

    #[test]
    fn home_ignores_bounce_during_settle() {
        let mut reads = vec![false];
        reads.extend([false, true, false]); // bounce at pulse 2
        reads.extend([false, true, true]); // confirmed at pulse 4
        let device = ScriptedPositioner::new(reads);
        let (mut ctrl, sleeper) = controller(device, InMemoryPositionStore::new());

        ctrl.home().unwrap();

        assert_eq!(ctrl.device().pulses.len(), 4);
        assert_eq!(sleeper.calls().len(), 2);
        assert_eq!(ctrl.homing_state(), HomingState::Homed);
    }

    #[test]
    fn home_failure_leaves_unhomed() {
        let mut device = ScriptedPositioner::new([false, false, false]);
        device.fail_at = Some(1);
        let (mut ctrl, _) = controller(device, InMemoryPositionStore::new());

        let err = ctrl.home().unwrap_err();
        assert_eq!(err, DeviceError::Fault("stalled".into()));
        assert_eq!(ctrl.homing_state(), HomingState::Unhomed);
        assert_eq!(ctrl.position(), -1);
    }

    #[test]
    fn forward_then_backward_returns_to_zero() {
        let device = ScriptedPositioner::new([false, true, true]);
        let store = InMemoryPositionStore::new();
        let (mut ctrl, _) = controller(device, store.clone());
        ctrl.home().unwrap();

        ctrl.step(37, Direction::Forward, StepMode::Single).unwrap();
        assert_eq!(ctrl.position(), 37);
        assert_eq!(store.current(), Some(37));

        ctrl.step(37, Direction::Backward, StepMode::Single).unwrap();
        assert_eq!(ctrl.position(), 0);
        assert_eq!(store.current(), Some(0));
        assert_eq!(ctrl.homing_state(), HomingState::Homed);
    }

    #[test]
    fn partial_move_counts_completed_pulses() {
        let mut device = ScriptedPositioner::new([false, true, true]);
        device.fail_at = Some(6);
        let store = InMemoryPositionStore::new();
        let (mut ctrl, _) = controller(device, store.clone());
        ctrl.home().unwrap();

        let err = ctrl.step(10, Direction::Forward, StepMode::Double);
        assert!(err.is_err());
        assert_eq!(ctrl.position(), 5);
        assert_eq!(store.current(), Some(5));
        assert_eq!(ctrl.homing_state(), HomingState::Unhomed);
    }

    #[test]
    fn persistence_failure_does_not_abort_move() {
        let sleeper = RecordingSleeper::new();
        let mut ctrl = PositionController::new(
            ScriptedPositioner::new([]),
            Box::new(FailingStore),
            Arc::new(sleeper),
            &HomingConfig::default(),
        );

        ctrl.step(4, Direction::Forward, StepMode::Interleave).unwrap();
        ctrl.step(1, Direction::Backward, StepMode::Interleave).unwrap();

        assert_eq!(ctrl.position(), 3);
        assert_eq!(ctrl.persist_failures(), 2);
    }
}
