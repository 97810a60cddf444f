//! Tests for error types

use std::error::Error;

use scan_station::core::{DeviceError, DispatchRejected, ScanError, StationError, StoreError, TimeError};

#[test]
fn test_dispatch_rejected_error() {
    let err = DispatchRejected::AtCapacity { active: 3, capacity: 3 };
    assert_eq!(format!("{err}"), "dispatch ceiling reached: 3 of 3 jobs active");
    assert_eq!(format!("{}", DispatchRejected::Shutdown), "dispatcher has been shut down");
}

#[test]
fn test_actuator_error_names_step() {
    let err = ScanError::Actuator {
        step_no: 42,
        source: DeviceError::Fault("stall".into()),
    };
    assert_eq!(format!("{err}"), "actuator failed at step 42: device fault: stall");
    assert!(err.source().is_some());
}

#[test]
fn test_homing_stalled_error() {
    let err = StationError::HomingStalled {
        attempts: 3,
        last: DeviceError::Disconnected("motor hat".into()),
    };
    assert_eq!(format!("{err}"), "homing stalled after 3 consecutive failures");
    assert_eq!(
        err.source().map(ToString::to_string),
        Some("device disconnected: motor hat".to_string())
    );
}

#[test]
fn test_store_error_is_transparent_in_station_error() {
    let err: StationError = StoreError::Corrupt {
        path: "position.txt".into(),
        reason: "not an integer".into(),
    }
    .into();
    assert_eq!(format!("{err}"), "corrupt data at position.txt: not an integer");
}

#[test]
fn test_time_error() {
    assert_eq!(format!("{}", TimeError::OutOfRange(25.0)), "value 25 is outside a single day");
}

#[test]
fn test_station_error_into_anyhow() {
    let err = StationError::Config("dispatch.capacity must be greater than 0".into());
    let any: anyhow::Error = err.into();
    assert!(any.to_string().contains("invalid configuration"));
}
