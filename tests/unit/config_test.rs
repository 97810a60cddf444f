//! Tests for configuration loading and validation

use scan_station::config::StationConfig;
use scan_station::core::StepMode;

#[test]
fn test_json_overrides_keep_other_defaults() {
    let cfg = StationConfig::from_json_str(
        r#"{
            "station_name": "FUEGO",
            "start_time": 6.5,
            "scan": { "positions": 50, "step_mode": "double" },
            "dispatch": { "capacity": 2 }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.station_name, "FUEGO");
    assert!((cfg.start_time - 6.5).abs() < f64::EPSILON);
    assert!((cfg.stop_time - 18.0).abs() < f64::EPSILON);
    assert_eq!(cfg.scan.positions, 50);
    assert_eq!(cfg.scan.start_offset, 50);
    assert_eq!(cfg.scan.step_mode, StepMode::Double);
    assert_eq!(cfg.dispatch.capacity, 2);
    assert_eq!(cfg.homing.max_consecutive_failures, 3);
}

#[test]
fn test_invalid_values_are_rejected() {
    for json in [
        r#"{ "station_name": " " }"#,
        r#"{ "start_time": 24.0 }"#,
        r#"{ "stop_time": -1.0 }"#,
        r#"{ "dispatch": { "capacity": 0 } }"#,
        r#"{ "scan": { "positions": 0 } }"#,
        r#"{ "homing": { "max_consecutive_failures": 0 } }"#,
        r#"{ "analysis": { "command": [] } }"#,
        r#"{ "idle_interval_secs": 0 }"#,
    ] {
        assert!(StationConfig::from_json_str(json).is_err(), "accepted {json}");
    }
}

#[test]
fn test_unparseable_json_is_reported() {
    let err = StationConfig::from_json_str("{ station_name: }").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_legacy_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("processing_setting_defaults.txt");
    std::fs::write(
        &path,
        "station_name;MASAYA;<class 'str'>\nstart_time;8.0;<class 'float'>\ndispatch_capacity;4;<class 'int'>\nplot;False;<class 'bool'>\n",
    )
    .unwrap();

    let cfg = StationConfig::from_settings_file(&path).unwrap();
    assert_eq!(cfg.station_name, "MASAYA");
    assert!((cfg.start_time - 8.0).abs() < f64::EPSILON);
    assert_eq!(cfg.dispatch.capacity, 4);
}

#[test]
fn test_missing_config_file() {
    let err = StationConfig::from_json_file("/nonexistent/station.json").unwrap_err();
    assert!(err.contains("cannot read"));
}
