//! Tests for the filesystem stores

use chrono::{NaiveDate, TimeZone, Utc};
use scan_station::core::{ArtifactStore, LocationFix, PositionStore, ScanDataset, ScanSample, ROW_HEADER_LEN};
use scan_station::infra::artifact_store::FsArtifactStore;
use scan_station::infra::position_store::FilePositionStore;

fn dataset() -> ScanDataset {
    let ts = Utc.with_ymd_and_hms(2024, 3, 9, 9, 5, 7).unwrap();
    ScanDataset {
        station_id: "TEST".into(),
        start_time: ts,
        scan_sequence_no: 3,
        location: LocationFix {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            timestamp: ts,
        },
        samples: vec![ScanSample {
            index: 0,
            clock: None,
            positioner_reading: 0,
            coadds: 0,
            integration_time: 0.0,
            sensor_values: vec![1.0, 2.0],
            read_failed: false,
        }],
    }
}

#[test]
fn test_results_tree_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FsArtifactStore::new(dir.path());

    store.prepare_day(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()).unwrap();
    assert!(dir.path().join("2024-03-09").join("spectra").is_dir());
    assert!(dir.path().join("2024-03-09").join("so2").is_dir());

    let path = store.save(&dataset()).unwrap();
    assert_eq!(
        path,
        dir.path().join("2024-03-09/spectra/20240309_090507_TEST_v1_1_Block3.json")
    );
    let rows: Vec<Vec<f64>> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len(), ROW_HEADER_LEN + 2);
}

#[test]
fn test_position_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Station").join("position.txt");

    let mut store = FilePositionStore::new(&path).unwrap();
    assert_eq!(store.load().unwrap(), None);
    store.save(-17).unwrap();

    let mut reopened = FilePositionStore::new(&path).unwrap();
    assert_eq!(reopened.load().unwrap(), Some(-17));
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "-17");
}
