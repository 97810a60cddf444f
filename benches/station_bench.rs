//! Benchmarks for the station hot paths.
//!
//! Benchmarks cover:
//! - Fractional time conversion of a scan's worth of clocks
//! - Payload row flattening
//! - A full simulated acquisition (homing, dark, sweep, persist)

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use scan_station::config::{HomingConfig, ScanConfig};
use scan_station::core::{
    to_fractional, ArtifactStore, ClockTime, LocationFix, LocationTimeSource, PositionController, ScanAcquirer,
    ScanDataset, StationContext, StoreError, TimeUnit,
};
use scan_station::infra::position_store::InMemoryPositionStore;
use scan_station::infra::simulated::{SimulatedPositioner, SimulatedSensor};
use scan_station::util::RecordingSleeper;

// ============================================================================
// Fixtures
// ============================================================================

struct FixedClock;

impl LocationTimeSource for FixedClock {
    fn read(&mut self) -> LocationFix {
        LocationFix {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 21, 12, 0, 0).unwrap(),
        }
    }
}

/// Accepts every dataset without keeping it.
struct DiscardStore;

impl ArtifactStore for DiscardStore {
    fn prepare_day(&mut self, _date: NaiveDate) -> Result<(), StoreError> {
        Ok(())
    }

    fn save(&mut self, _dataset: &ScanDataset) -> Result<PathBuf, StoreError> {
        Ok(PathBuf::from("discard"))
    }
}

fn controller() -> PositionController<SimulatedPositioner> {
    PositionController::new(
        SimulatedPositioner::default(),
        Box::new(InMemoryPositionStore::new()),
        Arc::new(RecordingSleeper::new()),
        &HomingConfig::default(),
    )
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_time_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("time_convert");
    for size in [101_usize, 10_000] {
        let clocks: Vec<ClockTime> = (0..size)
            .map(|i| {
                let i = u32::try_from(i).unwrap();
                ClockTime::hms((i / 3600) % 24, (i / 60) % 60, i % 60)
            })
            .collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("to_fractional_hours", size), &clocks, |b, clocks| {
            b.iter(|| to_fractional(black_box(clocks), TimeUnit::Hours));
        });
    }
    group.finish();
}

fn bench_acquisition(c: &mut Criterion) {
    let acquirer = ScanAcquirer::new(&ScanConfig::default());
    let ctx = StationContext {
        station_name: "BENCH".into(),
        scan_no: 0,
    };

    let mut group = c.benchmark_group("acquisition");
    for channels in [256_usize, 2048] {
        group.bench_with_input(BenchmarkId::new("simulated_scan", channels), &channels, |b, &channels| {
            let mut ctrl = controller();
            let mut sensor = SimulatedSensor::new(channels);
            let mut store = DiscardStore;
            b.iter(|| {
                acquirer
                    .acquire(&mut ctrl, &mut sensor, &mut FixedClock, &mut store, &ctx)
                    .unwrap()
            });
        });

        let mut ctrl = controller();
        let mut sensor = SimulatedSensor::new(channels);
        let scan = acquirer
            .acquire(&mut ctrl, &mut sensor, &mut FixedClock, &mut DiscardStore, &ctx)
            .unwrap();
        group.bench_with_input(BenchmarkId::new("to_rows", channels), &scan.dataset, |b, dataset| {
            b.iter(|| black_box(dataset).to_rows());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_time_conversion, bench_acquisition);
criterion_main!(benches);
