//! Station heartbeat.
//!
//! The control loop updates a shared [`StationStatus`]; an independent
//! thread periodically writes it to a JSON file for remote monitoring.

use std::fs::{create_dir_all, rename, write};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{StationError, StoreError};

/// What the station is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationPhase {
    /// Built but not yet looping.
    Starting,
    /// Between scans or outside the operating window.
    Idle,
    /// Acquiring a scan.
    Scanning,
    /// Stopped on a fatal error.
    Stopped,
}

/// Snapshot published by the heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationStatus {
    /// Station name.
    pub station_name: String,
    /// Current phase.
    pub phase: StationPhase,
    /// Next scan number to be assigned.
    pub scan_no: u64,
    /// Positioner step count.
    pub position: i64,
    /// Whether the positioner is homed.
    pub homed: bool,
    /// Analysis jobs in flight.
    pub active_jobs: usize,
    /// Completion time of the last successful scan.
    pub last_scan_at: Option<DateTime<Utc>>,
    /// When this snapshot was last changed.
    pub updated_at: DateTime<Utc>,
}

impl StationStatus {
    /// Initial snapshot for a station.
    #[must_use]
    pub fn new(station_name: impl Into<String>) -> Self {
        Self {
            station_name: station_name.into(),
            phase: StationPhase::Starting,
            scan_no: 0,
            position: 0,
            homed: false,
            active_jobs: 0,
            last_scan_at: None,
            updated_at: Utc::now(),
        }
    }
}

/// Shared handle to the live status.
pub type StatusBoard = Arc<RwLock<StationStatus>>;

/// Background thread writing the status file.
pub struct StatusReporter {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StatusReporter {
    /// Start writing `board` to `path` every `interval`.
    ///
    /// # Errors
    ///
    /// - `StationError::Store` if the status directory cannot be created
    /// - `StationError::Dispatcher` if the thread cannot be spawned
    pub fn spawn(board: StatusBoard, path: impl AsRef<Path>, interval: Duration) -> Result<Self, StationError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("station-status".into())
            .spawn(move || {
                debug!(path = %path.display(), "Status reporter started");
                loop {
                    if let Err(e) = write_status(&board, &path) {
                        warn!(error = %e, "Failed to write station status");
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                // Final snapshot so the file reflects the stop.
                if let Err(e) = write_status(&board, &path) {
                    warn!(error = %e, "Failed to write final station status");
                }
                debug!("Status reporter exiting");
            })
            .map_err(|e| StationError::Dispatcher(format!("status reporter: {e}")))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the reporter and wait for its final write.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Status reporter panicked");
            }
        }
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn write_status(board: &StatusBoard, path: &Path) -> Result<(), StoreError> {
    let snapshot = board.read().clone();
    let json = serde_json::to_vec_pretty(&snapshot)?;
    let tmp = path.with_extension("json.tmp");
    write(&tmp, json).map_err(|e| StoreError::io(&tmp, e))?;
    rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}
