//! Dataset artifact backends.
//!
//! The filesystem backend lays results out per day:
//!
//! ```text
//! <root>/<YYYY-MM-DD>/spectra/<YYYYMMDD_HHMMSS>_<station>_v1_1_Block<n>.json
//! <root>/<YYYY-MM-DD>/so2/
//! ```
//!
//! Each spectra file is a JSON array of numeric rows, dark row first.

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::{ArtifactStore, ScanDataset, StoreError};

/// Directory holding raw scan files for a day.
pub const SPECTRA_DIR: &str = "spectra";
/// Directory reserved for analysis output for a day.
pub const RESULTS_DIR: &str = "so2";

/// File name for a dataset.
#[must_use]
pub fn artifact_file_name(dataset: &ScanDataset) -> String {
    format!(
        "{}_{}_v1_1_Block{}.json",
        dataset.start_time.format("%Y%m%d_%H%M%S"),
        dataset.station_id,
        dataset.scan_sequence_no
    )
}

/// Filesystem-backed dated results tree.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`. Nothing is created until used.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Directory for a given day.
    #[must_use]
    pub fn day_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format("%Y-%m-%d").to_string())
    }

    /// Where a dataset is (or would be) written.
    #[must_use]
    pub fn locate(&self, dataset: &ScanDataset) -> PathBuf {
        self.day_dir(dataset.start_time.date_naive())
            .join(SPECTRA_DIR)
            .join(artifact_file_name(dataset))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn prepare_day(&mut self, date: NaiveDate) -> Result<(), StoreError> {
        let day = self.day_dir(date);
        for sub in [RESULTS_DIR, SPECTRA_DIR] {
            let dir = day.join(sub);
            create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(())
    }

    fn save(&mut self, dataset: &ScanDataset) -> Result<PathBuf, StoreError> {
        let path = self.locate(dataset);
        if let Some(parent) = path.parent() {
            create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let file = File::create(&path).map_err(|e| StoreError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &dataset.to_rows())?;
        writer.flush().map_err(|e| StoreError::io(&path, e))?;
        debug!(path = %path.display(), scan_no = dataset.scan_sequence_no, "Scan saved");
        Ok(path)
    }
}

/// In-memory store for development/testing. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactStore {
    saved: Arc<Mutex<Vec<(PathBuf, ScanDataset)>>>,
    days: Arc<Mutex<Vec<NaiveDate>>>,
}

impl InMemoryArtifactStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dataset saved so far, with its locator.
    #[must_use]
    pub fn saved(&self) -> Vec<(PathBuf, ScanDataset)> {
        self.saved.lock().clone()
    }

    /// Days prepared so far, in call order.
    #[must_use]
    pub fn prepared_days(&self) -> Vec<NaiveDate> {
        self.days.lock().clone()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn prepare_day(&mut self, date: NaiveDate) -> Result<(), StoreError> {
        let mut days = self.days.lock();
        if days.last() != Some(&date) {
            days.push(date);
        }
        Ok(())
    }

    fn save(&mut self, dataset: &ScanDataset) -> Result<PathBuf, StoreError> {
        let locator = PathBuf::from(format!("memory://{}", artifact_file_name(dataset)));
        self.saved.lock().push((locator.clone(), dataset.clone()));
        Ok(locator)
    }
}
