//! Position file backends.
//!
//! The file backend keeps a single plain-text integer, overwritten on every
//! save, so an operator can read or reset it by hand.

use std::fs::{create_dir_all, read_to_string, write};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{PositionStore, StoreError};

/// Plain-text position file.
#[derive(Debug, Clone)]
pub struct FilePositionStore {
    path: PathBuf,
}

impl FilePositionStore {
    /// Create a store at `path`, creating its parent directory.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the parent directory cannot be created.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        Ok(Self { path })
    }

    /// Location of the position file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PositionStore for FilePositionStore {
    fn load(&mut self) -> Result<Option<i64>, StoreError> {
        let text = match read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed.parse::<i64>().map(Some).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn save(&mut self, position: i64) -> Result<(), StoreError> {
        write(&self.path, position.to_string()).map_err(|e| StoreError::io(&self.path, e))
    }
}

/// In-memory store for development/testing. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPositionStore {
    slot: Arc<Mutex<Option<i64>>>,
}

impl InMemoryPositionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `position`.
    #[must_use]
    pub fn with_position(position: i64) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(position))),
        }
    }

    /// Currently stored value.
    #[must_use]
    pub fn current(&self) -> Option<i64> {
        *self.slot.lock()
    }
}

impl PositionStore for InMemoryPositionStore {
    fn load(&mut self) -> Result<Option<i64>, StoreError> {
        Ok(self.current())
    }

    fn save(&mut self, position: i64) -> Result<(), StoreError> {
        *self.slot.lock() = Some(position);
        Ok(())
    }
}
