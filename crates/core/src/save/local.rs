use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::{
    error::StoreError,
    snapshot::{self, ProgressSnapshot},
};

/// Fixed slot name for the progress record.
pub const PROGRESS_KEY: &str = "Progress";

/// Single-slot local store for player progress.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store that keeps its slot under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File backing the progress slot.
    pub fn slot_path(&self) -> PathBuf {
        self.root.join(format!("{PROGRESS_KEY}.json"))
    }

    /// Write the snapshot atomically: readers see either the old or the new
    /// record, never a partial one.
    pub fn save(&self, snapshot: &ProgressSnapshot) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let bytes = snapshot::encode(snapshot)?;
        let path = self.slot_path();
        write_atomic(&self.root, &path, &bytes)?;
        debug!(path = %path.display(), gold = snapshot.gold, "Progress saved locally");
        Ok(())
    }

    /// Read and decode the slot.
    pub fn load(&self) -> Result<ProgressSnapshot, StoreError> {
        let path = self.slot_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(err) => return Err(StoreError::Io(err)),
        };
        snapshot::decode(&bytes)
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}
