//! Durable relayer state
//!
//! The state lives in a single JSON file that is replaced atomically on every
//! write: the new contents go to a temporary file in the same directory, are
//! flushed to disk, and are then renamed over the canonical path. The
//! directory itself is synced afterwards so the rename survives power loss.
//! A crash at any point leaves either the previous or the new state, never a
//! partial file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::types::RelayerState;

/// File-backed store for [`RelayerState`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Load the state, falling back to a fresh default when the file is
    /// missing, unreadable, or structurally invalid.
    pub fn load(&self) -> RelayerState {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file, starting fresh");
                return RelayerState::default();
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not read state file, reinitializing"
                );
                return RelayerState::default();
            }
        };

        let state: RelayerState = match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "State file is not valid JSON state, reinitializing"
                );
                return RelayerState::default();
            }
        };

        if let Err(e) = state.validate() {
            warn!(
                path = %self.path.display(),
                error = %e,
                "State file failed validation, reinitializing"
            );
            return RelayerState::default();
        }

        state
    }

    /// Atomically replace the state file
    pub fn save(&self, state: &RelayerState) -> Result<()> {
        let tmp = self.write_temp(state)?;
        self.commit(tmp)
    }

    /// First half of [`save`](Self::save): write and flush a temporary file
    /// next to the state file. Dropping it without committing removes it.
    pub fn write_temp(&self, state: &RelayerState) -> Result<NamedTempFile> {
        let dir = self.dir();
        fs::create_dir_all(dir)
            .wrap_err_with(|| format!("Failed to create state directory {}", dir.display()))?;

        let json = serde_json::to_vec_pretty(state).wrap_err("Failed to serialize state")?;

        let mut tmp = NamedTempFile::new_in(dir)
            .wrap_err_with(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&json)
            .wrap_err_with(|| format!("Failed to write {}", tmp.path().display()))?;
        tmp.as_file()
            .sync_all()
            .wrap_err_with(|| format!("Failed to sync {}", tmp.path().display()))?;

        Ok(tmp)
    }

    /// Second half of [`save`](Self::save): rename the temporary file into
    /// place and sync the directory entry
    pub fn commit(&self, tmp: NamedTempFile) -> Result<()> {
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .wrap_err_with(|| format!("Failed to move state into {}", self.path.display()))?;
        sync_dir(self.dir())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .wrap_err_with(|| format!("Failed to sync directory {}", dir.display()))
}

// Directory handles cannot be synced here; the rename is as durable as the
// platform makes it.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
