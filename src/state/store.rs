//! Crash-safe snapshot file.
//!
//! A snapshot is written to a temporary file in the destination directory,
//! synced, then renamed over the destination. Readers therefore only ever
//! see the previous complete snapshot or the new complete one.

use super::error::StoreError;
use super::PersistedState;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_BACKOFF: Duration = Duration::from_millis(50);

/// Reads and atomically writes [`PersistedState`] at a fixed path.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    /// Single writer; concurrent persists never interleave
    write_lock: Mutex<()>,
}

/// A fully written, synced temporary file that has not replaced the
/// destination yet.
pub(crate) struct StagedSnapshot {
    file: NamedTempFile,
    destination: PathBuf,
}

impl StagedSnapshot {
    /// Atomically replace the destination.
    pub(crate) fn commit(self) -> Result<(), StoreError> {
        let destination = self.destination;
        self.file
            .persist(&destination)
            .map_err(|e| StoreError::Io {
                path: destination.clone(),
                source: e.error,
            })?;
        sync_parent_dir(&destination);
        Ok(())
    }
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last snapshot.
    ///
    /// A missing file yields the empty default. An unreadable or corrupt
    /// file is logged, moved aside to `<name>.corrupt` and also yields the
    /// default; startup never fails on bad state.
    pub fn load(&self) -> PersistedState {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No state file, starting fresh");
                return PersistedState::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read state file, starting fresh");
                return PersistedState::default();
            }
        };

        match serde_json::from_slice::<PersistedState>(&content) {
            Ok(state) => {
                debug!(
                    path = %self.path.display(),
                    targets = state.targets.len(),
                    "Loaded state"
                );
                state
            }
            Err(e) => {
                let aside = self.corrupt_path();
                error!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "State file is corrupt, starting fresh"
                );
                if let Err(rename_err) = fs::rename(&self.path, &aside) {
                    warn!(error = %rename_err, "Could not move corrupt state file aside");
                }
                PersistedState::default()
            }
        }
    }

    /// Write a snapshot, retrying a few times before giving up.
    ///
    /// On error the previous snapshot on disk is untouched.
    pub fn persist(&self, state: &PersistedState) -> Result<(), StoreError> {
        let bytes = encode(state)?;
        // A poisoned lock only means another writer panicked; the file is still consistent
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut last_error = None;
        for attempt in 1..=PERSIST_ATTEMPTS {
            match self.stage_bytes(&bytes).and_then(StagedSnapshot::commit) {
                Ok(()) => {
                    debug!(path = %self.path.display(), bytes = bytes.len(), "State persisted");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        attempt,
                        error = %e,
                        "Failed to persist state"
                    );
                    last_error = Some(e);
                    if attempt < PERSIST_ATTEMPTS {
                        std::thread::sleep(PERSIST_BACKOFF * attempt);
                    }
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        error!(path = %self.path.display(), error = %message, "Giving up persisting state");
        Err(StoreError::Persist {
            path: self.path.clone(),
            attempts: PERSIST_ATTEMPTS,
            message,
        })
    }

    /// First phase of a persist: write and sync a temporary file.
    #[cfg(test)]
    pub(crate) fn stage(&self, state: &PersistedState) -> Result<StagedSnapshot, StoreError> {
        let bytes = encode(state)?;
        self.stage_bytes(&bytes)
    }

    fn stage_bytes(&self, bytes: &[u8]) -> Result<StagedSnapshot, StoreError> {
        let dir = self.directory();
        fs::create_dir_all(&dir).map_err(|source| self.io_error(source))?;

        let mut file = NamedTempFile::new_in(&dir).map_err(|source| self.io_error(source))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|source| self.io_error(source))?;

        Ok(StagedSnapshot {
            file,
            destination: self.path.clone(),
        })
    }

    fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn corrupt_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".corrupt");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn encode(state: &PersistedState) -> Result<Vec<u8>, StoreError> {
    let mut bytes = serde_json::to_vec_pretty(state)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::File::open(parent).and_then(|dir| dir.sync_all()) {
            debug!(error = %e, "Could not sync state directory");
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
