//! File persistence for the cache files.
//!
//! Writes go to a temporary file in the destination directory which is then
//! renamed over the target, so a reader (or a run killed halfway) only ever
//! sees the previous file or the new one. Loads are tolerant: a missing or
//! unparseable file is reported as absent and the caller starts cold.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::PersistenceError;

/// Result of reading a persisted file.
#[derive(Debug)]
pub enum Loaded<T> {
    /// File parsed.
    Present(T),
    /// No file at that path.
    Missing,
    /// File exists but could not be read or parsed.
    Corrupt(String),
}

/// Read and parse a JSON file without failing the caller.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Loaded<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No cache file yet");
            return Loaded::Missing;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache file unreadable; starting cold");
            return Loaded::Corrupt(e.to_string());
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Loaded::Present(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache file corrupt; starting cold");
            Loaded::Corrupt(e.to_string())
        }
    }
}

/// Serialize `value` as pretty JSON and write it atomically to `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Write `bytes` to `path` through a sibling temporary file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let dir = parent_dir(path);
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(&dir).map_err(io_err)?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| PersistenceError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    debug!(path = %path.display(), bytes = bytes.len(), "Wrote file atomically");
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
