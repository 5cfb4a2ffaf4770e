//! Per-source HTTP validator cache.
//!
//! Persisted as one JSON object mapping source id to [`HttpCacheEntry`]. The
//! file is read once at startup and flushed after every mutation that
//! followed a network round trip.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use super::persist::{Loaded, read_json, write_json_atomic};
use crate::error::PersistenceError;
use crate::models::HttpCacheEntry;

#[derive(Debug)]
pub struct HttpMetadataCache {
    path: PathBuf,
    entries: BTreeMap<String, HttpCacheEntry>,
}

impl HttpMetadataCache {
    /// Empty cache that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache from `path`. A missing or corrupt file yields an empty
    /// cache, so every source gets first-fetch treatment.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Self {
        let entries = match read_json::<BTreeMap<String, HttpCacheEntry>>(path) {
            Loaded::Present(entries) => {
                info!(entries = entries.len(), "Loaded HTTP metadata cache");
                entries
            }
            Loaded::Missing => BTreeMap::new(),
            Loaded::Corrupt(reason) => {
                info!(%reason, "Ignoring corrupt HTTP metadata cache; every source starts cold");
                BTreeMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, source_id: &str) -> Option<&HttpCacheEntry> {
        self.entries.get(source_id)
    }

    pub fn put(&mut self, source_id: &str, entry: HttpCacheEntry) {
        self.entries.insert(source_id.to_string(), entry);
    }

    /// Seconds since the source was last checked.
    ///
    /// `None` stands for an infinite age: the source was never checked, or its
    /// check time lies in the future (clock moved backwards), which must not
    /// keep it fresh.
    pub fn age_seconds(&self, source_id: &str, now: DateTime<Utc>) -> Option<u64> {
        let checked = self.entries.get(source_id)?.last_checked?;
        u64::try_from((now - checked).num_seconds()).ok()
    }

    pub fn save(&self) -> Result<(), PersistenceError> {
        write_json_atomic(&self.path, &self.entries)
    }
}
