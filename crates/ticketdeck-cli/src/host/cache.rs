//! File-backed durable cache: one JSON object of key → blob.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ticketdeck_core::{CacheError, DurableCache};
use tracing::debug;

pub const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `state.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(STATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Corrupt`] when the file is not a JSON object of strings.
    pub fn entries(&self) -> Result<BTreeMap<String, String>, CacheError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|err| CacheError::Read(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| CacheError::Corrupt(err.to_string()))
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| CacheError::Write(err.to_string()))?;
        }
        let serialized = serde_json::to_string_pretty(entries)
            .map_err(|err| CacheError::Write(err.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized).map_err(|err| CacheError::Write(err.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|err| CacheError::Write(err.to_string()))
    }

    /// Existing entries, or an empty map when the file is unreadable.
    fn entries_or_fresh(&self) -> BTreeMap<String, String> {
        self.entries().unwrap_or_else(|err| {
            debug!(path = %self.path.display(), "{err}; starting over");
            BTreeMap::new()
        })
    }
}

impl DurableCache for FileCache {
    fn load(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries()?.remove(key))
    }

    fn store(&mut self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self.entries_or_fresh();
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        match self.entries() {
            Ok(mut entries) => {
                if entries.remove(key).is_none() {
                    return Ok(());
                }
                self.write_entries(&entries)
            }
            Err(err) => {
                debug!(path = %self.path.display(), "{err}; resetting");
                self.write_entries(&BTreeMap::new())
            }
        }
    }
}
