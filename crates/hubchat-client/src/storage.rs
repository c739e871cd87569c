//! Durable key-value storage for the session slot.
//!
//! [`FileStorage`] keeps a flat JSON object of strings on disk and rewrites
//! it atomically (temp file + rename) on every change, so a group of keys is
//! always written or removed together. [`MemoryStorage`] is the in-process
//! equivalent used by tests and short-lived tools.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;

use hubchat_shared::constants::APP_NAME;

use crate::error::StorageError;
use crate::lock;

const SESSION_FILE: &str = "session.json";

/// String key-value storage with grouped writes.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Set every entry in one durable write.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError>;

    /// Remove every key in one durable write.
    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        let mut guard = lock(&self.entries);
        for (key, value) in entries {
            guard.insert(key.to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut guard = lock(&self.entries);
        for key in keys {
            guard.remove(*key);
        }
        Ok(())
    }
}

/// JSON file storage.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open (or create) the storage file in the platform data directory:
    /// - Linux:   `~/.local/share/hubchat/session.json`
    /// - macOS:   `~/Library/Application Support/com.hubchat.hubchat/session.json`
    /// - Windows: `{FOLDERID_RoamingAppData}\hubchat\hubchat\data\session.json`
    pub fn new() -> Result<Self, StorageError> {
        let project_dirs =
            ProjectDirs::from("com", APP_NAME, APP_NAME).ok_or(StorageError::NoDataDir)?;
        Self::in_dir(project_dirs.data_dir())
    }

    /// Open (or create) the storage file inside `dir`.
    pub fn in_dir(dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;
        Self::open_at(&dir.join(SESSION_FILE))
    }

    /// Open a storage file at an explicit path. A missing file is an empty
    /// store.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened storage file");

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        let mut guard = lock(&self.entries);
        let mut next = guard.clone();
        for (key, value) in entries {
            next.insert(key.to_string(), value.clone());
        }
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut guard = lock(&self.entries);
        let mut next = guard.clone();
        for key in keys {
            next.remove(*key);
        }
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }
}
