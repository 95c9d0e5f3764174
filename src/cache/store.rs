//! Durable storage backends for the second cache tier
//!
//! The cache only needs a string key-value surface. [`FileStore`] keeps one
//! JSON file per key in an XDG cache directory; [`MemoryStore`] keeps items in
//! process memory for tests and runtimes without storage.

use directories::ProjectDirs;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced by a durable store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The store cannot be used in this runtime
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Generic persistent key-value surface backing the durable tier
pub trait DurableStore: Send + Sync + std::fmt::Debug {
    /// Returns the item stored under `key`, if any
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous item
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`; removing a missing key succeeds
    fn remove_item(&self, key: &str) -> Result<(), StoreError>;

    /// Lists every stored key
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Stores items as files in a cache directory
///
/// Uses `~/.cache/trailhead/` on Linux, or the equivalent XDG path elsewhere.
/// File names are the hex-encoded key so arbitrary keys are safe on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where item files are stored
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store in the XDG-compliant cache directory
    ///
    /// Returns `None` if the directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "trailhead")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a store in a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Directory the store writes to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

impl DurableStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.item_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.item_path(key), value)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.item_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            // Foreign files that are not hex-encoded keys are skipped
            if let Some(key) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(decode_key)
            {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

/// Keeps items in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether no items are stored
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.items.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.items.read().keys().cloned().collect())
    }
}

fn encode_key(key: &str) -> String {
    key.bytes().map(|b| format!("{b:02x}")).collect()
}

fn decode_key(encoded: &str) -> Option<String> {
    if encoded.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(encoded.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
