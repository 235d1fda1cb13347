//! Pluggable keyed persistence.
//!
//! A [`DocumentStore`](crate::store::DocumentStore) is handed one [`Storage`]
//! at construction and every document without an explicit file location
//! persists through it, keyed by its identity.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::StorageError;

/// Bytes escaped in on-disk key names.
const KEY_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Key-value persistence backend.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Read the bytes stored under `key`, if any.
    fn read(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `bytes` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the value.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Remove the value under `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot remove the value.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All keys currently stored.
    fn keys(&self) -> Vec<String>;
}

/// In-memory storage, mostly for tests and scratch stores.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.values
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.values
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.values
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

/// Filesystem storage: one `<key>.json` file per key in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    dir: PathBuf,
}

impl DirectoryStorage {
    /// Open (and create if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The backing directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", escape_key(key)))
    }
}

impl Storage for DirectoryStorage {
    fn read(&self, key: &str) -> Option<Vec<u8>> {
        std::fs::read(self.path_for(key)).ok()
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        std::fs::write(self.path_for(key), bytes)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).and_then(unescape_key))
            .collect();
        keys.sort();
        keys
    }
}

/// Where a single document persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// Under this key in the store's injected [`Storage`].
    Keyed(String),
    /// In this file, independent of the store's storage.
    File(PathBuf),
}

impl StorageLocation {
    pub(crate) fn read(&self, storage: &dyn Storage) -> Option<Vec<u8>> {
        match self {
            Self::Keyed(key) => storage.read(key),
            Self::File(path) => std::fs::read(path).ok(),
        }
    }

    pub(crate) fn write(&self, storage: &dyn Storage, bytes: &[u8]) -> Result<(), StorageError> {
        match self {
            Self::Keyed(key) => storage.write(key, bytes),
            Self::File(path) => std::fs::write(path, bytes).map_err(StorageError::from),
        }
    }

    pub(crate) fn remove(&self, storage: &dyn Storage) -> Result<(), StorageError> {
        match self {
            Self::Keyed(key) => storage.remove(key),
            Self::File(path) => match std::fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
        }
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keyed(key) => write!(f, "key {key}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Escape a storage key for use as a filename.
///
/// Alphanumerics, `-`, `_` and `.` pass through; every other byte is
/// percent-encoded, so distinct keys never share a file.
fn escape_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ESCAPES).to_string()
}

fn unescape_key(stem: &str) -> Option<String> {
    percent_decode_str(stem)
        .decode_utf8()
        .ok()
        .map(std::borrow::Cow::into_owned)
}
