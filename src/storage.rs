use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Browsers cap `localStorage` at roughly 5 MiB per origin.
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access storage file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage file {path:?} is not a JSON object of strings: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage quota exceeded writing {key:?}: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { key: String, needed: u64, quota: u64 },
}

/// String key-value persistence, shaped like the browser's `localStorage`.
///
/// Everything that persists comments goes through this port so that tests can
/// substitute [`MemoryStorage`] for the on-disk [`FileStorage`].
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

fn entries_size(entries: &BTreeMap<String, String>) -> u64 {
    entries.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum()
}

fn check_quota(
    entries: &BTreeMap<String, String>,
    key: &str,
    value: &str,
    quota: Option<u64>,
) -> Result<(), StorageError> {
    let Some(quota) = quota else {
        return Ok(());
    };

    let current = entries_size(entries);
    let replaced = entries
        .get(key)
        .map(|old| (key.len() + old.len()) as u64)
        .unwrap_or(0);
    let needed = current - replaced + (key.len() + value.len()) as u64;

    if needed > quota {
        return Err(StorageError::QuotaExceeded {
            key: key.to_string(),
            needed,
            quota,
        });
    }
    Ok(())
}

/// A JSON object file on disk holding string values, written atomically on
/// every `set`.
pub struct FileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    quota: Option<u64>,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = if path.exists() {
            Self::read_entries(&path)?
        } else {
            debug!("Storage file {path:?} does not exist yet, starting empty");
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries,
            quota: Some(DEFAULT_QUOTA_BYTES),
        })
    }

    /// Opens the storage, moving an unreadable file aside to `<file>.corrupt`
    /// and starting empty instead of failing.
    pub fn open_or_recover(path: impl Into<PathBuf>) -> Result<(Self, Option<String>), StorageError> {
        let path = path.into();
        match Self::open(path.clone()) {
            Ok(storage) => Ok((storage, None)),
            Err(err @ StorageError::Format { .. }) => {
                let backup = corrupt_backup_path(&path);
                warn!("{err}; moving it to {backup:?}");
                fs::rename(&path, &backup).map_err(|source| StorageError::Io {
                    path: path.clone(),
                    source,
                })?;
                let storage = Self::open(path)?;
                Ok((
                    storage,
                    Some(format!("Storage was unreadable, saved a copy to {}", backup.display())),
                ))
            }
            Err(err) => Err(err),
        }
    }

    pub fn with_quota(mut self, quota: Option<u64>) -> Self {
        self.quota = quota;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(path: &Path) -> Result<BTreeMap<String, String>, StorageError> {
        let content = fs::read_to_string(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|source| StorageError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(entries).map_err(|source| StorageError::Format {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        debug!("Wrote {} storage entries to {:?}", entries.len(), self.path);
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        check_quota(&self.entries, key, value, self.quota)?;

        let mut next = self.entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.write_entries(&next)?;
        self.entries = next;
        Ok(())
    }
}

fn corrupt_backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".corrupt");
    path.with_file_name(name)
}

/// In-memory storage, used by tests and by the HTML export when no storage
/// file is wanted.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
    quota: Option<u64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_quota(mut self, quota: u64) -> Self {
        self.quota = Some(quota);
        self
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        check_quota(&self.entries, key, value, self.quota)?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
