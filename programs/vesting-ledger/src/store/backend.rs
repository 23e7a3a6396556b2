//! Key-value persistence media the schedule store runs on.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anchor_lang::prelude::*;

use crate::error::LedgerError;

/// Byte-oriented key-value medium.
pub trait KeyValueStore: Send + Sync {
    /// Whether `set` can accept `key` at all. Media with a restricted key
    /// alphabet override this.
    fn accepts_key(&self, _key: &str) -> bool {
        true
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the value at `key`. A failed set leaves the previous value intact.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;

    fn keys(&self) -> Result<Vec<String>>;
}

/// In-process map with an optional byte quota, like browser local storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes that would push total key+value bytes past `quota_bytes` are rejected.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries.lock().map_err(|_| {
            msg!("memory store lock poisoned");
            error!(LedgerError::StorageReadFailure)
        })
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.lock()?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                msg!("quota exceeded writing {} ({} bytes)", key, value.len());
                return err!(LedgerError::StorageWriteFailure);
            }
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

/// One file per key under a directory. Values are written to a temp file
/// and renamed into place.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

const VALUE_EXT: &str = "bin";
const TEMP_EXT: &str = "tmp";

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            msg!("cannot create storage dir {}: {}", dir.display(), e);
            error!(LedgerError::StorageWriteFailure)
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str, ext: &str) -> Result<PathBuf> {
        require!(self.accepts_key(key), LedgerError::StorageWriteFailure);
        Ok(self.dir.join(format!("{key}.{ext}")))
    }
}

impl KeyValueStore for FileStore {
    /// Keys become file names, so only `[A-Za-z0-9_-]+` is allowed.
    fn accepts_key(&self, key: &str) -> bool {
        !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key, VALUE_EXT)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                msg!("read {} failed: {}", path.display(), e);
                err!(LedgerError::StorageReadFailure)
            }
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key, VALUE_EXT)?;
        let tmp = self.path_for(key, TEMP_EXT)?;

        let written = fs::File::create(&tmp)
            .and_then(|mut f| {
                f.write_all(value)?;
                f.sync_all()
            })
            .and_then(|_| fs::rename(&tmp, &path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            msg!("write {} failed: {}", path.display(), e);
            return err!(LedgerError::StorageWriteFailure);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key, VALUE_EXT)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                msg!("remove {} failed: {}", path.display(), e);
                err!(LedgerError::StorageWriteFailure)
            }
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            msg!("list {} failed: {}", self.dir.display(), e);
            error!(LedgerError::StorageReadFailure)
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|_| error!(LedgerError::StorageReadFailure))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
