//! Identity-keyed durable cache: one JSON blob per identity.
//!
//! Read fallback for offline/unauthenticated use and write-through mirror on
//! every flush attempt.

use log::warn;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::CacheError;
use crate::identity::IdentityKey;
use crate::profile::FinancialProfile;

/// Durable, identity-keyed profile store. One entry per identity; entries for
/// different identities are never visible under each other's keys.
pub trait LocalCacheStore: Send + Sync {
    fn get(&self, identity: &IdentityKey) -> Result<Option<FinancialProfile>, CacheError>;
    fn set(&self, identity: &IdentityKey, profile: &FinancialProfile) -> Result<(), CacheError>;
    fn clear(&self, identity: &IdentityKey) -> Result<(), CacheError>;
}

/// File-backed cache: `profile-<storage_key>.json` under a base directory.
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, identity: &IdentityKey) -> PathBuf {
        self.dir
            .join(format!("profile-{}.json", identity.storage_key()))
    }

    fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl LocalCacheStore for FileCacheStore {
    fn get(&self, identity: &IdentityKey) -> Result<Option<FinancialProfile>, CacheError> {
        let path = self.entry_path(identity);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str(&contents) {
            Ok(profile) => Ok(Some(profile)),
            // A corrupt entry degrades to "absent"; the cache is a
            // best-effort fallback, not a source of hard failures.
            Err(err) => {
                warn!(
                    "[ProfileCache] Discarding unreadable cache entry for {}: {}",
                    identity, err
                );
                Ok(None)
            }
        }
    }

    fn set(&self, identity: &IdentityKey, profile: &FinancialProfile) -> Result<(), CacheError> {
        let contents = serde_json::to_vec(profile)?;
        Self::write_atomic(&self.entry_path(identity), &contents)
    }

    fn clear(&self, identity: &IdentityKey) -> Result<(), CacheError> {
        match fs::remove_file(self.entry_path(identity)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory cache for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, FinancialProfile>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCacheStore for MemoryCacheStore {
    fn get(&self, identity: &IdentityKey) -> Result<Option<FinancialProfile>, CacheError> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(&identity.storage_key()).cloned())
    }

    fn set(&self, identity: &IdentityKey, profile: &FinancialProfile) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(identity.storage_key(), profile.clone());
        Ok(())
    }

    fn clear(&self, identity: &IdentityKey) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(&identity.storage_key());
        Ok(())
    }
}
