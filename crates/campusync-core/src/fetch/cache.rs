//! Named response caches ("generations") keyed by exact request URL.
//!
//! [`CacheStorage::persistent`] writes every change through to a
//! [`KeyValueStore`], so generations outlive the process:
//!
//! - `<prefix>:index` holds the JSON array of generation names
//! - `<prefix>:gen:<name>` holds one generation's entries keyed by URL
//!
//! [`CacheStorage::new`] keeps everything in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::Response;
use crate::error::StorageError;
use crate::storage::{CacheConfig, KeyValueStore};

/// Key suffix under which cache generations are persisted.
pub const CACHE_STORAGE_KEY: &str = "cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEntry {
    response: Response,
    cached_at: DateTime<Utc>,
}

/// One named cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cache {
    entries: BTreeMap<String, CachedEntry>,
}

impl Cache {
    fn put(&mut self, url: &str, response: Response) {
        self.entries.insert(
            url.to_string(),
            CachedEntry {
                response,
                cached_at: Utc::now(),
            },
        );
    }

    fn match_url(&self, url: &str) -> Option<&Response> {
        self.entries.get(url).map(|e| &e.response)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Durable side of a [`CacheStorage`].
struct Backing {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl fmt::Debug for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backing").field("prefix", &self.prefix).finish()
    }
}

impl Backing {
    fn index_key(&self) -> String {
        format!("{}:index", self.prefix)
    }

    fn generation_key(&self, name: &str) -> String {
        format!("{}:gen:{name}", self.prefix)
    }

    fn load(&self) -> Result<BTreeMap<String, Cache>, StorageError> {
        let index_key = self.index_key();
        let names: Vec<String> = match self.store.get(&index_key)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                key: index_key,
                source,
            })?,
            None => Vec::new(),
        };

        let mut caches = BTreeMap::new();
        for name in names {
            let key = self.generation_key(&name);
            let cache = match self.store.get(&key)? {
                Some(raw) => serde_json::from_str(&raw)
                    .map_err(|source| StorageError::Corrupt { key, source })?,
                None => Cache::default(),
            };
            caches.insert(name, cache);
        }
        Ok(caches)
    }

    fn write_generation(&self, name: &str, cache: &Cache) -> Result<(), StorageError> {
        let key = self.generation_key(name);
        let raw = serde_json::to_string(cache).map_err(|source| StorageError::Corrupt {
            key: key.clone(),
            source,
        })?;
        self.store.set(&key, &raw)
    }

    fn write_index<'a>(&self, names: impl Iterator<Item = &'a str>) -> Result<(), StorageError> {
        let key = self.index_key();
        let names: BTreeSet<&str> = names.collect();
        let raw = serde_json::to_string(&names).map_err(|source| StorageError::Corrupt {
            key: key.clone(),
            source,
        })?;
        self.store.set(&key, &raw)
    }

    fn remove_generation(&self, name: &str) -> Result<(), StorageError> {
        self.store.delete(&self.generation_key(name))
    }
}

/// All generations for one app. Clones share the same storage.
///
/// Lookups return clones so a cached body is never handed out twice. Writes
/// reach the durable store before they become visible; a failed write leaves
/// the cache as it was.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    caches: Arc<Mutex<BTreeMap<String, Cache>>>,
    backing: Option<Arc<Backing>>,
}

impl CacheStorage {
    /// In-memory caches that vanish with the process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches persisted in `store` under `prefix`, loading what an earlier
    /// session left there.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or holds corrupt entries.
    pub fn persistent(
        store: Arc<dyn KeyValueStore>,
        prefix: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let backing = Backing {
            store,
            prefix: prefix.into(),
        };
        let caches = backing.load()?;
        tracing::debug!(
            prefix = %backing.prefix,
            generations = caches.len(),
            "cache storage loaded"
        );
        Ok(Self {
            caches: Arc::new(Mutex::new(caches)),
            backing: Some(Arc::new(backing)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Cache>> {
        self.caches.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `edit` to a copy of the named cache, persist it, then swap it in.
    fn update<F>(&self, name: &str, edit: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Cache),
    {
        let mut caches = self.lock();
        let created = !caches.contains_key(name);
        let mut cache = caches.get(name).cloned().unwrap_or_default();
        edit(&mut cache);

        if let Some(backing) = &self.backing {
            backing.write_generation(name, &cache)?;
            if created {
                backing.write_index(caches.keys().map(String::as_str).chain([name]))?;
            }
        }
        caches.insert(name.to_string(), cache);
        Ok(())
    }

    /// Create the named cache if it does not exist.
    pub fn open(&self, name: &str) -> Result<(), StorageError> {
        if self.has(name) {
            return Ok(());
        }
        self.update(name, |_| {})
    }

    pub fn has(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Store a response under `url`, replacing any previous entry.
    pub fn put(&self, name: &str, url: &str, response: Response) -> Result<(), StorageError> {
        self.update(name, |cache| cache.put(url, response))
    }

    /// Store every pair or none, in one step.
    pub fn put_all(
        &self,
        name: &str,
        entries: Vec<(String, Response)>,
    ) -> Result<(), StorageError> {
        self.update(name, |cache| {
            for (url, response) in entries {
                cache.put(&url, response);
            }
        })
    }

    /// Exact-URL lookup in one cache.
    pub fn match_in(&self, name: &str, url: &str) -> Option<Response> {
        self.lock().get(name)?.match_url(url).cloned()
    }

    /// Exact-URL lookup across every cache.
    pub fn match_url(&self, url: &str) -> Option<Response> {
        self.lock()
            .values()
            .find_map(|cache| cache.match_url(url))
            .cloned()
    }

    /// When `url` was stored in `name`.
    pub fn cached_at(&self, name: &str, url: &str) -> Option<DateTime<Utc>> {
        self.lock().get(name)?.entries.get(url).map(|e| e.cached_at)
    }

    /// Drop a whole generation. Returns false if it did not exist.
    pub fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut caches = self.lock();
        if !caches.contains_key(name) {
            return Ok(false);
        }
        if let Some(backing) = &self.backing {
            backing.write_index(caches.keys().map(String::as_str).filter(|n| *n != name))?;
            // Unindexed entries are never loaded, so a leftover key is harmless.
            if let Err(e) = backing.remove_generation(name) {
                tracing::warn!(cache = %name, error = %e, "stale cache entries left in storage");
            }
        }
        caches.remove(name);
        Ok(true)
    }

    /// Names of every cache.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// URLs stored in one cache.
    pub fn urls(&self, name: &str) -> Vec<String> {
        self.lock()
            .get(name)
            .map(|cache| cache.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, name: &str) -> usize {
        self.lock().get(name).map(Cache::len).unwrap_or(0)
    }
}

/// Current generation names derived from the cache config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGenerations {
    pub static_assets: String,
    pub data: String,
    /// Unversioned; survives activation.
    pub shell: String,
}

impl CacheGenerations {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            static_assets: format!("{}-static-{}", config.prefix, config.version),
            data: format!("{}-data-{}", config.prefix, config.version),
            shell: format!("{}-shell", config.prefix),
        }
    }

    /// Whether `name` should survive activation.
    pub fn keeps(&self, name: &str) -> bool {
        name == self.static_assets || name == self.data || name == self.shell
    }
}
