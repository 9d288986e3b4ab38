//! Durable queue of mutations attempted while offline.

use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::StorageError;
use crate::events::{Event, EventBus};
use crate::storage::KeyValueStore;
use crate::sync::types::PendingAction;

/// Key suffix under the storage namespace.
pub const PENDING_ACTIONS_KEY: &str = "pending-actions";

/// Ordered, durable list of [`PendingAction`]s.
///
/// The whole list lives as one JSON array under a single key. Clones share
/// the same store and the same write lock, so read-modify-write cycles from
/// different handles never interleave within a process.
#[derive(Clone)]
pub struct PendingActionQueue {
    store: Arc<dyn KeyValueStore>,
    key: String,
    bus: EventBus,
    write_lock: Arc<Mutex<()>>,
}

impl PendingActionQueue {
    /// Create a queue stored under `key`.
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, bus: EventBus) -> Self {
        Self {
            store,
            key: key.into(),
            bus,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Record a new action and persist it before returning.
    ///
    /// # Errors
    /// Returns the storage error if the queue could not be read back or written.
    pub fn enqueue(
        &self,
        action: &str,
        data: serde_json::Value,
    ) -> Result<PendingAction, StorageError> {
        let entry = PendingAction::new(action, data);
        let pending = self.mutate(|entries| {
            entries.push(entry.clone());
        })?;
        tracing::info!(id = %entry.id, action = %entry.action, pending, "queued pending action");
        Ok(entry)
    }

    /// All entries in insertion order. Unreadable data yields an empty list.
    pub fn list(&self) -> Vec<PendingAction> {
        match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    key = %self.key,
                    error = %e,
                    "pending actions unreadable, treating as empty"
                );
                Vec::new()
            }
        }
    }

    /// Entries not yet confirmed by the server, in insertion order.
    pub fn unsynced(&self) -> Vec<PendingAction> {
        self.list().into_iter().filter(|a| !a.synced).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.list().iter().filter(|a| !a.synced).count()
    }

    /// Delete the entry with `id`. Absent ids are a no-op.
    pub fn remove(&self, id: &str) -> Result<(), StorageError> {
        let mut found = false;
        self.mutate(|entries| {
            let before = entries.len();
            entries.retain(|a| a.id != id);
            found = entries.len() != before;
        })?;
        if !found {
            tracing::debug!(id, "remove: no such pending action");
        }
        Ok(())
    }

    /// Flag `id` as delivered. Returns whether the entry existed.
    pub fn mark_synced(&self, id: &str) -> Result<bool, StorageError> {
        let mut found = false;
        self.mutate(|entries| {
            if let Some(entry) = entries.iter_mut().find(|a| a.id == id) {
                entry.synced = true;
                found = true;
            }
        })?;
        Ok(found)
    }

    /// Drop every entry already marked synced. Returns how many were dropped.
    pub fn purge_synced(&self) -> Result<usize, StorageError> {
        let mut purged = 0;
        self.mutate(|entries| {
            let before = entries.len();
            entries.retain(|a| !a.synced);
            purged = before - entries.len();
        })?;
        Ok(purged)
    }

    /// Remove the whole queue.
    pub fn clear(&self) -> Result<(), StorageError> {
        let guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        self.store.delete(&self.key)?;
        drop(guard);
        self.notify(0);
        Ok(())
    }

    fn load(&self) -> Result<Vec<PendingAction>, StorageError> {
        match self.store.get(&self.key)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                key: self.key.clone(),
                source,
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Load, edit and persist under the write lock; publishes the new pending count.
    fn mutate<F>(&self, edit: F) -> Result<usize, StorageError>
    where
        F: FnOnce(&mut Vec<PendingAction>),
    {
        let guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut entries = self.load()?;
        edit(&mut entries);
        let raw = serde_json::to_string(&entries).map_err(|source| StorageError::Corrupt {
            key: self.key.clone(),
            source,
        })?;
        if let Err(e) = self.store.set(&self.key, &raw) {
            tracing::error!(key = %self.key, error = %e, "failed to persist pending actions");
            return Err(e);
        }
        drop(guard);

        let pending = entries.iter().filter(|a| !a.synced).count();
        self.notify(pending);
        Ok(pending)
    }

    fn notify(&self, pending: usize) {
        self.bus.publish(Event::QueueChanged {
            pending,
            at: Utc::now(),
        });
    }
}
