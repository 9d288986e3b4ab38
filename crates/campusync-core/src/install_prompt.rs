//! "Add to home screen" prompt dismissal record.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::StorageError;
use crate::storage::{Config, KeyValueStore};

/// Key suffix under the storage namespace.
pub const DISMISSED_AT_KEY: &str = "install-prompt:dismissed-at";

/// Remembers when the install prompt was last dismissed and keeps it hidden
/// for the configured cooldown.
pub struct InstallPrompt {
    store: Arc<dyn KeyValueStore>,
    key: String,
    cooldown: Duration,
}

impl InstallPrompt {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self {
            store,
            key: config.storage_key(DISMISSED_AT_KEY),
            cooldown: Duration::days(i64::from(config.install_prompt.cooldown_days)),
        }
    }

    pub fn dismiss(&self) -> Result<DateTime<Utc>, StorageError> {
        self.dismiss_at(Utc::now())
    }

    pub fn dismiss_at(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>, StorageError> {
        self.store.set(&self.key, &at.to_rfc3339())?;
        tracing::debug!(%at, "install prompt dismissed");
        Ok(at)
    }

    /// Unreadable records count as never dismissed.
    pub fn last_dismissed(&self) -> Option<DateTime<Utc>> {
        let raw = match self.store.get(&self.key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "install prompt record unreadable");
                return None;
            }
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "install prompt record malformed");
                None
            }
        }
    }

    pub fn should_show(&self) -> bool {
        self.should_show_at(Utc::now())
    }

    pub fn should_show_at(&self, now: DateTime<Utc>) -> bool {
        self.last_dismissed()
            .map_or(true, |at| now - at >= self.cooldown)
    }

    pub fn reset(&self) -> Result<(), StorageError> {
        self.store.delete(&self.key)
    }
}
