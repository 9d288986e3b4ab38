//! Install and activate steps for the cache generations.

use std::sync::Arc;

use url::Url;

use super::cache::{CacheGenerations, CacheStorage};
use super::network::Network;
use super::request::Request;
use crate::error::LifecycleError;
use crate::storage::Config;

pub struct CacheLifecycle {
    cache: CacheStorage,
    network: Arc<dyn Network>,
    generations: CacheGenerations,
    origin: String,
    precache: Vec<String>,
}

impl CacheLifecycle {
    pub fn new(config: &Config, cache: CacheStorage, network: Arc<dyn Network>) -> Self {
        Self {
            cache,
            network,
            generations: CacheGenerations::from_config(&config.cache),
            origin: config.network.origin.clone(),
            precache: config.cache.precache.clone(),
        }
    }

    /// Fetch the precache list into the app-shell generation.
    ///
    /// Nothing is written unless every URL answers 2xx. Returns the number of
    /// entries stored.
    pub async fn install(&self) -> Result<usize, LifecycleError> {
        let origin = Url::parse(&self.origin)
            .map_err(|e| LifecycleError::InvalidUrl(format!("{}: {e}", self.origin)))?;

        let mut fetched = Vec::with_capacity(self.precache.len());
        for path in &self.precache {
            let url = origin
                .join(path)
                .map_err(|e| LifecycleError::InvalidUrl(format!("{path}: {e}")))?;
            let response = self
                .network
                .fetch(&Request::get(url.clone()))
                .await
                .map_err(|source| LifecycleError::PrecacheFailed {
                    url: url.to_string(),
                    source,
                })?;
            if !response.ok() {
                return Err(LifecycleError::PrecacheStatus {
                    url: url.to_string(),
                    status: response.status,
                });
            }
            fetched.push((url.to_string(), response));
        }

        let count = fetched.len();
        self.cache.put_all(&self.generations.shell, fetched)?;
        tracing::info!(cache = %self.generations.shell, count, "app shell installed");
        Ok(count)
    }

    /// Delete every generation that is not current. The app shell is kept.
    /// Returns the deleted names; a generation that cannot be deleted is
    /// retried on the next activation.
    pub fn activate(&self) -> Vec<String> {
        let mut deleted = Vec::new();
        for name in self.cache.keys() {
            if self.generations.keeps(&name) {
                continue;
            }
            match self.cache.delete(&name) {
                Ok(_) => {
                    tracing::info!(cache = %name, "deleted stale cache generation");
                    deleted.push(name);
                }
                Err(e) => tracing::warn!(cache = %name, error = %e, "stale generation not deleted"),
            }
        }
        deleted
    }
}
