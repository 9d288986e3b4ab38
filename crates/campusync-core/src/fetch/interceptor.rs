//! Request routing between network and cache.
//!
//! API requests (path under `network.api_prefix`) are network-first with the
//! data generation as backup. Everything else is cache-first across every
//! generation, filling the static generation from the network on a miss.
//! Failed navigations fall back to a cached offline page.

use std::sync::Arc;

use url::Url;

use super::cache::{CacheGenerations, CacheStorage};
use super::network::Network;
use super::request::{Request, Response, ResponseSource, ResponseType};
use crate::error::NetworkError;
use crate::storage::Config;

/// Pages tried, in order, when a navigation cannot be served.
pub const OFFLINE_FALLBACKS: [&str; 3] = ["/offline", "/offline.html", "/"];

/// Extensions eligible for the static generation.
pub const STATIC_EXTENSIONS: &[&str] = &[
    ".js", ".mjs", ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico", ".avif",
];

const OFFLINE_MESSAGE: &str =
    "You are offline. This change has been saved and will sync when the connection returns.";

pub struct FetchInterceptor {
    cache: CacheStorage,
    network: Arc<dyn Network>,
    generations: CacheGenerations,
    origin: Url,
    api_prefix: String,
}

impl FetchInterceptor {
    pub fn new(
        config: &Config,
        cache: CacheStorage,
        network: Arc<dyn Network>,
    ) -> Result<Self, NetworkError> {
        let origin = Url::parse(&config.network.origin)
            .map_err(|e| NetworkError::InvalidUrl(format!("{}: {e}", config.network.origin)))?;
        Ok(Self {
            cache,
            network,
            generations: CacheGenerations::from_config(&config.cache),
            origin,
            api_prefix: config.network.api_prefix.clone(),
        })
    }

    pub fn cache(&self) -> &CacheStorage {
        &self.cache
    }

    pub fn generations(&self) -> &CacheGenerations {
        &self.generations
    }

    pub fn is_api(&self, request: &Request) -> bool {
        request.url.path().starts_with(&self.api_prefix)
    }

    /// Answer `request`. Never fails: offline conditions become responses.
    pub async fn handle(&self, request: &Request) -> Response {
        if self.is_api(request) {
            tracing::debug!(url = %request.url, method = %request.method, "network-first");
            self.network_first(request).await
        } else {
            tracing::debug!(url = %request.url, method = %request.method, "cache-first");
            self.cache_first(request).await
        }
    }

    async fn network_first(&self, request: &Request) -> Response {
        match self.network.fetch(request).await {
            Ok(response) => {
                if request.is_get() {
                    self.store(&self.generations.data, request, &response);
                }
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "api request failed");
                let cached = request
                    .is_get()
                    .then(|| self.cache.match_in(&self.generations.data, request.cache_key()))
                    .flatten();
                if let Some(hit) = cached {
                    return hit.with_source(ResponseSource::Cache);
                }
                offline_api_response(request)
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> Response {
        if request.is_get() {
            if let Some(hit) = self.cache.match_url(request.cache_key()) {
                return hit.with_source(ResponseSource::Cache);
            }
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if request.is_get()
                    && response.kind == ResponseType::Basic
                    && response.status == 200
                    && is_static_asset(&request.url)
                {
                    self.store(&self.generations.static_assets, request, &response);
                }
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network unavailable");
                if request.is_navigation() {
                    if let Some(page) = self.offline_page() {
                        return page;
                    }
                }
                Response::text(request.url.as_str(), 503, "Offline")
            }
        }
    }

    /// A response that cannot be cached is still served.
    fn store(&self, generation: &str, request: &Request, response: &Response) {
        if let Err(e) = self.cache.put(generation, request.cache_key(), response.clone()) {
            tracing::warn!(
                cache = %generation,
                url = %request.url,
                error = %e,
                "cache write failed"
            );
        }
    }

    /// First cached page of the fallback chain.
    fn offline_page(&self) -> Option<Response> {
        OFFLINE_FALLBACKS.iter().find_map(|path| {
            let url = self.origin.join(path).ok()?;
            let page = self.cache.match_url(url.as_str())?;
            tracing::info!(fallback = *path, "serving offline fallback");
            Some(page.with_source(ResponseSource::OfflineFallback))
        })
    }
}

fn offline_api_response(request: &Request) -> Response {
    let body = serde_json::json!({
        "error": "offline",
        "offline": true,
        "queued": true,
        "message": OFFLINE_MESSAGE,
    });
    Response::json(request.url.as_str(), 503, &body)
}

pub fn is_static_asset(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
