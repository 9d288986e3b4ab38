//! Cache-tiered fetch interception.

pub mod cache;
pub mod interceptor;
pub mod lifecycle;
pub mod network;
pub mod request;

pub use cache::{CacheGenerations, CacheStorage, CACHE_STORAGE_KEY};
pub use interceptor::{FetchInterceptor, OFFLINE_FALLBACKS, STATIC_EXTENSIONS};
pub use lifecycle::CacheLifecycle;
pub use network::{HttpNetwork, Network, OfflineNetwork};
pub use request::{Request, RequestMode, Response, ResponseSource, ResponseType};
