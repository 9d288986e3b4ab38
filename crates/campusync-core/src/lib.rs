//! # Campusync Core Library
//!
//! Offline-first synchronization for the Campusync project-management app.
//! Every operation is available through the `campusync-cli` binary; other
//! front ends are thin layers over this crate.
//!
//! ## Architecture
//!
//! - **Pending-Action Queue**: durable, ordered record of mutations attempted
//!   while offline
//! - **Connection Monitor**: online/offline state and the user-facing sync
//!   status machine
//! - **Fetch Interceptor**: network-first for API calls, cache-first for
//!   everything else, with an offline fallback page for navigations
//! - **Background Sync**: drains the queue against the server once
//!   connectivity returns
//!
//! ## Key Components
//!
//! - [`OfflineRuntime`]: owns and wires every component for one session
//! - [`PendingActionQueue`], [`ConnectionMonitor`], [`BackgroundSync`]
//! - [`FetchInterceptor`] and [`CacheLifecycle`]
//! - [`EventBus`]: typed publish/subscribe between components
//! - [`Config`]: TOML configuration

pub mod error;
pub mod events;
pub mod fetch;
pub mod install_prompt;
pub mod runtime;
pub mod storage;
pub mod sync;

pub use error::{
    ConfigError, CoreError, EventBusError, LifecycleError, NetworkError, StorageError, SyncError,
};
pub use events::{Event, EventBus, EventKind, Subscription};
pub use fetch::{CacheLifecycle, CacheStorage, FetchInterceptor, Request, Response, ResponseSource};
pub use install_prompt::InstallPrompt;
pub use runtime::{OfflineRuntime, OfflineRuntimeBuilder};
pub use storage::{Config, KeyValueStore, MemoryStore, SqliteStore};
pub use sync::{
    BackgroundSync, ConnectionMonitor, ConnectionState, ConnectionStatus, DrainOutcome,
    DrainReport, PendingAction, PendingActionQueue, SyncStatus,
};
