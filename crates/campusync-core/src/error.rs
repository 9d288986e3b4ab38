//! Core error types for campusync-core.
//!
//! Every subsystem has its own `thiserror` enum; [`CoreError`] wraps them all
//! for callers that just want one error type.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for campusync-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Action replay errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Fetch/network errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Event bus errors
    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    /// Cache install/activate errors
    #[error("Cache lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Durable key-value storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the backing database
    #[error("Failed to open storage at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Read or write against the backend failed
    #[error("Storage backend failure on key '{key}': {message}")]
    Backend { key: String, message: String },

    /// Stored value could not be encoded/decoded
    #[error("Corrupt value under key '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A lock guarding the store was poisoned by a panicking writer
    #[error("Storage lock poisoned")]
    Poisoned,

    /// Storage is locked by another process
    #[error("Storage is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Errors produced while replaying a pending action against the server.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Server answered with a non-success status
    #[error("Server rejected action {id} with status {status}")]
    Rejected { id: String, status: u16 },

    /// Request never produced a response
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Invalid endpoint configuration
    #[error("Invalid sync endpoint '{0}'")]
    InvalidEndpoint(String),
}

/// Network failures seen by the fetch interceptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Connection could not be established or was dropped
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    /// Platform-level timeout fired
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Request URL is not fetchable
    #[error("Invalid request URL '{0}'")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout(err.to_string())
        } else {
            NetworkError::Unreachable(err.to_string())
        }
    }
}

/// Event bus errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// The bus was shut down; no new listeners are accepted
    #[error("Event bus is closed")]
    Closed,
}

/// Cache install/activate errors.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A precache URL could not be fetched
    #[error("Failed to precache {url}: {source}")]
    PrecacheFailed {
        url: String,
        #[source]
        source: NetworkError,
    },

    /// A precache URL answered with a non-OK status
    #[error("Precache of {url} returned status {status}")]
    PrecacheStatus { url: String, status: u16 },

    /// Precache URL could not be resolved against the origin
    #[error("Invalid precache URL '{0}'")]
    InvalidUrl(String),

    /// The installed entries could not be persisted
    #[error("Failed to store app shell: {0}")]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg)
                if code.code == rusqlite::ErrorCode::DatabaseLocked
                    || code.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                StorageError::Locked
            }
            _ => StorageError::Backend {
                key: String::new(),
                message: err.to_string(),
            },
        }
    }
}
