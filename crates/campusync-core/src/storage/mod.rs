mod config;
pub mod kv;

pub use config::{
    CacheConfig, Config, InstallPromptConfig, NetworkConfig, StorageConfig, SyncConfig,
};
pub use kv::{KeyValueStore, MemoryStore, SqliteStore};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/campusync[-dev]/` based on CAMPUSYNC_ENV.
///
/// Set CAMPUSYNC_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("CAMPUSYNC_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("campusync-dev")
    } else {
        base_dir.join("campusync")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
