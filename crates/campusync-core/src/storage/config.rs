//! TOML-based application configuration.
//!
//! Stores settings for:
//! - The application origin and API namespace
//! - Cache generation naming and the app-shell precache list
//! - Sync endpoint, registration tag and status display windows
//! - Install prompt cooldown
//!
//! Configuration is stored at `~/.config/campusync/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;

/// Where the app lives and how API requests are recognized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Path requested by the reachability probe.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

/// Cache generation naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
    /// Bumping this invalidates the static and data generations on next activate.
    #[serde(default = "default_cache_version")]
    pub version: String,
    /// Paths written into the app-shell generation at install.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,
}

/// Background sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_sync_tag")]
    pub tag: String,
    /// How long `completed` stays visible before returning to `idle`.
    #[serde(default = "default_completed_display_ms")]
    pub completed_display_ms: u64,
    /// Cosmetic upper bound on how long `syncing` is shown.
    #[serde(default = "default_syncing_timeout_ms")]
    pub syncing_timeout_ms: u64,
}

/// Durable storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Prefix for every key this app writes.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

/// Install prompt settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallPromptConfig {
    #[serde(default = "default_cooldown_days")]
    pub cooldown_days: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/campusync/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub install_prompt: InstallPromptConfig,
}

// Default functions
fn default_origin() -> String {
    "http://localhost:3000".into()
}
fn default_api_prefix() -> String {
    "/api/".into()
}
fn default_probe_path() -> String {
    "/".into()
}
fn default_probe_interval_secs() -> u64 {
    15
}
fn default_cache_prefix() -> String {
    "campusync".into()
}
fn default_cache_version() -> String {
    "v1".into()
}
fn default_precache() -> Vec<String> {
    vec![
        "/".into(),
        "/offline".into(),
        "/offline.html".into(),
        "/manifest.json".into(),
    ]
}
fn default_sync_endpoint() -> String {
    "http://localhost:3000/api/sync".into()
}
fn default_sync_tag() -> String {
    crate::sync::SYNC_TAG.into()
}
fn default_completed_display_ms() -> u64 {
    3000
}
fn default_syncing_timeout_ms() -> u64 {
    10_000
}
fn default_namespace() -> String {
    "campusync".into()
}
fn default_cooldown_days() -> u32 {
    7
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            api_prefix: default_api_prefix(),
            probe_path: default_probe_path(),
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: default_cache_prefix(),
            version: default_cache_version(),
            precache: default_precache(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: default_sync_endpoint(),
            tag: default_sync_tag(),
            completed_display_ms: default_completed_display_ms(),
            syncing_timeout_ms: default_syncing_timeout_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
        }
    }
}

impl Default for InstallPromptConfig {
    fn default() -> Self {
        Self {
            cooldown_days: default_cooldown_days(),
        }
    }
}

impl SyncConfig {
    pub fn completed_display(&self) -> Duration {
        Duration::from_millis(self.completed_display_ms)
    }

    pub fn syncing_timeout(&self) -> Duration {
        Duration::from_millis(self.syncing_timeout_ms)
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default config path.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default path, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "falling back to default configuration");
                Self::default()
            }
        }
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without persisting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Storage key for a component, e.g. `campusync:pending-actions`.
    pub fn storage_key(&self, suffix: &str) -> String {
        format!("{}:{}", self.storage.namespace, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.network.api_prefix, "/api/");
        assert_eq!(parsed.sync.completed_display_ms, 3000);
        assert_eq!(parsed.cache.precache, cfg.cache.precache);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[cache]\nversion = \"v7\"\n").unwrap();
        assert_eq!(parsed.cache.version, "v7");
        assert_eq!(parsed.cache.prefix, "campusync");
        assert_eq!(parsed.sync.tag, "sync-updates");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("sync.tag").as_deref(), Some("sync-updates"));
        assert_eq!(cfg.get("sync.completed_display_ms").as_deref(), Some("3000"));
        assert!(cfg.get("sync.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("cache.version", "v2").unwrap();
        cfg.set("install_prompt.cooldown_days", "14").unwrap();
        cfg.set("cache.precache", r#"["/","/offline"]"#).unwrap();
        assert_eq!(cfg.cache.version, "v2");
        assert_eq!(cfg.install_prompt.cooldown_days, 14);
        assert_eq!(cfg.cache.precache.len(), 2);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("sync.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn set_rejects_invalid_number() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("sync.completed_display_ms", "soon"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.storage.namespace, "campusync");

        let mut changed = cfg.clone();
        changed.set("network.origin", "https://campus.example").unwrap();
        changed.save_to(&path).unwrap();
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.network.origin, "https://campus.example");
    }

    #[test]
    fn storage_key_uses_namespace() {
        let cfg = Config::default();
        assert_eq!(cfg.storage_key("pending-actions"), "campusync:pending-actions");
    }
}
