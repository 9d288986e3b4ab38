//! Core types for offline synchronization.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A mutation recorded while offline, awaiting replay against the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    /// `<unix-millis>-<random suffix>`, unique per enqueue.
    pub id: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Server operation tag, e.g. `create-project`.
    pub action: String,
    /// Operation parameters.
    pub data: serde_json::Value,
    /// Set once the server has confirmed delivery.
    #[serde(default)]
    pub synced: bool,
}

impl PendingAction {
    /// Build a fresh, unsynced action stamped with the current time.
    pub fn new(action: impl Into<String>, data: serde_json::Value) -> Self {
        let timestamp = Utc::now();
        Self {
            id: generate_action_id(timestamp),
            timestamp,
            action: action.into(),
            data,
            synced: false,
        }
    }

    /// Body sent to the sync endpoint for this action.
    pub fn payload(&self) -> ReplayPayload<'_> {
        ReplayPayload {
            id: &self.id,
            timestamp: self.timestamp,
            action: &self.action,
            data: &self.data,
        }
    }
}

/// Wire shape of one replayed action: `{ id, timestamp, action, data }`.
#[derive(Debug, Serialize)]
pub struct ReplayPayload<'a> {
    pub id: &'a str,
    pub timestamp: DateTime<Utc>,
    pub action: &'a str,
    pub data: &'a serde_json::Value,
}

fn generate_action_id(at: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("{}-{}", at.timestamp_millis(), suffix.to_lowercase())
}

/// Network reachability as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Online,
    Offline,
    /// Nothing observed yet, or listeners could not be registered.
    #[default]
    Unknown,
}

/// Progress of the current drain cycle, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Completed,
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Completed => "completed",
            SyncStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Online => "online",
            ConnectionStatus::Offline => "offline",
            ConnectionStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Snapshot of the connection monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub connection_status: ConnectionStatus,
    pub sync_status: SyncStatus,
    /// Last time the status became online.
    pub last_online: Option<DateTime<Utc>>,
    /// Unsynced entries in the queue when the snapshot was taken.
    pub pending_action_count: usize,
}
