//! Background drain of the pending-action queue.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;

use crate::events::{Event, EventBus};
use crate::sync::pending_queue::PendingActionQueue;
use crate::sync::transport::ActionTransport;

/// How a drain cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Every action was delivered and the queue ended empty.
    Completed,
    /// Stopped at the first failure; later actions were not attempted.
    Halted,
    /// Another drain held the lock, nothing was attempted.
    AlreadyRunning,
}

/// The action that stopped a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedReplay {
    pub id: String,
    pub reason: String,
}

/// Result of one drain cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub outcome: DrainOutcome,
    /// Ids delivered this cycle, in order.
    pub replayed: Vec<String>,
    pub failed: Option<FailedReplay>,
    /// Unsynced actions left in the queue afterwards.
    pub remaining: usize,
}

impl DrainReport {
    pub fn completed(replayed: Vec<String>) -> Self {
        Self {
            outcome: DrainOutcome::Completed,
            replayed,
            failed: None,
            remaining: 0,
        }
    }

    pub fn halted(replayed: Vec<String>, id: String, reason: String, remaining: usize) -> Self {
        Self {
            outcome: DrainOutcome::Halted,
            replayed,
            failed: Some(FailedReplay { id, reason }),
            remaining,
        }
    }

    pub fn already_running(remaining: usize) -> Self {
        Self {
            outcome: DrainOutcome::AlreadyRunning,
            replayed: Vec::new(),
            failed: None,
            remaining,
        }
    }

    pub fn outcome(&self) -> DrainOutcome {
        self.outcome
    }
}

/// Replays queued actions through an [`ActionTransport`].
///
/// Only one drain runs at a time across clones.
#[derive(Clone)]
pub struct BackgroundSync {
    queue: PendingActionQueue,
    transport: Arc<dyn ActionTransport>,
    running: Arc<tokio::sync::Mutex<()>>,
}

impl BackgroundSync {
    pub fn new(queue: PendingActionQueue, transport: Arc<dyn ActionTransport>) -> Self {
        Self {
            queue,
            transport,
            running: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn queue(&self) -> &PendingActionQueue {
        &self.queue
    }

    /// Replay unsynced actions oldest first, stopping at the first failure.
    ///
    /// An action is marked synced and then removed only after the transport
    /// confirms it. Entries left marked synced by an earlier cycle are purged
    /// first. Actions enqueued while the cycle runs are picked up before it
    /// completes. Failures are reported, never returned.
    pub async fn drain(&self) -> DrainReport {
        let Ok(_running) = self.running.try_lock() else {
            tracing::debug!("drain already in progress");
            return DrainReport::already_running(self.queue.pending_count());
        };

        if self.queue.list().iter().any(|a| a.synced) {
            match self.queue.purge_synced() {
                Ok(purged) => tracing::info!(purged, "purged delivered actions"),
                Err(e) => tracing::warn!(error = %e, "could not purge delivered actions"),
            }
        }

        let mut replayed = Vec::new();
        loop {
            let actions = self.queue.unsynced();
            if actions.is_empty() {
                break;
            }
            tracing::info!(count = actions.len(), "draining pending actions");

            for action in actions {
                if let Err(e) = self.transport.replay(&action).await {
                    tracing::warn!(
                        id = %action.id,
                        action = %action.action,
                        error = %e,
                        "replay failed, halting drain"
                    );
                    let remaining = self.queue.pending_count();
                    return DrainReport::halted(replayed, action.id, e.to_string(), remaining);
                }

                // Delivered; a failed write below leaves the entry flagged
                // synced for the next cycle to purge.
                let confirmed = self
                    .queue
                    .mark_synced(&action.id)
                    .and_then(|_| self.queue.remove(&action.id));
                replayed.push(action.id.clone());
                if let Err(e) = confirmed {
                    tracing::error!(
                        id = %action.id,
                        error = %e,
                        "delivered action could not be cleared"
                    );
                    let remaining = self.queue.pending_count();
                    return DrainReport::halted(replayed, action.id, e.to_string(), remaining);
                }
            }
        }

        if replayed.is_empty() {
            tracing::debug!("nothing to sync");
        } else {
            tracing::info!(replayed = replayed.len(), "drain finished");
        }
        DrainReport::completed(replayed)
    }
}

/// Registered background sync tags.
#[derive(Debug, Clone, Default)]
pub struct SyncRegistry {
    tags: Arc<Mutex<BTreeSet<String>>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the tag was already registered.
    pub fn register(&self, tag: &str) -> bool {
        self.tags
            .lock()
            .map(|mut tags| tags.insert(tag.to_string()))
            .unwrap_or(false)
    }

    pub fn unregister(&self, tag: &str) -> bool {
        self.tags
            .lock()
            .map(|mut tags| tags.remove(tag))
            .unwrap_or(false)
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.tags
            .lock()
            .map(|tags| tags.contains(tag))
            .unwrap_or(false)
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags
            .lock()
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Publish `SyncRequested` for every registered tag. Returns how many fired.
    pub fn fire_all(&self, bus: &EventBus) -> usize {
        let tags = self.tags();
        for tag in &tags {
            bus.publish(Event::SyncRequested {
                tag: tag.clone(),
                at: Utc::now(),
            });
        }
        tags.len()
    }
}
