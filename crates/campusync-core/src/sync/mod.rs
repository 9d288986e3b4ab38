//! Offline synchronization layer.
//!
//! Mutations made while offline are queued durably, the connection monitor
//! tracks reachability, and the background trigger replays the queue once
//! connectivity returns.

pub mod background;
pub mod connection;
pub mod pending_queue;
pub mod probe;
pub mod transport;
pub mod types;

/// Registration tag for the pending-action drain.
pub const SYNC_TAG: &str = "sync-updates";

pub use background::{BackgroundSync, DrainOutcome, DrainReport, FailedReplay, SyncRegistry};
pub use connection::{ConnectionMonitor, SyncTrigger};
pub use pending_queue::{PendingActionQueue, PENDING_ACTIONS_KEY};
pub use probe::ReachabilityProbe;
pub use transport::{ActionTransport, HttpTransport};
pub use types::{ConnectionState, ConnectionStatus, PendingAction, ReplayPayload, SyncStatus};
