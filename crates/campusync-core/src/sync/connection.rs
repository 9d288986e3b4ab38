//! Connection monitor: online/offline state plus the user-facing sync status.
//!
//! Sync status machine:
//!
//! ```text
//! idle ──(online, pending > 0 | explicit)──> syncing
//! syncing ──(drain emptied queue | display timeout)──> completed
//! completed ──(display delay)──> idle
//! any ──(drain halted on failure)──> error
//! error ──(next online)──> idle
//! ```
//!
//! Timers are tokio tasks guarded by a generation counter so a timer armed
//! for an older state never overrides a newer one.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::EventBusError;
use crate::events::{Event, EventBus, EventKind, Subscription};
use crate::storage::SyncConfig;
use crate::sync::background::{DrainOutcome, DrainReport};
use crate::sync::pending_queue::PendingActionQueue;
use crate::sync::types::{ConnectionState, ConnectionStatus, SyncStatus};

/// Why a drain cycle was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Connectivity came back with actions waiting.
    ConnectivityRestored,
    /// A caller asked for a sync.
    Explicit,
    /// A background sync registration fired.
    Registration(String),
}

#[derive(Debug, Default)]
struct MonitorState {
    connection_status: ConnectionStatus,
    sync_status: SyncStatus,
    last_online: Option<DateTime<Utc>>,
    generation: u64,
    /// Listener registration failed; status stays unknown for good.
    degraded: bool,
    /// Status events waiting for the lock to be released.
    outbox: Vec<Event>,
}

impl MonitorState {
    /// Move to `to` and queue the change event. Returns the new generation.
    fn set_status(&mut self, to: SyncStatus) -> u64 {
        let from = self.sync_status;
        self.sync_status = to;
        self.generation += 1;
        if from != to {
            tracing::info!(%from, %to, "sync status changed");
            self.outbox.push(Event::SyncStatusChanged {
                from,
                to,
                at: Utc::now(),
            });
        }
        self.generation
    }
}

struct Shared {
    state: Mutex<MonitorState>,
    bus: EventBus,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        // Poisoning only happens if a listener panicked mid-update; the state
        // is plain data, so keep going with whatever was written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Unlock, then publish queued events so listeners may call back in.
    fn release(&self, mut state: MutexGuard<'_, MonitorState>) {
        let events = std::mem::take(&mut state.outbox);
        drop(state);
        for event in events {
            self.bus.publish(event);
        }
    }
}

/// Single source of truth for connectivity and sync status.
pub struct ConnectionMonitor {
    shared: Arc<Shared>,
    queue: PendingActionQueue,
    trigger_tx: mpsc::UnboundedSender<SyncTrigger>,
    completed_display: Duration,
    syncing_timeout: Duration,
    subscription: Mutex<Option<Subscription>>,
}

impl ConnectionMonitor {
    pub fn new(
        queue: PendingActionQueue,
        bus: EventBus,
        config: &SyncConfig,
        trigger_tx: mpsc::UnboundedSender<SyncTrigger>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MonitorState::default()),
                bus,
            }),
            queue,
            trigger_tx,
            completed_display: config.completed_display(),
            syncing_timeout: config.syncing_timeout(),
            subscription: Mutex::new(None),
        }
    }

    /// Register for connectivity events and apply the initial observation.
    ///
    /// # Errors
    /// If the bus refuses the listener the monitor degrades to
    /// [`ConnectionStatus::Unknown`] permanently and the error is returned.
    pub fn start(self: &Arc<Self>, initially_online: Option<bool>) -> Result<(), EventBusError> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let subscribed = self
            .shared
            .bus
            .subscribe(&EventKind::CONNECTIVITY, move |event| {
                if let Some(monitor) = weak.upgrade() {
                    monitor.handle_event(event);
                }
            });

        match subscribed {
            Ok(sub) => {
                if let Ok(mut slot) = self.subscription.lock() {
                    *slot = Some(sub);
                }
            }
            Err(e) => {
                let mut state = self.shared.lock();
                state.degraded = true;
                state.connection_status = ConnectionStatus::Unknown;
                tracing::warn!(
                    error = %e,
                    "connectivity listeners unavailable, status stays unknown"
                );
                return Err(e);
            }
        }

        if let Some(online) = initially_online {
            self.observe(online);
        }
        Ok(())
    }

    /// Drop the event subscription.
    pub fn stop(&self) {
        if let Ok(mut slot) = self.subscription.lock() {
            slot.take();
        }
    }

    pub fn handle_event(&self, event: &Event) {
        if let Some(online) = event.connectivity() {
            tracing::debug!(event = event.name(), "connectivity event");
            self.observe(online);
        }
    }

    /// Apply a connectivity observation.
    pub fn observe(&self, online: bool) {
        let mut state = self.shared.lock();
        if state.degraded {
            return;
        }
        if online {
            state.connection_status = ConnectionStatus::Online;
            state.last_online = Some(Utc::now());
            if state.sync_status == SyncStatus::Error {
                state.set_status(SyncStatus::Idle);
            }
        } else {
            state.connection_status = ConnectionStatus::Offline;
        }
        self.shared.release(state);

        if online && self.queue.pending_count() > 0 {
            self.begin_sync(SyncTrigger::ConnectivityRestored);
        }
    }

    /// Ask for a drain regardless of the pending count.
    pub fn request_sync(&self) -> bool {
        self.begin_sync(SyncTrigger::Explicit)
    }

    /// Start a sync cycle on behalf of a registration tag, if anything is pending.
    pub fn request_registered_sync(&self, tag: &str) -> bool {
        if self.queue.pending_count() == 0 {
            return false;
        }
        self.begin_sync(SyncTrigger::Registration(tag.to_string()))
    }

    fn begin_sync(&self, trigger: SyncTrigger) -> bool {
        let mut state = self.shared.lock();
        if state.connection_status != ConnectionStatus::Online {
            tracing::debug!(?trigger, "not connected, sync deferred");
            return false;
        }
        if state.sync_status == SyncStatus::Syncing {
            return false;
        }
        // The worker reports back through finish_sync, which needs this
        // lock, so sending before the status change cannot race it.
        if self.trigger_tx.send(trigger).is_err() {
            tracing::warn!("sync worker is gone, cannot start drain");
            return false;
        }
        let generation = state.set_status(SyncStatus::Syncing);
        self.shared.release(state);

        let shared = Arc::clone(&self.shared);
        let display = self.completed_display;
        spawn_timer(self.syncing_timeout, move || {
            let mut state = shared.lock();
            if state.generation == generation && state.sync_status == SyncStatus::Syncing {
                tracing::debug!("syncing window elapsed, showing completed");
                let generation = state.set_status(SyncStatus::Completed);
                shared.release(state);
                schedule_dismiss(shared, generation, display);
            }
        });
        true
    }

    /// Apply the result of a drain cycle.
    pub fn finish_sync(&self, report: &DrainReport) {
        let mut state = self.shared.lock();
        let mut dismiss = None;
        match report.outcome() {
            DrainOutcome::AlreadyRunning => {}
            DrainOutcome::Completed => {
                if matches!(state.sync_status, SyncStatus::Syncing | SyncStatus::Completed) {
                    dismiss = Some(state.set_status(SyncStatus::Completed));
                }
            }
            DrainOutcome::Halted => {
                state.set_status(SyncStatus::Error);
            }
        }
        self.shared.release(state);

        if let Some(generation) = dismiss {
            schedule_dismiss(Arc::clone(&self.shared), generation, self.completed_display);
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.shared.lock().connection_status
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.shared.lock().sync_status
    }

    /// `unknown` counts as offline.
    pub fn is_connected(&self) -> bool {
        self.connection_status() == ConnectionStatus::Online
    }

    pub fn is_degraded(&self) -> bool {
        self.shared.lock().degraded
    }

    pub fn snapshot(&self) -> ConnectionState {
        let pending_action_count = self.queue.pending_count();
        let state = self.shared.lock();
        ConnectionState {
            connection_status: state.connection_status,
            sync_status: state.sync_status,
            last_online: state.last_online,
            pending_action_count,
        }
    }
}

fn schedule_dismiss(shared: Arc<Shared>, generation: u64, delay: Duration) {
    spawn_timer(delay, move || {
        let mut state = shared.lock();
        if state.generation == generation && state.sync_status == SyncStatus::Completed {
            state.set_status(SyncStatus::Idle);
        }
        shared.release(state);
    });
}

fn spawn_timer<F>(delay: Duration, fire: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                fire();
            });
        }
        Err(_) => tracing::debug!("no tokio runtime, status timer skipped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn monitor_with(
        bus: &EventBus,
    ) -> (Arc<ConnectionMonitor>, PendingActionQueue, mpsc::UnboundedReceiver<SyncTrigger>) {
        let queue = PendingActionQueue::new(Arc::new(MemoryStore::new()), "k", bus.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let monitor = Arc::new(ConnectionMonitor::new(
            queue.clone(),
            bus.clone(),
            &SyncConfig::default(),
            tx,
        ));
        (monitor, queue, rx)
    }

    #[test]
    fn unknown_before_first_observation() {
        let bus = EventBus::new();
        let (monitor, _q, _rx) = monitor_with(&bus);
        monitor.start(None).unwrap();
        assert_eq!(monitor.connection_status(), ConnectionStatus::Unknown);
        assert!(!monitor.is_connected());
    }

    #[test]
    fn follows_platform_and_app_events() {
        let bus = EventBus::new();
        let (monitor, _q, _rx) = monitor_with(&bus);
        monitor.start(Some(false)).unwrap();
        assert_eq!(monitor.connection_status(), ConnectionStatus::Offline);

        bus.publish(Event::AppOnline { at: Utc::now() });
        assert!(monitor.is_connected());
        assert!(monitor.snapshot().last_online.is_some());

        bus.publish(Event::NetworkOffline { at: Utc::now() });
        assert_eq!(monitor.connection_status(), ConnectionStatus::Offline);
    }

    #[test]
    fn closed_bus_degrades_to_unknown_forever() {
        let bus = EventBus::new();
        bus.close();
        let (monitor, _q, _rx) = monitor_with(&bus);
        assert!(monitor.start(Some(true)).is_err());
        monitor.observe(true);
        assert_eq!(monitor.connection_status(), ConnectionStatus::Unknown);
        assert!(monitor.is_degraded());
        assert!(!monitor.request_sync());
    }

    #[test]
    fn going_online_with_pending_actions_starts_sync() {
        let bus = EventBus::new();
        let (monitor, queue, mut rx) = monitor_with(&bus);
        monitor.start(Some(false)).unwrap();
        queue.enqueue("create-project", serde_json::Value::Null).unwrap();

        bus.publish(Event::NetworkOnline { at: Utc::now() });
        assert_eq!(monitor.sync_status(), SyncStatus::Syncing);
        assert_eq!(rx.try_recv().unwrap(), SyncTrigger::ConnectivityRestored);
        assert_eq!(monitor.snapshot().pending_action_count, 1);
    }

    #[test]
    fn going_online_with_empty_queue_stays_idle() {
        let bus = EventBus::new();
        let (monitor, _q, mut rx) = monitor_with(&bus);
        monitor.start(Some(false)).unwrap();
        bus.publish(Event::NetworkOnline { at: Utc::now() });
        assert_eq!(monitor.sync_status(), SyncStatus::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn explicit_sync_needs_connection_and_is_not_doubled() {
        let bus = EventBus::new();
        let (monitor, _q, mut rx) = monitor_with(&bus);
        monitor.start(Some(false)).unwrap();
        assert!(!monitor.request_sync());

        monitor.observe(true);
        assert!(monitor.request_sync());
        assert!(!monitor.request_sync());
        assert_eq!(rx.try_recv().unwrap(), SyncTrigger::Explicit);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn halted_drain_sets_error_until_next_online() {
        let bus = EventBus::new();
        let (monitor, _q, _rx) = monitor_with(&bus);
        monitor.start(Some(true)).unwrap();
        monitor.request_sync();
        monitor.finish_sync(&DrainReport::halted(vec![], "1-a".into(), "boom".into(), 2));
        assert_eq!(monitor.sync_status(), SyncStatus::Error);

        monitor.observe(false);
        assert_eq!(monitor.sync_status(), SyncStatus::Error);
        monitor.observe(true);
        assert_eq!(monitor.sync_status(), SyncStatus::Idle);
    }

    #[test]
    fn status_changes_are_published() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = bus
            .subscribe(&[EventKind::SyncStatusChanged], move |e| {
                if let Event::SyncStatusChanged { to, .. } = e {
                    s.lock().unwrap().push(*to);
                }
            })
            .unwrap();
        let (monitor, _q, _rx) = monitor_with(&bus);
        monitor.start(Some(true)).unwrap();
        monitor.request_sync();
        monitor.finish_sync(&DrainReport::halted(vec![], "x".into(), "e".into(), 1));
        assert_eq!(*seen.lock().unwrap(), vec![SyncStatus::Syncing, SyncStatus::Error]);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_returns_to_idle_after_display_window() {
        let bus = EventBus::new();
        let (monitor, _q, _rx) = monitor_with(&bus);
        monitor.start(Some(true)).unwrap();
        monitor.request_sync();
        monitor.finish_sync(&DrainReport::completed(vec!["1-a".into()]));
        assert_eq!(monitor.sync_status(), SyncStatus::Completed);

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(monitor.sync_status(), SyncStatus::Completed);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(monitor.sync_status(), SyncStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn syncing_window_elapses_into_completed() {
        let bus = EventBus::new();
        let (monitor, _q, _rx) = monitor_with(&bus);
        monitor.start(Some(true)).unwrap();
        monitor.request_sync();

        tokio::time::sleep(Duration::from_millis(10_050)).await;
        assert_eq!(monitor.sync_status(), SyncStatus::Completed);
        tokio::time::sleep(Duration::from_millis(3_050)).await;
        assert_eq!(monitor.sync_status(), SyncStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_does_not_clobber_newer_cycle() {
        let bus = EventBus::new();
        let (monitor, _q, _rx) = monitor_with(&bus);
        monitor.start(Some(true)).unwrap();
        monitor.request_sync();
        monitor.finish_sync(&DrainReport::completed(vec![]));

        // second cycle starts while the first dismiss timer is pending
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(monitor.request_sync());
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(monitor.sync_status(), SyncStatus::Syncing);
    }
}
