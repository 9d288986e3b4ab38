use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventBusError;
use crate::sync::types::SyncStatus;

/// Every connectivity or sync state change in the system produces an Event.
/// Components subscribe to the kinds they care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Platform reports network reachability (`online`).
    NetworkOnline { at: DateTime<Utc> },
    /// Platform reports loss of reachability (`offline`).
    NetworkOffline { at: DateTime<Utc> },
    /// App-level signal that connectivity returned (`app-online`).
    AppOnline { at: DateTime<Utc> },
    /// App-level signal that connectivity was lost (`app-offline`).
    AppOffline { at: DateTime<Utc> },
    /// The pending-action queue was written.
    QueueChanged { pending: usize, at: DateTime<Utc> },
    /// The connection monitor's sync status moved.
    SyncStatusChanged {
        from: SyncStatus,
        to: SyncStatus,
        at: DateTime<Utc>,
    },
    /// A background sync registration fired.
    SyncRequested { tag: String, at: DateTime<Utc> },
}

/// Discriminant used to filter subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NetworkOnline,
    NetworkOffline,
    AppOnline,
    AppOffline,
    QueueChanged,
    SyncStatusChanged,
    SyncRequested,
}

impl EventKind {
    /// Kinds that signal a connectivity transition.
    pub const CONNECTIVITY: [EventKind; 4] = [
        EventKind::NetworkOnline,
        EventKind::NetworkOffline,
        EventKind::AppOnline,
        EventKind::AppOffline,
    ];
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::NetworkOnline { .. } => EventKind::NetworkOnline,
            Event::NetworkOffline { .. } => EventKind::NetworkOffline,
            Event::AppOnline { .. } => EventKind::AppOnline,
            Event::AppOffline { .. } => EventKind::AppOffline,
            Event::QueueChanged { .. } => EventKind::QueueChanged,
            Event::SyncStatusChanged { .. } => EventKind::SyncStatusChanged,
            Event::SyncRequested { .. } => EventKind::SyncRequested,
        }
    }

    /// Wire name of the event, matching the browser event names.
    pub fn name(&self) -> &'static str {
        match self {
            Event::NetworkOnline { .. } => "online",
            Event::NetworkOffline { .. } => "offline",
            Event::AppOnline { .. } => "app-online",
            Event::AppOffline { .. } => "app-offline",
            Event::QueueChanged { .. } => "queue-changed",
            Event::SyncStatusChanged { .. } => "sync-status",
            Event::SyncRequested { .. } => "sync",
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::NetworkOnline { at }
            | Event::NetworkOffline { at }
            | Event::AppOnline { at }
            | Event::AppOffline { at }
            | Event::QueueChanged { at, .. }
            | Event::SyncStatusChanged { at, .. }
            | Event::SyncRequested { at, .. } => *at,
        }
    }

    /// `Some(true)` for online signals, `Some(false)` for offline signals.
    pub fn connectivity(&self) -> Option<bool> {
        match self {
            Event::NetworkOnline { .. } | Event::AppOnline { .. } => Some(true),
            Event::NetworkOffline { .. } | Event::AppOffline { .. } => Some(false),
            _ => None,
        }
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Listener {
    id: u64,
    kinds: Vec<EventKind>,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl BusInner {
    fn remove(&self, id: u64) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|l| l.id != id);
        }
    }
}

/// Publish/subscribe hub shared by every component of one runtime.
///
/// Cloning yields another handle to the same bus. Handlers run synchronously
/// on the publishing thread, outside the listener lock, so a handler may
/// publish further events.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for the given kinds (all kinds if empty).
    ///
    /// # Errors
    /// Returns [`EventBusError::Closed`] once [`EventBus::close`] was called.
    pub fn subscribe<F>(
        &self,
        kinds: &[EventKind],
        handler: F,
    ) -> Result<Subscription, EventBusError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(EventBusError::Closed);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .map_err(|_| EventBusError::Closed)?;
        listeners.push(Listener {
            id,
            kinds: kinds.to_vec(),
            handler: Arc::new(handler),
        });
        Ok(Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        })
    }

    /// Deliver `event` to every matching listener. Returns the delivery count.
    pub fn publish(&self, event: Event) -> usize {
        if self.inner.closed.load(Ordering::SeqCst) {
            return 0;
        }
        let kind = event.kind();
        let handlers: Vec<Handler> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners
                .iter()
                .filter(|l| l.kinds.is_empty() || l.kinds.contains(&kind))
                .map(|l| Arc::clone(&l.handler))
                .collect(),
            Err(_) => return 0,
        };
        tracing::trace!(event = event.name(), listeners = handlers.len(), "publish");
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    /// Drop every listener and refuse new ones.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// Handle for one registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn delivers_only_matching_kinds() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = bus
            .subscribe(&[EventKind::AppOnline], move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        bus.publish(Event::AppOffline { at: Utc::now() });
        bus.publish(Event::AppOnline { at: Utc::now() });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_filter_receives_everything() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = bus
            .subscribe(&[], move |e| s.lock().unwrap().push(e.name()))
            .unwrap();
        bus.publish(Event::NetworkOnline { at: Utc::now() });
        bus.publish(Event::QueueChanged {
            pending: 2,
            at: Utc::now(),
        });
        assert_eq!(*seen.lock().unwrap(), vec!["online", "queue-changed"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let sub = bus.subscribe(&[], |_| {}).unwrap();
        assert_eq!(bus.listener_count(), 1);
        sub.unsubscribe();
        assert_eq!(bus.listener_count(), 0);
        assert_eq!(bus.publish(Event::AppOnline { at: Utc::now() }), 0);
    }

    #[test]
    fn handler_may_publish_reentrantly() {
        let bus = EventBus::new();
        let inner_bus = bus.clone();
        let forwarded = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&forwarded);
        let _a = bus
            .subscribe(&[EventKind::NetworkOnline], move |e| {
                inner_bus.publish(Event::AppOnline { at: e.at() });
            })
            .unwrap();
        let _b = bus
            .subscribe(&[EventKind::AppOnline], move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        bus.publish(Event::NetworkOnline { at: Utc::now() });
        assert_eq!(forwarded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_bus_rejects_subscribers() {
        let bus = EventBus::new();
        bus.close();
        assert!(matches!(bus.subscribe(&[], |_| {}), Err(EventBusError::Closed)));
        assert!(bus.is_closed());
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_value(Event::QueueChanged {
            pending: 3,
            at: Utc::now(),
        })
        .unwrap();
        assert_eq!(json["type"], "QueueChanged");
        assert_eq!(json["pending"], 3);
    }
}
