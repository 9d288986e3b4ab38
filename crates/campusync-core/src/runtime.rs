//! Session context wiring the offline components together.

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{CoreError, NetworkError};
use crate::events::{Event, EventBus, EventKind, Subscription};
use crate::fetch::{
    CacheLifecycle, CacheStorage, FetchInterceptor, HttpNetwork, Network, Request, Response,
    CACHE_STORAGE_KEY,
};
use crate::install_prompt::InstallPrompt;
use crate::storage::{Config, KeyValueStore, SqliteStore};
use crate::sync::{
    ActionTransport, BackgroundSync, ConnectionMonitor, ConnectionState, DrainReport,
    HttpTransport, PendingActionQueue, ReachabilityProbe, SyncRegistry, SyncTrigger,
    PENDING_ACTIONS_KEY,
};

/// Builder for [`OfflineRuntime`]. Unset parts use the production defaults:
/// SQLite in the data directory, HTTP transport and HTTP network. The queue,
/// the cache generations and the install-prompt record all live in the store.
pub struct OfflineRuntimeBuilder {
    config: Config,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn ActionTransport>>,
    network: Option<Arc<dyn Network>>,
    bus: Option<EventBus>,
}

impl OfflineRuntimeBuilder {
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn ActionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<OfflineRuntime, CoreError> {
        let config = self.config;
        let store: Arc<dyn KeyValueStore> = match self.store {
            Some(store) => store,
            None => Arc::new(SqliteStore::open_default()?),
        };
        let transport: Arc<dyn ActionTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&config.sync.endpoint)?),
        };
        let network: Arc<dyn Network> = match self.network {
            Some(network) => network,
            None => Arc::new(HttpNetwork::new(&config.network.origin)?),
        };
        let bus = self.bus.unwrap_or_default();

        let queue = PendingActionQueue::new(
            Arc::clone(&store),
            config.storage_key(PENDING_ACTIONS_KEY),
            bus.clone(),
        );
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let monitor = Arc::new(ConnectionMonitor::new(
            queue.clone(),
            bus.clone(),
            &config.sync,
            trigger_tx,
        ));
        let cache =
            CacheStorage::persistent(Arc::clone(&store), config.storage_key(CACHE_STORAGE_KEY))?;
        let interceptor = FetchInterceptor::new(&config, cache.clone(), Arc::clone(&network))?;
        let lifecycle = CacheLifecycle::new(&config, cache, network);
        let install_prompt = InstallPrompt::new(Arc::clone(&store), &config);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(OfflineRuntime {
            sync: BackgroundSync::new(queue.clone(), transport),
            registry: SyncRegistry::new(),
            config,
            bus,
            queue,
            monitor,
            interceptor,
            lifecycle,
            install_prompt,
            trigger_rx: Some(trigger_rx),
            shutdown_tx,
            tasks: Vec::new(),
            subscriptions: Vec::new(),
        })
    }
}

/// Owns every component of one session. Nothing here is global; pass the
/// runtime (or the handles it exposes) to whoever needs them.
pub struct OfflineRuntime {
    config: Config,
    bus: EventBus,
    queue: PendingActionQueue,
    monitor: Arc<ConnectionMonitor>,
    sync: BackgroundSync,
    registry: SyncRegistry,
    interceptor: FetchInterceptor,
    lifecycle: CacheLifecycle,
    install_prompt: InstallPrompt,
    trigger_rx: Option<mpsc::UnboundedReceiver<SyncTrigger>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    subscriptions: Vec<Subscription>,
}

impl OfflineRuntime {
    pub fn builder(config: Config) -> OfflineRuntimeBuilder {
        OfflineRuntimeBuilder {
            config,
            store: None,
            transport: None,
            network: None,
            bus: None,
        }
    }

    /// Start the sync worker and the event wiring. Must run inside a tokio
    /// runtime. Listener failures leave connectivity unknown but do not fail
    /// the start.
    pub fn start(&mut self, initially_online: Option<bool>) {
        self.registry.register(&self.config.sync.tag);

        if let Some(rx) = self.trigger_rx.take() {
            let handle = tokio::spawn(sync_worker(
                rx,
                self.sync.clone(),
                Arc::downgrade(&self.monitor),
                self.shutdown_tx.subscribe(),
            ));
            self.tasks.push(handle);
        }

        if let Err(e) = self.monitor.start(initially_online) {
            tracing::warn!(error = %e, "connection monitor running degraded");
        }

        // Subscribed after the monitor so it sees `online` before any tag fires.
        self.wire_registrations();
        tracing::info!(queue = %self.queue.key(), "offline runtime started");
    }

    fn wire_registrations(&mut self) {
        let registry = self.registry.clone();
        let monitor = Arc::downgrade(&self.monitor);
        let on_sync = self.bus.subscribe(&[EventKind::SyncRequested], move |event| {
            let Event::SyncRequested { tag, .. } = event else {
                return;
            };
            if !registry.is_registered(tag) {
                tracing::debug!(%tag, "ignoring unregistered sync tag");
                return;
            }
            if let Some(monitor) = monitor.upgrade() {
                monitor.request_registered_sync(tag);
            }
        });

        let registry = self.registry.clone();
        let bus = self.bus.clone();
        let on_online = self.bus.subscribe(
            &[EventKind::NetworkOnline, EventKind::AppOnline],
            move |_| {
                registry.fire_all(&bus);
            },
        );

        for subscribed in [on_sync, on_online] {
            match subscribed {
                Ok(sub) => self.subscriptions.push(sub),
                Err(e) => tracing::warn!(error = %e, "sync registrations not wired"),
            }
        }
    }

    /// Poll the origin for reachability until shutdown.
    pub fn start_probe(&mut self) -> Result<(), NetworkError> {
        let probe = ReachabilityProbe::new(&self.config.network, self.bus.clone())?;
        tracing::info!(url = %probe.url(), "reachability probe started");
        let handle = tokio::spawn(probe.run(self.shutdown_tx.subscribe()));
        self.tasks.push(handle);
        Ok(())
    }

    /// Run one drain cycle now and report it to the monitor.
    pub async fn sync_now(&self) -> DrainReport {
        let report = self.sync.drain().await;
        self.monitor.finish_sync(&report);
        report
    }

    /// Route a request through the interceptor.
    pub async fn fetch(&self, request: &Request) -> Response {
        self.interceptor.handle(request).await
    }

    /// Precache the app shell, then drop stale generations.
    pub async fn install(&self) -> Result<usize, CoreError> {
        let count = self.lifecycle.install().await?;
        self.lifecycle.activate();
        Ok(count)
    }

    pub fn snapshot(&self) -> ConnectionState {
        self.monitor.snapshot()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn queue(&self) -> &PendingActionQueue {
        &self.queue
    }

    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    pub fn registry(&self) -> &SyncRegistry {
        &self.registry
    }

    pub fn interceptor(&self) -> &FetchInterceptor {
        &self.interceptor
    }

    pub fn lifecycle(&self) -> &CacheLifecycle {
        &self.lifecycle
    }

    pub fn install_prompt(&self) -> &InstallPrompt {
        &self.install_prompt
    }

    /// Stop background tasks and drop every listener. An in-flight drain is
    /// allowed to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        self.subscriptions.clear();
        self.monitor.stop();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        tracing::info!("offline runtime stopped");
    }
}

async fn sync_worker(
    mut triggers: mpsc::UnboundedReceiver<SyncTrigger>,
    sync: BackgroundSync,
    monitor: Weak<ConnectionMonitor>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            trigger = triggers.recv() => {
                let Some(trigger) = trigger else { break };
                tracing::debug!(?trigger, "sync triggered");
                let report = sync.drain().await;
                match monitor.upgrade() {
                    Some(monitor) => monitor.finish_sync(&report),
                    None => break,
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!("sync worker stopped");
}
