//! Integration tests for the offline sync model.
//!
//! Covers queue durability across a reload, drain ordering, both fetch
//! strategies and the sync status lifecycle end to end.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use campusync_core::fetch::{
    CacheStorage, FetchInterceptor, Network, Request, Response, ResponseSource,
};
use campusync_core::sync::{ActionTransport, BackgroundSync, PendingAction};
use campusync_core::{
    Config, DrainOutcome, Event, EventBus, MemoryStore, NetworkError, OfflineRuntime,
    PendingActionQueue, SqliteStore, SyncError, SyncStatus,
};
use chrono::Utc;
use proptest::prelude::*;
use url::Url;

const ORIGIN: &str = "http://localhost:3000";

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Rejects actions whose tag is in `reject`.
#[derive(Default)]
struct ScriptedTransport {
    reject: Vec<&'static str>,
    delivered: Mutex<Vec<String>>,
}

#[async_trait]
impl ActionTransport for ScriptedTransport {
    async fn replay(&self, action: &PendingAction) -> Result<(), SyncError> {
        if self.reject.contains(&action.action.as_str()) {
            return Err(SyncError::Rejected {
                id: action.id.clone(),
                status: 503,
            });
        }
        self.delivered.lock().unwrap().push(action.action.clone());
        Ok(())
    }
}

/// Network with a switch and a call counter.
#[derive(Default)]
struct SwitchableNetwork {
    routes: HashMap<String, Response>,
    offline: Mutex<bool>,
    calls: Mutex<usize>,
}

impl SwitchableNetwork {
    fn go_offline(&self) {
        *self.offline.lock().unwrap() = true;
    }
}

#[async_trait]
impl Network for SwitchableNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        *self.calls.lock().unwrap() += 1;
        if *self.offline.lock().unwrap() {
            return Err(NetworkError::Unreachable("airplane mode".into()));
        }
        self.routes
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| NetworkError::Unreachable("no route".into()))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn queue_survives_reload_in_insertion_order(
        actions in proptest::collection::vec("[a-z]{1,12}", 0..12),
        synced_mask in proptest::collection::vec(any::<bool>(), 12),
    ) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("campusync.db");

        let mut expected = Vec::new();
        {
            let queue = PendingActionQueue::new(
                Arc::new(SqliteStore::open(&path).unwrap()),
                "campusync:pending-actions",
                EventBus::new(),
            );
            for (i, action) in actions.iter().enumerate() {
                let entry = queue.enqueue(action, serde_json::json!({ "i": i })).unwrap();
                if synced_mask[i] {
                    queue.mark_synced(&entry.id).unwrap();
                } else {
                    expected.push(entry.id);
                }
            }
        }

        let reloaded = PendingActionQueue::new(
            Arc::new(SqliteStore::open(&path).unwrap()),
            "campusync:pending-actions",
            EventBus::new(),
        );
        let ids: Vec<String> = reloaded.unsynced().into_iter().map(|a| a.id).collect();
        prop_assert_eq!(ids, expected);
    }
}

#[tokio::test]
async fn drain_stops_at_failed_replay_and_keeps_order() {
    let queue = PendingActionQueue::new(Arc::new(MemoryStore::new()), "k", EventBus::new());
    queue.enqueue("A", serde_json::Value::Null).unwrap();
    queue.enqueue("B", serde_json::Value::Null).unwrap();
    queue.enqueue("C", serde_json::Value::Null).unwrap();

    let transport = Arc::new(ScriptedTransport {
        reject: vec!["B"],
        ..Default::default()
    });
    let report = BackgroundSync::new(queue.clone(), transport.clone()).drain().await;

    assert_eq!(report.outcome, DrainOutcome::Halted);
    assert_eq!(*transport.delivered.lock().unwrap(), vec!["A"]);
    let left: Vec<String> = queue.list().into_iter().map(|a| a.action).collect();
    assert_eq!(left, vec!["B", "C"]);

    // next cycle retries from B once the server recovers
    let report = BackgroundSync::new(queue.clone(), Arc::new(ScriptedTransport::default()))
        .drain()
        .await;
    assert_eq!(report.replayed.len(), 2);
    assert!(queue.list().is_empty());
}

#[tokio::test]
async fn cached_static_asset_is_served_identically_offline() {
    let asset = url("/static/app.css");
    let mut network = SwitchableNetwork::default();
    network.routes.insert(
        asset.to_string(),
        Response::new(asset.as_str(), 200, "body { color: teal }"),
    );
    let network = Arc::new(network);
    let interceptor =
        FetchInterceptor::new(&Config::default(), CacheStorage::new(), network.clone()).unwrap();

    let first = interceptor.handle(&Request::get(asset.clone())).await;
    assert_eq!(first.source, ResponseSource::Network);
    network.go_offline();

    let second = interceptor.handle(&Request::get(asset.clone())).await;
    let third = interceptor.handle(&Request::get(asset)).await;
    assert_eq!(second.body, first.body);
    assert_eq!(third.body, first.body);
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(*network.calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn failed_api_call_yields_offline_json() {
    let network = Arc::new(SwitchableNetwork::default());
    network.go_offline();
    let interceptor =
        FetchInterceptor::new(&Config::default(), CacheStorage::new(), network).unwrap();

    let response = interceptor
        .handle(&Request::get(url("/api/projects/42/goals")))
        .await;
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(response.status, 503);
    assert_eq!(body["offline"], true);
    assert_eq!(body["queued"], true);
    assert_eq!(response.header("content-type"), Some("application/json"));
}

#[tokio::test(start_paused = true)]
async fn completed_status_returns_to_idle_on_its_own() {
    let mut runtime = OfflineRuntime::builder(Config::default())
        .store(Arc::new(MemoryStore::new()))
        .transport(Arc::new(ScriptedTransport::default()))
        .network(Arc::new(SwitchableNetwork::default()))
        .build()
        .unwrap();
    runtime.start(Some(false));
    runtime
        .queue()
        .enqueue("invite-member", serde_json::json!({"email": "ana@campus.example"}))
        .unwrap();

    runtime.bus().publish(Event::AppOnline { at: Utc::now() });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let state = runtime.snapshot();
    assert_eq!(state.sync_status, SyncStatus::Completed);
    assert_eq!(state.pending_action_count, 0);

    tokio::time::sleep(Duration::from_millis(3_000)).await;
    assert_eq!(runtime.snapshot().sync_status, SyncStatus::Idle);
    runtime.shutdown().await;
}

#[tokio::test]
async fn navigation_falls_through_to_landing_page() {
    let network = Arc::new(SwitchableNetwork::default());
    network.go_offline();
    let cache = CacheStorage::new();
    let landing = url("/");
    cache.put(
        "campusync-shell",
        landing.as_str(),
        Response::new(landing.as_str(), 200, "<h1>Campusync</h1>"),
    )
    .unwrap();
    let interceptor = FetchInterceptor::new(&Config::default(), cache, network).unwrap();

    let response = interceptor.handle(&Request::navigate(url("/projects/7/board"))).await;
    assert_eq!(response.source, ResponseSource::OfflineFallback);
    assert_eq!(response.text_body(), "<h1>Campusync</h1>");
}

#[tokio::test]
async fn navigation_with_empty_cache_gets_plain_offline() {
    let network = Arc::new(SwitchableNetwork::default());
    network.go_offline();
    let interceptor =
        FetchInterceptor::new(&Config::default(), CacheStorage::new(), network).unwrap();
    let response = interceptor.handle(&Request::navigate(url("/projects"))).await;
    assert_eq!(response.status, 503);
    assert_eq!(response.text_body(), "Offline");
}
