//! Periodic reachability check that feeds `online`/`offline` events.

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use url::Url;

use crate::error::NetworkError;
use crate::events::{Event, EventBus};
use crate::storage::NetworkConfig;

/// Polls a URL and publishes [`Event::NetworkOnline`] / [`Event::NetworkOffline`]
/// whenever reachability flips. The first observation always publishes.
pub struct ReachabilityProbe {
    client: reqwest::Client,
    url: Url,
    interval: Duration,
    bus: EventBus,
    last: Mutex<Option<bool>>,
}

impl ReachabilityProbe {
    pub fn new(config: &NetworkConfig, bus: EventBus) -> Result<Self, NetworkError> {
        let url = Url::parse(&config.origin)
            .and_then(|origin| origin.join(&config.probe_path))
            .map_err(|e| {
                NetworkError::InvalidUrl(format!("{}{}: {e}", config.origin, config.probe_path))
            })?;
        let interval = Duration::from_secs(config.probe_interval_secs.max(1));
        let client = reqwest::Client::builder()
            .timeout(interval)
            .build()
            .map_err(NetworkError::from)?;
        Ok(Self {
            client,
            url,
            interval,
            bus,
            last: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Any HTTP response counts as reachable.
    pub async fn check(&self) -> bool {
        match self.client.get(self.url.clone()).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "probe failed");
                false
            }
        }
    }

    /// Check once and publish if the result differs from the last one.
    pub async fn poll(&self) -> bool {
        let online = self.check().await;
        let changed = match self.last.lock() {
            Ok(mut last) => last.replace(online) != Some(online),
            Err(_) => true,
        };
        if changed {
            tracing::info!(online, "reachability changed");
            let at = Utc::now();
            self.bus.publish(if online {
                Event::NetworkOnline { at }
            } else {
                Event::NetworkOffline { at }
            });
        }
        online
    }

    /// Poll on the configured interval until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("probe stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::sync::Arc;

    fn config(origin: &str) -> NetworkConfig {
        NetworkConfig {
            origin: origin.to_string(),
            probe_path: "/health".into(),
            ..NetworkConfig::default()
        }
    }

    fn record(bus: &EventBus) -> (Arc<Mutex<Vec<&'static str>>>, crate::events::Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let sub = bus
            .subscribe(&[EventKind::NetworkOnline, EventKind::NetworkOffline], move |e| {
                s.lock().unwrap().push(e.name());
            })
            .unwrap();
        (seen, sub)
    }

    #[test]
    fn joins_probe_path_onto_origin() {
        let probe =
            ReachabilityProbe::new(&config("https://campus.example"), EventBus::new()).unwrap();
        assert_eq!(probe.url().as_str(), "https://campus.example/health");
    }

    #[test]
    fn invalid_origin_is_rejected() {
        assert!(matches!(
            ReachabilityProbe::new(&config("no scheme"), EventBus::new()),
            Err(NetworkError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn publishes_only_on_transition() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let bus = EventBus::new();
        let (seen, _sub) = record(&bus);
        let probe = ReachabilityProbe::new(&config(&server.url()), bus).unwrap();

        assert!(probe.poll().await);
        assert!(probe.poll().await);
        assert_eq!(*seen.lock().unwrap(), vec!["online"]);
    }

    #[tokio::test]
    async fn unreachable_origin_reports_offline() {
        let bus = EventBus::new();
        let (seen, _sub) = record(&bus);
        let probe = ReachabilityProbe::new(&config("http://127.0.0.1:9"), bus).unwrap();
        assert!(!probe.poll().await);
        assert_eq!(*seen.lock().unwrap(), vec!["offline"]);
    }
}
