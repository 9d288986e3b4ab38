//! The network behind the interceptor.

use async_trait::async_trait;
use url::Url;

use super::request::{Request, Response, ResponseSource, ResponseType};
use crate::error::NetworkError;

/// Performs a request against the real network.
///
/// An `Err` means no response was received at all; HTTP error statuses are
/// still `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// `reqwest`-backed network. Responses from `origin` are tagged `basic`.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
    origin: Url,
}

impl HttpNetwork {
    pub fn new(origin: &str) -> Result<Self, NetworkError> {
        let origin = Url::parse(origin)
            .map_err(|e| NetworkError::InvalidUrl(format!("{origin}: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            origin,
        })
    }

    fn kind_for(&self, request: &Request, url: &Url) -> ResponseType {
        if url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else if request.mode == super::request::RequestMode::NoCors {
            ResponseType::Opaque
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let reply = builder.send().await?;

        let final_url = reply.url().clone();
        let status = reply.status().as_u16();
        let headers = reply
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = reply.bytes().await?.to_vec();

        Ok(Response {
            url: final_url.to_string(),
            status,
            headers,
            body,
            kind: self.kind_for(request, &final_url),
            source: ResponseSource::Network,
        })
    }
}

/// A network that is always down.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineNetwork;

#[async_trait]
impl Network for OfflineNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        Err(NetworkError::Unreachable(format!("offline: {}", request.url)))
    }
}
