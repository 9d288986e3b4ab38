//! Delivery of queued actions to the server.

use async_trait::async_trait;
use url::Url;

use crate::error::SyncError;
use crate::sync::types::PendingAction;

/// Sends one pending action to the server.
///
/// `Ok(())` means the server confirmed the action; any error leaves the
/// action queued for the next cycle.
#[async_trait]
pub trait ActionTransport: Send + Sync {
    async fn replay(&self, action: &PendingAction) -> Result<(), SyncError>;
}

/// POSTs each action as JSON to a fixed endpoint. Any 2xx is success.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> Result<Self, SyncError> {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Result<Self, SyncError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SyncError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ActionTransport for HttpTransport {
    async fn replay(&self, action: &PendingAction) -> Result<(), SyncError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&action.payload())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(id = %action.id, %status, "replay accepted");
            Ok(())
        } else {
            Err(SyncError::Rejected {
                id: action.id.clone(),
                status: status.as_u16(),
            })
        }
    }
}
