//! Remote interactive session acquisition.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Provider of remote browser sessions, one per tenant profile.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Return a DevTools websocket endpoint for the tenant's session,
    /// starting the session if needed.
    async fn acquire_session(&self, tenant_id: &str) -> Result<String>;
}

/// Acquire a session, retrying up to `max_attempts` times `delay` apart.
///
/// Fails with [`Error::Session`] carrying the attempt count and the last
/// error once the budget is spent.
pub async fn acquire_with_retry(
    provider: &dyn SessionProvider,
    tenant_id: &str,
    max_attempts: u32,
    delay: Duration,
) -> Result<String> {
    let max_attempts = max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match provider.acquire_session(tenant_id).await {
            Ok(endpoint) => {
                debug!(tenant = %tenant_id, attempt, "Session acquired");
                return Ok(endpoint);
            }
            Err(e) => {
                warn!(
                    tenant = %tenant_id,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Session acquisition failed"
                );
                last_error = e.to_string();
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(delay).await;
        }
    }

    Err(Error::Session {
        tenant_id: tenant_id.to_string(),
        attempts: max_attempts,
        message: last_error,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointData {
    ws_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EndpointResponse {
    #[serde(default)]
    data: Option<EndpointData>,
}

fn extract_endpoint(body: &str) -> Option<String> {
    serde_json::from_str::<EndpointResponse>(body)
        .ok()?
        .data?
        .ws_endpoint
        .filter(|e| !e.is_empty())
}

/// Genlogin local API session provider.
///
/// Reuses the endpoint of an already running profile, otherwise starts it.
pub struct GenloginSessionProvider {
    client: reqwest::Client,
    base_url: String,
}

impl GenloginSessionProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn running_endpoint(&self, tenant_id: &str) -> Result<Option<String>> {
        let url = format!("{}/profiles/{}/ws-endpoint", self.base_url, tenant_id);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(extract_endpoint(&response.text().await?))
    }

    async fn start_profile(&self, tenant_id: &str) -> Result<String> {
        let url = format!("{}/profiles/{}/start", self.base_url, tenant_id);
        let response = self.client.put(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Other(format!(
                "starting profile returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        extract_endpoint(&body)
            .ok_or_else(|| Error::Other("profile started without a ws endpoint".to_string()))
    }
}

#[async_trait]
impl SessionProvider for GenloginSessionProvider {
    async fn acquire_session(&self, tenant_id: &str) -> Result<String> {
        if let Some(endpoint) = self.running_endpoint(tenant_id).await? {
            return Ok(endpoint);
        }
        self.start_profile(tenant_id).await
    }
}
