//! A thin client for the two registry endpoints an agent ever calls
//! (§4.F: `/agents/register`, `/heartbeat`), grounded on the teacher's
//! `RegistryClient` (`mcp/registry/client.rs`) in technique — a small
//! `reqwest::Client` wrapper with its own error taxonomy — applied to a
//! write path instead of the teacher's read-only fetch.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use mesh_core::wire::{AgentMetadata, HealthStatus, HeartbeatRequest, RegisterRequest, RegistryResponse};

#[derive(Debug, Error)]
pub enum RegistryClientError {
    #[error("registry at {url} unreachable: {cause}")]
    Unreachable { url: String, cause: String },
    #[error("registry returned {status} for {url}: {body}")]
    Rejected {
        url: String,
        status: u16,
        body: String,
    },
    #[error("could not decode registry response from {url}: {cause}")]
    Decode { url: String, cause: String },
}

/// Talks to exactly one registry base URL on behalf of one agent.
pub struct RegistryClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn register(
        &self,
        agent_id: &str,
        metadata: &AgentMetadata,
    ) -> Result<RegistryResponse, RegistryClientError> {
        let url = format!("{}/agents/register", self.base_url.trim_end_matches('/'));
        let body = RegisterRequest {
            agent_id: agent_id.to_string(),
            metadata: metadata.clone(),
        };
        self.post(&url, &body).await
    }

    pub async fn heartbeat(
        &self,
        agent_id: &str,
        health_status: HealthStatus,
    ) -> Result<RegistryResponse, RegistryClientError> {
        let url = format!("{}/heartbeat", self.base_url.trim_end_matches('/'));
        let body = HeartbeatRequest {
            agent_id: agent_id.to_string(),
            health_status,
        };
        self.post(&url, &body).await
    }

    async fn post<B: serde::Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<RegistryResponse, RegistryClientError> {
        let resp = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| RegistryClientError::Unreachable {
                url: url.to_string(),
                cause: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| RegistryClientError::Unreachable {
            url: url.to_string(),
            cause: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(RegistryClientError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| RegistryClientError::Decode {
            url: url.to_string(),
            cause: e.to_string(),
        })
    }
}
