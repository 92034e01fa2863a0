//! HTTP collaborator for remote embedding and observation services.
//!
//! - `GET {base_url}/fragments/{key}` returns a JSON array of fragments
//! - `GET {base_url}/observations/{key}` returns a JSON array of symbols

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CollaboratorConfig, Fragment};
use crate::domain::ports::{EmbeddingProvider, ObservationSource};

/// Configuration for the remote collaborator
#[derive(Debug, Clone)]
pub struct RemoteCollaboratorConfig {
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl RemoteCollaboratorConfig {
    /// `None` when no base URL is configured.
    pub fn from_settings(settings: &CollaboratorConfig) -> Option<Self> {
        settings.base_url.as_ref().map(|base_url| Self {
            base_url: base_url.clone(),
            timeout: Duration::from_millis(settings.request_timeout_ms),
        })
    }
}

/// Fetches fragments and observations over HTTP
#[derive(Debug, Clone)]
pub struct RemoteCollaborator {
    http_client: ReqwestClient,
    base_url: String,
}

impl RemoteCollaborator {
    pub fn new(config: RemoteCollaboratorConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, resource: &str, key: &str) -> DomainResult<T> {
        let url = format!("{}/{resource}/{key}", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| DomainError::Collaborator(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DomainError::SessionNotFound(key.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::Collaborator(format!(
                "GET {url} returned {status}: {body}"
            )));
        }

        let parsed = response
            .json::<T>()
            .await
            .map_err(|e| DomainError::Collaborator(format!("invalid response from {url}: {e}")))?;
        debug!(%url, "collaborator response received");
        Ok(parsed)
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteCollaborator {
    #[instrument(skip(self), level = "debug")]
    async fn fragments(&self, key: &str) -> DomainResult<Vec<Fragment>> {
        self.get_json("fragments", key).await
    }
}

#[async_trait]
impl ObservationSource for RemoteCollaborator {
    #[instrument(skip(self), level = "debug")]
    async fn observations(&self, key: &str) -> DomainResult<Vec<usize>> {
        self.get_json("observations", key).await
    }
}
