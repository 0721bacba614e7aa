//! HTTP client for the registry endpoints.
//!
//! Every method returns a classified [`RegistryError`]; deciding which
//! failures to swallow is left to [`DevRegistry`](crate::DevRegistry).

use crate::config::RegistrySettings;
use crate::definition::{WorkerDefinition, WorkerRegistry};
use crate::error::{RegistryError, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Thin client over the registry's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    base_url: String,
}

impl RegistryClient {
    /// Create a client for the registry described by `settings`.
    pub fn new(settings: &RegistrySettings) -> Result<Self> {
        // No idle pooling: a registry restarted on the same port must not be
        // reached through a connection left over from its predecessor.
        // The registry is loopback-only, so proxy variables never apply.
        let mut builder = Client::builder().no_proxy().pool_max_idle_per_host(0);
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| RegistryError::Config {
            message: format!("Failed to build registry HTTP client: {}", e),
        })?;

        Ok(Self {
            client,
            base_url: settings.base_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn workers_url(&self) -> String {
        format!("{}/workers", self.base_url)
    }

    fn worker_url(&self, name: &str) -> String {
        format!("{}/workers/{}", self.base_url, urlencoding::encode(name))
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::from_transport(e, url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, url: &str) -> Result<T> {
        self.send(request, url)
            .await?
            .json::<T>()
            .await
            .map_err(|e| RegistryError::from_transport(e, url))
    }

    /// `POST /workers/{name}`.
    pub async fn upsert(&self, name: &str, definition: &WorkerDefinition) -> Result<()> {
        let url = self.worker_url(name);
        debug!("Upserting worker {} at {}", name, url);
        self.send_json::<Value>(self.client.post(&url).json(definition), &url)
            .await
            .map(drop)
    }

    /// `DELETE /workers/{name}`.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let url = self.worker_url(name);
        debug!("Removing worker {} at {}", name, url);
        self.send_json::<Value>(self.client.delete(&url), &url)
            .await
            .map(drop)
    }

    /// `GET /workers`.
    pub async fn list(&self) -> Result<WorkerRegistry> {
        let url = self.workers_url();
        self.send_json(self.client.get(&url), &url).await
    }

    /// `DELETE /workers`.
    pub async fn clear(&self) -> Result<()> {
        let url = self.workers_url();
        self.send_json::<Value>(self.client.delete(&url), &url)
            .await
            .map(drop)
    }

    /// `GET /health`; returns the number of registered workers.
    pub async fn health(&self) -> Result<u64> {
        let url = format!("{}/health", self.base_url);
        let body: Value = self.send_json(self.client.get(&url), &url).await?;
        body["workers"].as_u64().ok_or_else(|| RegistryError::Json {
            message: format!("Health response from {} has no worker count: {}", url, body),
            source: None,
        })
    }
}
