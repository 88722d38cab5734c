//! HTTP transport for the search endpoint.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use std::time::Duration;

use crate::client::{FetchError, Transport, TransportResponse};
use crate::config::{ApiConfig, ApiKey};
use crate::utils::HttpClient;

/// Sends authenticated GET requests to the search endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    endpoint: String,
    api_key: ApiKey,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: ApiKey,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        Ok(Self::with_client(
            HttpClient::with_timeout(timeout)?,
            endpoint,
            api_key,
        ))
    }

    /// Create with a custom HTTP client
    pub fn with_client(client: HttpClient, endpoint: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    /// Create from the `[api]` configuration section
    pub fn from_config(config: &ApiConfig, api_key: ApiKey) -> Result<Self, FetchError> {
        Self::new(
            config.endpoint.clone(),
            api_key,
            Duration::from_secs(config.timeout_seconds),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, query: &[(String, String)]) -> Result<TransportResponse, FetchError> {
        let response = self
            .client
            .client()
            .get(&self.endpoint)
            .query(query)
            .header(AUTHORIZATION, format!("Token {}", self.api_key.expose()))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!("GET {} -> {} ({} bytes)", self.endpoint, status, body.len());

        Ok(TransportResponse { status, body })
    }
}
