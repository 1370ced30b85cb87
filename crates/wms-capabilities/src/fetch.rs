//! Remote fetch collaborator and GetCapabilities URL construction.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use wms_common::{LayerError, LayerResult};

/// Append a query string to a base URL, preserving parameters already
/// present on it.
pub fn append_query(base_url: &str, query: &str) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base_url, separator, query)
}

/// Build a GetCapabilities URL from a service base URL and version.
pub fn get_capabilities_url(base_url: &str, version: &str) -> String {
    append_query(
        base_url,
        &format!("SERVICE=WMS&VERSION={}&REQUEST=GetCapabilities", version),
    )
}

/// Performs an HTTP GET and returns the response body.
///
/// The engine enforces no timeout of its own; implementations decide their
/// own deadlines.
#[async_trait]
pub trait RemoteFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> LayerResult<String>;
}

/// Default fetcher backed by a shared reqwest client.
pub struct HttpFetch {
    client: Client,
}

impl HttpFetch {
    pub fn new() -> LayerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LayerError::Network(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client, e.g. one configured with custom timeouts.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteFetch for HttpFetch {
    async fn fetch(&self, url: &str) -> LayerResult<String> {
        debug!(url = %url, "fetching capabilities document");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LayerError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LayerError::Network(format!(
                "server returned HTTP {} for {}",
                status, url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| LayerError::Network(e.to_string()))
    }
}
