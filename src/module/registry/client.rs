//! Block server API client
//!
//! `BlockApi` is the seam both the resolver and the loader fetch through;
//! `HttpBlockApi` is the production implementation over reqwest.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::module::registry::error::RegistryError;
use crate::module::registry::manifest::{BlockMetadata, RegistryDocument};

/// Request timeout for block server calls
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Block server API
#[async_trait]
pub trait BlockApi: Send + Sync {
    /// `GET {server}/api/blocks/{block_id}`
    async fn fetch_block(&self, block_id: &str) -> Result<BlockMetadata, RegistryError>;

    /// `GET {server}/api/blocks/registry`
    async fn fetch_registry(&self) -> Result<RegistryDocument, RegistryError>;
}

/// HTTP client for the block server
#[derive(Debug, Clone)]
pub struct HttpBlockApi {
    client: reqwest::Client,
    server_url: Url,
}

impl HttpBlockApi {
    /// Create a client for the given server base URL
    pub fn new(server_url: &str) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| RegistryError::NetworkError(format!("Failed to create HTTP client: {e}")))?;
        Self::with_client(client, server_url)
    }

    /// Create with a preconfigured reqwest client
    pub fn with_client(client: reqwest::Client, server_url: &str) -> Result<Self, RegistryError> {
        let server_url = Url::parse(server_url)
            .map_err(|e| RegistryError::InvalidUrl(format!("{server_url}: {e}")))?;
        if server_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl(server_url.to_string()));
        }
        Ok(Self { client, server_url })
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    /// Append path segments to the server URL, percent-encoding each one
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.server_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RegistryError> {
        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(RegistryError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RegistryError::Decode(format!("{url}: {e}")))
    }
}

#[async_trait]
impl BlockApi for HttpBlockApi {
    async fn fetch_block(&self, block_id: &str) -> Result<BlockMetadata, RegistryError> {
        self.get_json(self.endpoint(&["api", "blocks", block_id]))
            .await
    }

    async fn fetch_registry(&self) -> Result<RegistryDocument, RegistryError> {
        self.get_json(self.endpoint(&["api", "blocks", "registry"]))
            .await
    }
}
