use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::common::{DomainError, DomainResult};
use crate::domains::routing::AssetFetcher;

/// Downloads map assets (stylesheets, scripts) over HTTP.
#[derive(Clone)]
pub struct HttpAssetFetcher {
    client: reqwest::Client,
}

impl HttpAssetFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| DomainError::Fetch(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> DomainResult<Vec<u8>> {
        let download_error = |reason: String| DomainError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(url, error = %e, is_timeout = e.is_timeout(), "Asset request failed");
            download_error(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Asset request returned error status");
            return Err(download_error(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| download_error(format!("reading body: {}", e)))?;
        debug!(url, bytes = body.len(), "Asset downloaded");
        Ok(body.to_vec())
    }
}
