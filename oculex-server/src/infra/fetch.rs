//! HTTP implementation of the frame-reference fetcher.

use async_trait::async_trait;
use oculex_core::ports::{FetchError, FrameFetcher};

/// Fetches referenced frame bytes over plain GET. Any non-2xx response is
/// surfaced as-is; the orchestrator decides what that means for the run.
#[derive(Debug, Clone)]
pub struct HttpFrameFetcher {
    client: reqwest::Client,
}

impl HttpFrameFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FrameFetcher for HttpFrameFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
