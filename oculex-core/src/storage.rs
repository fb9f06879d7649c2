//! Bucket-style HTTP object store client.
//!
//! Speaks the plain REST surface of hosted storage services: upload via
//! `POST /object/{bucket}/{key}` with upsert disabled, public URLs under
//! `/object/public/`, JSON bodies for list and batch remove.

use std::fmt;

use serde::Deserialize;
use serde_json::json;

use crate::ports::{BlobError, BlobStore};
use async_trait::async_trait;

/// [`BlobStore`] over a storage REST API.
#[derive(Clone)]
pub struct RestBlobStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
}

impl RestBlobStore {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            bucket: bucket.into(),
            api_key: api_key.into(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, self.bucket, key)
    }
}

impl fmt::Debug for RestBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestBlobStore")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BlobStore for RestBlobStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, BlobError> {
        let response = self
            .client
            .post(self.object_url(key))
            .bearer_auth(&self.api_key)
            .header("content-type", content_type)
            .header("cache-control", "3600")
            // Collisions are a client bug; surface them instead of
            // silently overwriting another session's frames.
            .header("x-upsert", "false")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 409 {
            return Err(BlobError::Conflict(key.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BlobError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(key.to_string())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, self.bucket, path)
    }

    async fn remove_objects(&self, paths: &[String]) -> Result<(), BlobError> {
        let response = self
            .client
            .delete(format!("{}/object/{}", self.base_url, self.bucket))
            .bearer_auth(&self.api_key)
            .json(&json!({ "prefixes": paths }))
            .send()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BlobError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        let response = self
            .client
            .post(format!("{}/object/list/{}", self.base_url, self.bucket))
            .bearer_auth(&self.api_key)
            .json(&json!({ "prefix": prefix, "limit": 1000 }))
            .send()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BlobError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let listed: Vec<ListedObject> = response
            .json()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))?;
        Ok(listed.into_iter().map(|o| o.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_is_pure_assembly() {
        let store = RestBlobStore::new(
            reqwest::Client::new(),
            "https://store.example/storage/v1/",
            "frames",
            "key",
        );
        assert_eq!(
            store.public_url("sessions/abc/frame_1.png"),
            "https://store.example/storage/v1/object/public/frames/sessions/abc/frame_1.png"
        );
    }

    #[test]
    fn object_url_strips_the_trailing_slash_once() {
        let store = RestBlobStore::new(
            reqwest::Client::new(),
            "https://store.example/storage/v1",
            "frames",
            "key",
        );
        assert_eq!(
            store.object_url("a/b.png"),
            "https://store.example/storage/v1/object/frames/a/b.png"
        );
    }
}
