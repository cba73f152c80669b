//! Share lookups against the request server.
//!
//! A share is a named storage location. Jobs only understand local paths, so
//! submissions carry `share://{share_id}/relative/path` URIs that are resolved
//! against the share's `file` protocol entry before a job is built.

mod uri;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;
use crate::utils::http_client::{build_client, endpoint_url};

pub use uri::{PROTOCOL_FILE, SHARE_URI_PREFIX, resolve_share_uri, share_relative_path};

/// Access details for one protocol of a share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharePath {
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Connection details (host, port, username, password, ...).
    #[serde(flatten)]
    pub credentials: serde_json::Map<String, serde_json::Value>,
}

/// A share document as served by the request server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareDetails {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub paths: HashMap<String, SharePath>,
}

impl ShareDetails {
    pub fn supports(&self, protocol: &str) -> bool {
        self.protocols.iter().any(|p| p == protocol)
    }

    /// Base path registered for `protocol`, if any.
    pub fn base_path(&self, protocol: &str) -> Option<&str> {
        self.paths.get(protocol)?.path.as_deref()
    }
}

/// Source of share metadata.
#[async_trait]
pub trait ShareResolver: Send + Sync {
    /// Look up a share. `Ok(None)` means the share is unknown.
    async fn get_share_details(&self, share_id: &str) -> Result<Option<ShareDetails>>;
}

/// Share resolver backed by `GET {base_url}/shares/{share_id}`.
///
/// Any response other than `200` is treated as an unknown share.
pub struct HttpShareResolver {
    client: Client,
    base_url: String,
}

impl HttpShareResolver {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(build_client(timeout), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ShareResolver for HttpShareResolver {
    async fn get_share_details(&self, share_id: &str) -> Result<Option<ShareDetails>> {
        let url = endpoint_url(&self.base_url, &["shares", share_id])?;

        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            warn!(
                share_id = %share_id,
                status = %response.status(),
                "Share lookup did not succeed"
            );
            return Ok(None);
        }

        let share: ShareDetails = response.json().await?;
        debug!(share_id = %share_id, protocols = ?share.protocols, "Resolved share");
        Ok(Some(share))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn share_doc() -> serde_json::Value {
        json!({
            "_id": "media-1",
            "name": "Media",
            "protocols": ["file", "ftp"],
            "paths": {
                "file": {"protocol": "file", "path": "/mnt/media"},
                "ftp": {"protocol": "ftp", "ip": "10.0.0.2", "port": 21, "username": "u", "password": "p", "path": "/"}
            },
            "state": "active"
        })
    }

    #[test]
    fn test_share_document_shape() {
        let share: ShareDetails = serde_json::from_value(share_doc()).unwrap();
        assert_eq!(share.id, "media-1");
        assert!(share.supports("file"));
        assert!(!share.supports("smb"));
        assert_eq!(share.base_path("file"), Some("/mnt/media"));
        assert_eq!(share.paths["ftp"].credentials["port"], json!(21));
    }

    #[tokio::test]
    async fn test_http_resolver_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shares/media-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(share_doc()))
            .mount(&server)
            .await;

        let resolver = HttpShareResolver::new(server.uri(), Duration::from_secs(5));
        let share = resolver.get_share_details("media-1").await.unwrap().unwrap();
        assert_eq!(share.base_path("file"), Some("/mnt/media"));
    }

    #[tokio::test]
    async fn test_http_resolver_unknown_share() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shares/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"code": 404})))
            .mount(&server)
            .await;

        let resolver = HttpShareResolver::new(server.uri(), Duration::from_secs(5));
        assert!(resolver.get_share_details("missing").await.unwrap().is_none());
    }
}
