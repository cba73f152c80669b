use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::StatusEvent;
use crate::utils::http_client::{build_client, endpoint_url};
use crate::{Error, Result};

/// Destination for status events.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Deliver one event. Anything but an explicit acknowledgement is an error.
    async fn deliver(&self, event: &StatusEvent) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(default)]
    ok: bool,
}

/// Status sink backed by the request server's `tasks-status` endpoint.
///
/// Each event is sent as `PUT {base_url}/tasks-status/{task_id}`; delivery
/// counts as successful only for a `200` response whose JSON body carries
/// `"ok": true`.
pub struct HttpStatusSink {
    client: Client,
    base_url: String,
}

impl HttpStatusSink {
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
impl StatusSink for HttpStatusSink {
    async fn deliver(&self, event: &StatusEvent) -> Result<()> {
        let url = endpoint_url(&self.base_url, &["tasks-status", &event.task_id])?;

        let response = self.client.put(url).json(event).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ApiError(format!(
                "status update rejected with HTTP {status}: {body}"
            )));
        }

        let ack: Ack = response.json().await?;
        if !ack.ok {
            return Err(Error::ApiError(
                "status update not acknowledged".to_string(),
            ));
        }
        Ok(())
    }
}
