//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use crate::media::MediaTools;
use crate::pipeline::TaskEngine;
use crate::shares::ShareResolver;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7798
}

fn default_body_limit() -> usize {
    1024 * 1024
}

/// API server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Enable permissive CORS
    #[serde(default)]
    pub enable_cors: bool,
    /// Request body size limit in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            enable_cors: false,
            body_limit: default_body_limit(),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub engine: Arc<TaskEngine>,
    /// Share lookups for path resolution
    pub shares: Arc<dyn ShareResolver>,
    /// Tool locations handed to every job
    pub tools: MediaTools,
    /// Logging configuration for runtime filter changes
    pub logging_config: Option<Arc<LoggingConfig>>,
}

impl AppState {
    pub fn new(engine: Arc<TaskEngine>, shares: Arc<dyn ShareResolver>, tools: MediaTools) -> Self {
        Self {
            start_time: Instant::now(),
            engine,
            shares,
            tools,
            logging_config: None,
        }
    }

    pub fn with_logging(mut self, logging_config: Arc<LoggingConfig>) -> Self {
        self.logging_config = Some(logging_config);
        self
    }
}

/// The API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Token that stops the server when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware applied.
    pub fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.body_limit));

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if req.uri().path().starts_with("/health") {
                        Span::none()
                    } else {
                        let mut make_span =
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                        use tower_http::trace::MakeSpan;
                        make_span.make_span(req)
                    }
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let on_response =
                            tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                ),
        )
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::ApiError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let router = self.build_router();
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("API server listening on http://{}", addr);
        }

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| Error::ApiError(format!("Server error: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::EngineConfig;
    use crate::shares::ShareDetails;
    use crate::status::StatusReporter;
    use async_trait::async_trait;

    struct NoShares;

    #[async_trait]
    impl ShareResolver for NoShares {
        async fn get_share_details(&self, _share_id: &str) -> Result<Option<ShareDetails>> {
            Ok(None)
        }
    }

    fn state() -> AppState {
        let engine = Arc::new(TaskEngine::new(
            EngineConfig::default(),
            StatusReporter::noop(),
        ));
        AppState::new(engine, Arc::new(NoShares), MediaTools::default())
    }

    #[test]
    fn test_config_defaults() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 7798);
        assert!(!config.enable_cors);
    }

    #[tokio::test]
    async fn test_serve_until_cancelled() {
        let server = ApiServer::new(ApiServerConfig::default(), state());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = server.cancel_token();

        let handle = tokio::spawn(async move { server.serve(listener).await });

        let client = crate::utils::http_client::build_client(Duration::from_secs(5));
        let body: serde_json::Value = client
            .get(format!("http://{addr}/health/live"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "alive");

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
