use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use media_taskd::api::{ApiServer, AppState};
use media_taskd::config::AppConfig;
use media_taskd::logging;
use media_taskd::pipeline::TaskEngine;
use media_taskd::shares::HttpShareResolver;
use media_taskd::status::{HttpStatusSink, StatusReporter};

/// Upper bound for flushing queued status events at exit.
const STATUS_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let (logging_config, _log_guard) =
        logging::init_logging(&config.log_dir).context("failed to initialise logging")?;

    let background = CancellationToken::new();
    logging_config.start_retention_cleanup(background.clone());

    info!(
        request_server = %config.request_server_url,
        max_concurrent_tasks = config.engine.max_concurrent_tasks,
        ffmpeg = %config.tools.ffmpeg.display(),
        ffprobe = %config.tools.ffprobe.display(),
        "Starting media-taskd"
    );

    let http_timeout = Duration::from_secs(config.http_timeout_secs);
    let sink = Arc::new(HttpStatusSink::new(
        config.request_server_url.clone(),
        http_timeout,
    ));
    let (reporter, status_delivery) = StatusReporter::spawn(sink);

    let engine = Arc::new(TaskEngine::new(config.engine, reporter));
    let dispatch = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run().await })
    };

    let shares = Arc::new(HttpShareResolver::new(
        config.request_server_url.clone(),
        http_timeout,
    ));
    let state = AppState::new(engine.clone(), shares, config.tools.clone())
        .with_logging(logging_config.clone());
    let server = ApiServer::new(config.api.clone(), state);

    let server_token = server.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        server_token.cancel();
    });

    let served = server.run().await;
    drop(server);
    if let Err(e) = &served {
        error!(error = %e, "API server stopped with an error");
    }

    info!("Shutting down task engine");
    engine.stop().await;
    if let Err(e) = dispatch.await {
        error!(error = %e, "Dispatch loop ended abnormally");
    }

    let grace = config.engine.shutdown_grace();
    if !engine.wait_idle(grace).await {
        warn!(
            active = engine.active_count(),
            "Abandoning running tasks after {:?}",
            grace
        );
    }

    background.cancel();
    drop(engine);
    if tokio::time::timeout(STATUS_FLUSH_TIMEOUT, status_delivery)
        .await
        .is_err()
    {
        warn!("Timed out flushing task status updates");
    }

    info!("media-taskd stopped");
    served.map_err(Into::into)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
