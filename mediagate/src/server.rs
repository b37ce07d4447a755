//! Server lifecycle management

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use mediagate_api::{create_router, AppState};
use mediagate_core::Config;
use mediagate_session::ChannelRegistry;

/// How long open progress channels may take to go away on shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct MediaGateServer {
    config: Config,
    state: AppState,
}

impl MediaGateServer {
    pub const fn new(config: Config, state: AppState) -> Self {
        Self { config, state }
    }

    /// Serve HTTP until a shutdown signal arrives
    pub async fn start(self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut http_handle = self.start_http_server(shutdown_rx).await?;
        info!("Server started successfully");

        tokio::select! {
            _ = &mut http_handle => {
                error!("HTTP server stopped unexpectedly");
                return Err(anyhow::anyhow!("HTTP server stopped unexpectedly"));
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
            }
        }

        let _ = shutdown_tx.send(true);
        drain_channels(&self.state.registry, DRAIN_TIMEOUT).await;

        if let Err(e) = http_handle.await {
            error!("HTTP server task failed: {}", e);
        }
        info!("mediagate stopped");
        Ok(())
    }

    async fn start_http_server(
        &self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<JoinHandle<()>> {
        let http_address = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&http_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_address}: {e}"))?;
        info!("HTTP server listening on {}", http_address);

        let router = create_router(self.state.clone());

        let handle = tokio::spawn(async move {
            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        });

        Ok(handle)
    }
}

/// Close open progress channels and wait for their connections to let go
///
/// Graceful shutdown stops new connections, but upgraded WebSocket
/// connections are not tracked by it. Cancelling a channel makes its
/// connection send a close frame and release the id.
async fn drain_channels(registry: &ChannelRegistry, timeout: Duration) {
    let active = registry.connection_count();
    if active == 0 {
        return;
    }
    info!(
        "Closing {} progress channel(s), waiting up to {}s...",
        active,
        timeout.as_secs()
    );
    registry.close_all();

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = registry.connection_count();
        if remaining == 0 {
            info!("All progress channels closed");
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(
                "Drain timeout reached with {} channel(s) still open, proceeding with shutdown",
                remaining
            );
            break;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
