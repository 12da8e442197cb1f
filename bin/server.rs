// Pledge Registry - Web Server
// JSON API with Axum

use anyhow::{Context, Result};
use pledge_registry::api::{router, AppState};
use pledge_registry::{init_tracing, Config, Registry, StoreError};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("loading configuration")?;
    let registry = Arc::new(Registry::from_config(&config));

    // Bad credentials should stop startup; a flaky network should not
    match registry.connect().await {
        Ok(()) => info!(backend = registry.backend_tag(), "Row store connected"),
        Err(e @ (StoreError::Auth(_) | StoreError::Misconfigured(_))) => {
            return Err(e).context("row store rejected configuration");
        }
        Err(e) => warn!(error = %e, "Row store unreachable at startup, will retry on demand"),
    }

    let app = router(AppState::new(registry, &config));

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;

    info!("Server running on http://{address}");
    info!("   API: http://{address}/api/stats");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
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
}
