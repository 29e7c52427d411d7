use core::future::Future;

use orchestrator_keys::KeyStore;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use crate::config::OrchestratorConfig;
use crate::handlers::{create_router, AppState};

/// Serve the key API until `shutdown` resolves.
///
/// # Arguments
///
/// * `config` - The service configuration
/// * `store` - Handle to the key store shared with the reaper
/// * `shutdown` - Future that triggers a graceful shutdown
pub async fn start_server<F>(
    config: &OrchestratorConfig,
    store: KeyStore,
    shutdown: F,
) -> eyre::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(AppState::new(store), &config.cors);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("Token orchestrator listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Wait for a shutdown signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(%err, "Failed to install Ctrl+C handler");
            core::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                let _received = stream.recv().await;
            }
            Err(err) => {
                error!(%err, "Failed to install SIGTERM handler");
                core::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = core::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, shutting down");
}
