//! HTTP service surface.
//!
//! The worker pool lives for the whole process: it is built before the
//! listener binds and shut down after the server has drained.

pub mod http;

pub use http::{router, UploadError};

use crate::core::{Config, FluxcheckError};
use crate::execution::{ValidationService, WorkerPool};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Run the server until Ctrl-C.
pub async fn serve(config: Config) -> Result<(), FluxcheckError> {
    let pool = Arc::new(WorkerPool::new(&config.pool)?);
    let service = ValidationService::new(Arc::clone(&pool), config.solver.clone())
        .with_decompressed_limit(config.server.max_decompressed_bytes);
    let app = router(service, &config.server);

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    log::info!(
        "Listening on http://{}{}/upload",
        listener.local_addr()?,
        config.server.normalized_prefix()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.shutdown();
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutdown requested"),
        Err(e) => {
            // Without a signal handler the server runs until killed.
            log::error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
