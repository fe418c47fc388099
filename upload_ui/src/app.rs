use crate::client::DetectionClient;
use crate::config::Config;
use crate::server::HttpServer;

use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let detection_client = match DetectionClient::new(&config.detection_service) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to initialize detection client: {:?}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Detection endpoint: {}", detection_client.url());

    let server = HttpServer::new(detection_client, &config.server).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server_handle = server.run(shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
