use crate::{
    config::Config, fetch::ensure_artifact, inference_service::InferenceService,
    labels::LabelTable, ort_service::OrtModelService, server::HttpServer,
};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    ensure_artifact(&config.labels).await?;
    ensure_artifact(&config.model).await?;

    let labels = match LabelTable::new(&config.labels) {
        Ok(labels) => labels,
        Err(e) => {
            tracing::error!("Failed to initialize label table: {}", e);
            return Err(anyhow::anyhow!(e));
        }
    };
    tracing::info!("Loaded {} class labels", labels.len());

    let model_service = match OrtModelService::new(&config.model) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to initialize model service: {:?}", e);
            return Err(e.into());
        }
    };

    let inference_service =
        InferenceService::new(model_service, labels, config.classification.top_k);
    if let Err(e) = inference_service.check_label_count().await {
        tracing::error!("Model output does not match the label table: {}", e);
        return Err(e.into());
    }
    let server = HttpServer::new(inference_service, &config.server).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server_handle = server.run(shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;
    tracing::info!("Classifier stopped");

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
