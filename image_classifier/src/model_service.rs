use crate::preprocessing::ImageTensor;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Session mutex poisoned: {0}")]
    PoisonedSession(String),
    #[error("Invalid output tensor shape: {0}")]
    OutputShape(String),
    #[error("Inference task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Runs a single forward pass and returns one raw score per class.
#[async_trait]
pub trait ModelService: Send + Sync + Clone + 'static {
    async fn forward(&self, input: ImageTensor) -> Result<Vec<f32>, ModelError>;
}
