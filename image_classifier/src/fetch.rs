use crate::config::Validatable;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("File not found and no download_url configured: {0:?}")]
    Missing(PathBuf),
    #[error("Download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to write downloaded file: {0}")]
    Io(#[from] std::io::Error),
}

/// Returns the local path of a model artifact, downloading it first if it is missing.
pub async fn ensure_artifact(artifact: &impl Validatable) -> Result<PathBuf, FetchError> {
    let path = artifact.get_path();
    if path.exists() {
        return Ok(path);
    }

    let url = artifact
        .download_url()
        .ok_or_else(|| FetchError::Missing(path.clone()))?;

    tracing::info!("Downloading {} to {:?}", url, path);
    let bytes = reqwest::get(url)
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &bytes).await?;
    tracing::info!("Wrote {} bytes to {:?}", bytes.len(), path);

    Ok(path)
}
