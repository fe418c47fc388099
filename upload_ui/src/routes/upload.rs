use crate::{
    page::{render, Outcome, PageView, UploadedImage, ACCEPTED_EXTENSIONS},
    server::SharedState,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use std::path::Path;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("No file was uploaded.")]
    MissingFile,
    #[error("Unsupported file type. Choose a jpg, jpeg or png image.")]
    UnsupportedType,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = match &self {
            UploadError::Multipart(e) => e.status(),
            UploadError::MissingFile => StatusCode::BAD_REQUEST,
            UploadError::UnsupportedType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        };
        tracing::warn!("Rejected upload: {}", self);

        let view = PageView {
            image: None,
            outcome: Some(Outcome::Failure(self.to_string())),
        };
        (status, Html(render(&view))).into_response()
    }
}

struct Upload {
    file_name: String,
    mime_type: String,
    data: Vec<u8>,
}

fn accepted_extension(file_name: &str) -> Option<&'static str> {
    let extension = Path::new(file_name).extension()?.to_str()?.to_lowercase();
    ACCEPTED_EXTENSIONS
        .iter()
        .find(|accepted| **accepted == extension)
        .copied()
}

fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        _ => "image/jpeg",
    }
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, UploadError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(UploadError::MissingFile);
        }
        let extension = accepted_extension(&file_name).ok_or(UploadError::UnsupportedType)?;
        let mime_type = field
            .content_type()
            .filter(|declared| declared.starts_with("image/"))
            .unwrap_or(mime_for_extension(extension))
            .to_string();
        let data = field.bytes().await?.to_vec();

        return Ok(Upload {
            file_name,
            mime_type,
            data,
        });
    }
    Err(UploadError::MissingFile)
}

#[instrument(skip(state, multipart))]
pub async fn upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Html<String>, UploadError> {
    let upload = read_upload(&mut multipart).await?;
    tracing::info!(
        "Forwarding {} ({} bytes) to {}",
        upload.file_name,
        upload.data.len(),
        state.detection_client.url()
    );

    let outcome = match state
        .detection_client
        .detect(upload.data.clone(), &upload.mime_type)
        .await
    {
        Ok(detections) => Outcome::Detections(detections),
        Err(e) => {
            tracing::error!("Detection failed: {}", e);
            Outcome::Failure(e.describe())
        }
    };

    let view = PageView {
        image: Some(UploadedImage {
            mime_type: upload.mime_type,
            data: upload.data,
        }),
        outcome: Some(outcome),
    };
    Ok(Html(render(&view)))
}
