use crate::{
    classification::Classification,
    inference_service::ClassifyError,
    model_service::ModelService,
    server::SharedState,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const FILE_FIELD: &str = "file";
const ROUTE: &str = "/detect/";

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Missing multipart field `file`")]
    MissingFile,
    #[error("{0}")]
    Classify(#[from] ClassifyError),
}

impl DetectError {
    pub fn status(&self) -> StatusCode {
        match self {
            DetectError::Multipart(e) => e.status(),
            DetectError::MissingFile => StatusCode::BAD_REQUEST,
            DetectError::Classify(ClassifyError::EmptyUpload)
            | DetectError::Classify(ClassifyError::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            DetectError::Classify(ClassifyError::Model(_))
            | DetectError::Classify(ClassifyError::LabelMismatch { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Detection failed: {}", self);
        } else {
            tracing::warn!("Rejected detection request: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Vec<u8>, DetectError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            tracing::debug!(
                "Received file {:?} ({:?})",
                field.file_name(),
                field.content_type()
            );
            return Ok(field.bytes().await?.to_vec());
        }
    }
    Err(DetectError::MissingFile)
}

#[instrument(skip(state, multipart))]
pub async fn detect<M: ModelService>(
    State(state): State<SharedState<M>>,
    mut multipart: Multipart,
) -> Result<Json<Classification>, DetectError> {
    let result = async {
        let image_data = read_file_field(&mut multipart).await?;

        let start = Instant::now();
        let classification = state.inference_service.classify(image_data).await?;
        state
            .metrics
            .record_inference_duration(start.elapsed().as_millis() as u64, ROUTE);

        Ok::<_, DetectError>(classification)
    }
    .await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) if e.status().is_client_error() => "client_error",
        Err(_) => "server_error",
    };
    state.metrics.record_request(ROUTE, outcome);

    result.map(Json)
}
