use crate::{model_service::ModelService, server::SharedState};
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct LabelList {
    labels: Vec<String>,
}

pub async fn labels<M: ModelService>(State(state): State<SharedState<M>>) -> Json<LabelList> {
    Json(LabelList {
        labels: state.inference_service.labels().get_labels().to_vec(),
    })
}
