mod detect;
mod health;
mod labels;
mod metrics;

use crate::{model_service::ModelService, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/detect/", post(detect::detect::<M>))
        .route("/detect", post(detect::detect::<M>))
        .route("/labels", get(labels::labels::<M>))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler::<M>))
}
