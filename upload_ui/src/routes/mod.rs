mod health;
mod index;
mod upload;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index::index))
        .route("/upload", post(upload::upload))
        .route("/health", get(health::healthcheck))
}
