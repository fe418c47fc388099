use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct Status {
    status: &'static str,
}

pub async fn healthcheck() -> Json<Status> {
    Json(Status {
        status: "Available",
    })
}
