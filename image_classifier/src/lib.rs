mod fetch;
mod inference_service;
mod ort_service;
mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod classification;
pub mod config;
pub mod labels;
pub mod model_service;
pub mod preprocessing;

pub use app::start_app;
pub use inference_service::{ClassifyError, InferenceService};
