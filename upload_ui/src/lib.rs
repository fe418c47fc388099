mod routes;
mod server;

pub mod app;
pub mod client;
pub mod config;
pub mod page;

pub use app::start_app;
