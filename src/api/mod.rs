//! HTTP API Module
//!
//! Read-only JSON access to crawled nodes, plus health and metrics endpoints.

mod error;
mod metrics;
mod routes;

pub use error::ApiError;
pub use metrics::Metrics;
pub use routes::run_api_server;
