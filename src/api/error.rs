//! API error envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;
use crate::types::CodecError;

/// Body returned with every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Request failures, each mapped to a 4xx status
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid page query: {0}")]
    InvalidPage(String),

    #[error("invalid limit query: {0}")]
    InvalidLimit(String),

    #[error("failed to find node: {0}")]
    NodeNotFound(String),

    #[error("failed to query nodes: {0}")]
    Query(#[from] StoreError),

    #[error("failed to decode node: {0}")]
    Decode(#[from] CodecError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NodeNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
