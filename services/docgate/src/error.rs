//! Request-level errors and their JSON rendering
//!
//! Every failure leaves the service as
//! `{"error":{"type":"...","message":"...","request_id":"req_..."}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docgate_core::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("request body is empty")]
    EmptyBody,

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("credential reload failed: {0}")]
    Reload(#[from] common::Error),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownTool(_) => StatusCode::NOT_FOUND,
            ApiError::EmptyBody | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Reload(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Gateway(err) => match err {
                GatewayError::Unsupported { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                GatewayError::JobTimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
                GatewayError::JobFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                GatewayError::TransientNetwork { .. } | GatewayError::AuthFailure { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                GatewayError::Unconfigured { .. }
                | GatewayError::QuotaExceeded { .. }
                | GatewayError::AllProvidersExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    /// Value of the `type` field in the error body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::UnknownTool(_) => "unknown_tool",
            ApiError::EmptyBody | ApiError::InvalidBody(_) => "invalid_request",
            ApiError::BodyTooLarge { .. } => "payload_too_large",
            ApiError::Reload(_) => "reload_failed",
            ApiError::Gateway(err) => err.kind(),
        }
    }

    pub fn into_response_with(self, request_id: &str) -> Response {
        error_response(self.status(), self.kind(), &self.to_string(), request_id)
    }
}

pub fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

pub fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}
