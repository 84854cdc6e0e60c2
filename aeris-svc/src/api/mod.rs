//! HTTP API: thin handlers over the service facade.
//!
//! The transport layer only validates, delegates, and maps errors; all
//! domain logic lives below it. Responses are JSON with RFC3339 UTC
//! timestamps.

pub mod air_quality;
pub mod sse;
pub mod subscriptions;

use aeris_common::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

/// Error envelope for the transport boundary. Provider-side errors are
/// absorbed long before this point; anything unexpected surfaces opaque.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.0 {
            Error::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "bad_request", reason.clone())
            }
            Error::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                self.0.to_string(),
            ),
            other => {
                error!(error = %other, "unexpected error at transport boundary");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
