//! API error type and conversions

use aigw_core::GatewayError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Wraps the gateway error taxonomy for HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl ApiError {
    /// 400 Bad Request with a free-form message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(GatewayError::InvalidRequest(message.into()))
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

/// Non-streaming error envelope: `{error: {message, type, code}}`.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: &'static str,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.status_code();
        let error_type = self.0.error_type();
        let message = self.0.to_string();

        let status =
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::warn!(error = error_type, %message, "request failed");
        } else {
            tracing::debug!(error = error_type, %message, "request rejected");
        }

        let body = Json(ErrorBody {
            error: ErrorDetail {
                message,
                error_type,
                code,
            },
        });

        (status, body).into_response()
    }
}
