use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use quotegate_core::{GatewayError, ValidationError};
use serde::Serialize;
use tracing::{error, warn};

/// Success body: `{"success": true, "data": ..., "count": n}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            count: None,
        }
    }
}

impl<T> Envelope<Vec<T>> {
    pub fn counted(data: Vec<T>) -> Self {
        Self {
            success: true,
            count: Some(data.len()),
            data,
        }
    }
}

/// Failure body: `{"success": false, "error": "...", "detail": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Facade failure rendered with its taxonomy status code.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(ValidationError::InvalidRequest(message.into()).into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self(GatewayError::not_found(message))
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self(error)
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, detail = ?self.0.detail(), "request failed");
        } else {
            warn!(code = self.0.code(), error = %self.0, "request rejected");
        }

        let body = ErrorBody {
            success: false,
            error: self.0.to_string(),
            detail: self.0.detail().map(str::to_owned),
        };
        (status, Json(body)).into_response()
    }
}
