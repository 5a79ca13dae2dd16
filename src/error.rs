//! Application error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

/// Error model used by request validation and single-provider relays.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    InvalidRequest {
        message: String,
        param: Option<String>,
    },
    #[error("{0}")]
    BadMultipart(String),
    #[error("{message}")]
    MissingConfiguration { message: String, setting: String },
    #[error("{message}")]
    Upstream {
        message: String,
        status: Option<u16>,
        detail: Option<Value>,
    },
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Creates a `400 Bad Request` validation error.
    pub fn invalid_request(message: impl Into<String>, param: Option<&str>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            param: param.map(ToOwned::to_owned),
        }
    }

    /// Creates a multipart parsing/shape validation error.
    pub fn bad_multipart(message: impl Into<String>) -> Self {
        Self::BadMultipart(message.into())
    }

    /// Creates a `500` error naming the environment variable that is unset.
    pub fn missing_configuration(message: impl Into<String>, setting: &str) -> Self {
        Self::MissingConfiguration {
            message: message.into(),
            setting: setting.to_string(),
        }
    }

    /// Creates a `502 Bad Gateway` error without upstream details.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            status: None,
            detail: None,
        }
    }

    /// Creates a `502 Bad Gateway` error carrying the upstream status and body.
    pub fn upstream_with_detail(message: impl Into<String>, status: u16, detail: Value) -> Self {
        Self::Upstream {
            message: message.into(),
            status: Some(status),
            detail: Some(detail),
        }
    }

    /// Creates a generic internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } | Self::BadMultipart(_) => StatusCode::BAD_REQUEST,
            Self::MissingConfiguration { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let payload = match self {
            AppError::InvalidRequest { message, param } => ErrorPayload {
                error: message,
                code: "invalid_request",
                param,
                status: None,
                detail: None,
            },
            AppError::BadMultipart(message) => ErrorPayload {
                error: message,
                code: "invalid_multipart",
                param: Some("image".to_string()),
                status: None,
                detail: None,
            },
            AppError::MissingConfiguration { message, setting } => ErrorPayload {
                error: message,
                code: "missing_configuration",
                param: Some(setting),
                status: None,
                detail: None,
            },
            AppError::Upstream {
                message,
                status,
                detail,
            } => ErrorPayload {
                error: message,
                code: "upstream_error",
                param: None,
                status,
                detail,
            },
            AppError::Internal(message) => ErrorPayload {
                error: message,
                code: "internal_error",
                param: None,
                status: None,
                detail: None,
            },
        };

        (status, Json(payload)).into_response()
    }
}
