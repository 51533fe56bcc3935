//! # HTTP Error Type
//!
//! Maps engine errors onto status codes with a JSON body:
//! ```json
//! { "code": "ALREADY_RUNNING", "message": "A sync run is already in progress" }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tradepost_sync::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// 400
    InvalidPayload,
    /// 401
    InvalidSignature,
    /// 404
    NotFound,
    /// 409
    AlreadyRunning,
    /// 502
    RemoteError,
    /// 503
    ShuttingDown,
    /// 500
    Internal,
}

impl ErrorCode {
    fn status(self) -> StatusCode {
        match self {
            ErrorCode::InvalidPayload => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidSignature => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyRunning => StatusCode::CONFLICT,
            ErrorCode::RemoteError => StatusCode::BAD_GATEWAY,
            ErrorCode::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerError {
    pub code: ErrorCode,
    pub message: String,
}

impl ServerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerError {
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }
}

impl From<SyncError> for ServerError {
    fn from(err: SyncError) -> Self {
        let code = match &err {
            SyncError::InvalidSignature => ErrorCode::InvalidSignature,
            SyncError::InvalidPayload(_) => ErrorCode::InvalidPayload,
            SyncError::NotFound { .. } => ErrorCode::NotFound,
            SyncError::AlreadyRunning => ErrorCode::AlreadyRunning,
            SyncError::Cancelled => ErrorCode::ShuttingDown,
            SyncError::Api(_) => ErrorCode::RemoteError,
            _ => ErrorCode::Internal,
        };

        if code == ErrorCode::Internal {
            tracing::error!(error = %err, "Request failed");
        }
        ServerError::new(code, err.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ServerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (SyncError::AlreadyRunning, StatusCode::CONFLICT),
            (SyncError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (SyncError::InvalidPayload("x".into()), StatusCode::BAD_REQUEST),
            (
                SyncError::NotFound {
                    entity: "Expansion",
                    id: 4,
                },
                StatusCode::NOT_FOUND,
            ),
            (SyncError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status(), status);
        }
    }
}
