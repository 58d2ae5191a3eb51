//! Application error type mapping to HTTP status codes and JSON error bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use volpina_types::error::MessageError;

const INTERNAL_MESSAGE: &str = "internal server error";

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Message service errors.
    Message(MessageError),
    /// Malformed request (bad path id, unreadable body).
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<MessageError> for AppError {
    fn from(e: MessageError) -> Self {
        AppError::Message(e)
    }
}

impl AppError {
    /// Failures caused by the server rather than the request; these are logged.
    fn is_server_failure(&self) -> bool {
        match self {
            AppError::Message(e) => !e.is_client_error(),
            AppError::Internal(_) => true,
            AppError::Validation(_) => false,
        }
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Message(MessageError::Validation(msg)) | AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Message(MessageError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "MESSAGE_NOT_FOUND",
                format!("Message {id} not found"),
            ),
            AppError::Message(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                INTERNAL_MESSAGE.to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if self.is_server_failure() {
            match &self {
                AppError::Message(e) => tracing::error!(error = %e, "Request failed"),
                AppError::Internal(detail) => tracing::error!(%detail, "Request failed"),
                AppError::Validation(_) => {}
            }
        }

        let body = json!({
            "error": {
                "code": code,
                "message": message,
            }
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
