//! Error handling module for the TeamDB service.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::schema::SchemaError;

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Request body is neither JSON nor YAML
    Payload(String),
    /// Document failed structural validation
    Schema(SchemaError),
    /// Credentials missing
    Unauthorized(String),
    /// Credentials invalid or caller not allowed
    Forbidden(String),
    /// Resource not found
    NotFound(String),
    /// Stale write rejected by the optimistic concurrency check
    Conflict {
        message: String,
        server_modified_at: Option<String>,
    },
    /// Filesystem or serialization failure
    Storage(String),
    /// Bad request
    BadRequest(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Payload(_) => StatusCode::BAD_REQUEST,
            AppError::Schema(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::PRECONDITION_FAILED,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Payload(_) => codes::INVALID_PAYLOAD,
            AppError::Schema(_) => codes::VALIDATION_ERROR,
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::Forbidden(_) => codes::FORBIDDEN,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Conflict { .. } => codes::CONFLICT,
            AppError::Storage(_) => codes::STORAGE_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Payload(msg) => msg.clone(),
            AppError::Schema(err) => err.to_string(),
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Forbidden(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Conflict { message, .. } => message.clone(),
            AppError::Storage(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Schema(err) => Some(serde_json::json!({ "path": err.path })),
            AppError::Conflict {
                server_modified_at, ..
            } => Some(serde_json::json!({ "serverModifiedAt": server_modified_at })),
            _ => None,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<SchemaError> for AppError {
    fn from(err: SchemaError) -> Self {
        AppError::Schema(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        tracing::error!("I/O error: {:?}", err);
        AppError::Storage(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::Storage(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        tracing::error!("YAML error: {:?}", err);
        AppError::Storage(format!("YAML error: {}", err))
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(error: &AppError) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
                details: error.details(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::new(&self);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Payload("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Conflict {
                message: "x".into(),
                server_modified_at: None
            }
            .status_code(),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            AppError::Storage("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_schema_error_envelope_carries_path() {
        let err = AppError::Schema(SchemaError {
            message: "must be a string".into(),
            path: vec!["database".into(), "people".into(), "0".into(), "site".into()],
        });
        let body = serde_json::to_value(ErrorResponse::new(&err)).unwrap();

        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(
            body["error"]["message"],
            "Validation error: must be a string at database/people/0/site"
        );
        assert_eq!(
            body["error"]["details"]["path"],
            serde_json::json!(["database", "people", "0", "site"])
        );
    }

    #[test]
    fn test_plain_error_has_no_details() {
        let body = serde_json::to_value(ErrorResponse::new(&AppError::NotFound(
            "Database not found".into(),
        )))
        .unwrap();
        assert!(body["error"].get("details").is_none());
    }
}
