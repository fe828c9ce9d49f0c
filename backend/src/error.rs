//! Error handling for the inventory server
//!
//! Every error is rendered as the JSON envelope the UI expects:
//! HTTP 200 with `success: false`, a message, a machine readable code and,
//! where relevant, the offending field or a list of per-item errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{FieldError, StockShortfall};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Session errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid CSRF token")]
    InvalidCsrfToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business rule errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Insufficient stock for {} item(s)", .0.len())]
    InsufficientStock(Vec<StockShortfall>),

    #[error("Processing failed for {} item(s)", .errors.len())]
    ProcessingFailed { errors: Vec<String> },

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldError> for AppError {
    fn from(err: FieldError) -> Self {
        AppError::Validation {
            field: err.field.to_string(),
            message: err.message.to_string(),
        }
    }
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Turn a unique violation on `field` into `DuplicateEntry`
    pub fn unique_violation(err: sqlx::Error, field: &str) -> Self {
        if is_unique_violation(&err) {
            AppError::DuplicateEntry(field.to_string())
        } else {
            AppError::DatabaseError(err)
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::InvalidCsrfToken => "INVALID_CSRF_TOKEN",
            AppError::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            AppError::Validation { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidStateTransition(_) => "INVALID_TRANSITION",
            AppError::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            AppError::ProcessingFailed { .. } => "PROCESSING_FAILED",
            AppError::DatabaseError(err) if is_unique_violation(err) => "DUPLICATE_ENTRY",
            AppError::DatabaseError(_) => "PERSISTENCE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    fn is_server_fault(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseError(_) | AppError::Internal(_) | AppError::InternalError(_)
        )
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

/// Error envelope
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: code.to_string(),
            field: None,
            errors: None,
        }
    }
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let code = err.code();
        match err {
            AppError::Unauthorized(msg) => ErrorResponse::new(code, msg.clone()),
            AppError::InvalidCsrfToken => {
                ErrorResponse::new(code, "Invalid or missing CSRF token")
            }
            AppError::InsufficientPermissions => ErrorResponse::new(
                code,
                "You do not have permission to perform this action",
            ),
            AppError::Validation { field, message } => ErrorResponse {
                field: Some(field.clone()),
                ..ErrorResponse::new(code, message.clone())
            },
            AppError::ValidationError(msg) => ErrorResponse::new(code, msg.clone()),
            AppError::DuplicateEntry(field) => ErrorResponse {
                field: Some(field.clone()),
                ..ErrorResponse::new(code, format!("A record with this {} already exists", field))
            },
            AppError::NotFound(resource) => {
                ErrorResponse::new(code, format!("{} not found", resource))
            }
            AppError::InvalidStateTransition(msg) => ErrorResponse::new(code, msg.clone()),
            AppError::InsufficientStock(shortfalls) => ErrorResponse {
                errors: Some(shortfalls.iter().map(ToString::to_string).collect()),
                ..ErrorResponse::new(code, "Insufficient stock at the source store")
            },
            AppError::ProcessingFailed { errors } => ErrorResponse {
                errors: Some(errors.clone()),
                ..ErrorResponse::new(code, "Container processing failed; no changes were saved")
            },
            AppError::DatabaseError(err) if is_unique_violation(err) => {
                ErrorResponse::new(code, "A record with the same unique value already exists")
            }
            AppError::DatabaseError(err) => {
                ErrorResponse::new(code, format!("Database error: {}", err))
            }
            AppError::Internal(msg) => ErrorResponse::new(code, msg.clone()),
            AppError::InternalError(_) => {
                ErrorResponse::new(code, "An internal server error occurred")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_server_fault() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!(code = self.code(), "Request rejected: {}", self);
        }

        (StatusCode::OK, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_errors_are_http_200_envelopes() {
        let (status, body) = body_json(AppError::NotFound("Container".to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["message"], "Container not found");
        assert!(body.get("field").is_none());
    }

    #[tokio::test]
    async fn test_validation_carries_field() {
        let (_, body) = body_json(AppError::validation("quantity", "must be positive")).await;
        assert_eq!(body["field"], "quantity");
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_insufficient_stock_lists_shortfalls() {
        let shortfall = StockShortfall {
            item_id: Uuid::nil(),
            barcode_id: Uuid::nil(),
            requested: 12,
            available: 10,
        };
        let (_, body) = body_json(AppError::InsufficientStock(vec![shortfall])).await;
        assert_eq!(body["code"], "INSUFFICIENT_STOCK");
        assert_eq!(body["errors"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_processing_failure_keeps_every_error() {
        let err = AppError::ProcessingFailed {
            errors: vec!["new_item a: duplicate".into(), "box b: not found".into()],
        };
        let (_, body) = body_json(err).await;
        assert_eq!(body["errors"][1], "box b: not found");
    }

    #[test]
    fn test_conflict_and_state_errors() {
        let (_, body) = tokio_test::block_on(body_json(AppError::DuplicateEntry("item_code".into())));
        assert_eq!(body["code"], "DUPLICATE_ENTRY");

        let (_, body) = tokio_test::block_on(body_json(AppError::InvalidStateTransition(
            "Container cannot move from processed to processed".into(),
        )));
        assert_eq!(body["code"], "INVALID_TRANSITION");
        assert_eq!(body["success"], false);
    }

    #[test]
    fn test_field_error_conversion() {
        let err: AppError = FieldError::new("base_cost", "Amount cannot be negative").into();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "base_cost"));
    }
}
