use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;
use sqlx::error::ErrorKind;
use std::borrow::Borrow;

use crate::utils::validation::FieldErrors;

/// Error surfaced by handlers. Anything unexpected collapses to a generic 500;
/// the cause is only written to the log.
#[derive(Debug, Display)]
pub enum ApiError {
    #[display(fmt = "{}", _0)]
    BadRequest(String),

    #[display(fmt = "Validation failed")]
    Validation(FieldErrors),

    #[display(fmt = "{}", _0)]
    Unauthorized(String),

    #[display(fmt = "{}", _0)]
    Forbidden(String),

    #[display(fmt = "{}", _0)]
    NotFound(String),

    #[display(fmt = "{}", _0)]
    Conflict(String),

    #[display(fmt = "Internal Server Error")]
    Internal,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }

    /// Logs a database failure and classifies it for the caller.
    /// Also takes the `Arc<sqlx::Error>` a shared cache load hands back.
    pub fn database<E: Borrow<sqlx::Error>>(err: E, context: &str) -> Self {
        let err = err.borrow();
        if let sqlx::Error::Database(db_err) = err {
            match db_err.kind() {
                ErrorKind::UniqueViolation => {
                    tracing::info!(error = %db_err, "{context}: duplicate record");
                    return ApiError::Conflict("Record already exists".to_string());
                }
                ErrorKind::ForeignKeyViolation => {
                    tracing::info!(error = %db_err, "{context}: missing referenced record");
                    return ApiError::BadRequest("Referenced record does not exist".to_string());
                }
                _ => {}
            }
        }

        tracing::error!(error = %err, "{context}");
        ApiError::Internal
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Validation(errors) => json!({
                "message": self.to_string(),
                "errors": errors,
            }),
            _ => json!({ "message": self.to_string() }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}
