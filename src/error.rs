use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Authentication failed")]
    Unauthorized,

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A nearby report of the same category already exists.
    #[error("Possible duplicate of issue #{existing_issue_id}")]
    Duplicate {
        existing_issue_id: i32,
        message: String,
    },

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Migration required: {0}")]
    MigrationRequired(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl utoipa::ToSchema for AppError {
    fn name() -> std::borrow::Cow<'static, str> {
        "ErrorResponse".into()
    }
}

impl utoipa::PartialSchema for AppError {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        ErrorResponse::schema()
    }
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Validation(_) | AppError::Conflict(_) | AppError::Duplicate { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::Database(_) | AppError::MigrationRequired(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the client. Server-side failures are logged here
    /// and replaced with a generic text.
    fn public_message(self) -> String {
        match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::MigrationRequired(what) => {
                tracing::error!("Schema drift detected: {}", what);
                "Database migration required. Please run pending migrations.".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "Internal server error".to_string()
            }
            AppError::Jwt(e) => {
                tracing::debug!("JWT error: {:?}", e);
                "Invalid token".to_string()
            }
            AppError::Unauthorized => "Unauthorized".to_string(),
            AppError::Forbidden => "Forbidden".to_string(),
            AppError::NotFound => "Resource not found".to_string(),
            AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::PayloadTooLarge(msg) => msg,
            AppError::Duplicate { message, .. } => message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            AppError::Duplicate {
                existing_issue_id,
                message,
            } => json!({
                "error": message,
                "duplicate": true,
                "existing_issue_id": existing_issue_id,
                "message": message,
            }),
            other => json!({ "error": other.public_message() }),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Conflict("Email already registered".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        let dup = AppError::Duplicate {
            existing_issue_id: 7,
            message: "Similar issue already reported".into(),
        };
        assert_eq!(dup.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn oversize_upload_is_413() {
        let err = AppError::PayloadTooLarge("Image exceeds 2MB".into());
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.public_message(), "Image exceeds 2MB");
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = AppError::Internal(anyhow::anyhow!("smtp password rejected"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
    }
}
