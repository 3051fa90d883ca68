use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::approval::ApprovalError;
use crate::services::registration::RegistrationError;
use crate::services::storage::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Phone number already registered")]
    DuplicatePhone,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Photo and payment proof are required before approval")]
    MissingProof,

    #[error("Record was modified concurrently, retry the operation")]
    Conflict,

    #[error("File storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Could not allocate a membership identifier")]
    Allocation,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Validation(errors) => AppError::Validation(errors.to_string()),
            RegistrationError::InvalidField(msg) => AppError::Validation(msg),
            RegistrationError::DuplicatePhone => AppError::DuplicatePhone,
            RegistrationError::NotFound => AppError::NotFound("applicant".to_string()),
            RegistrationError::Conflict => AppError::Conflict,
            RegistrationError::Storage(e) => AppError::Storage(e),
            RegistrationError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<ApprovalError> for AppError {
    fn from(err: ApprovalError) -> Self {
        match err {
            ApprovalError::NotFound => AppError::NotFound("applicant".to_string()),
            ApprovalError::MissingProof => AppError::MissingProof,
            ApprovalError::Conflict => AppError::Conflict,
            ApprovalError::AllocationFailed => AppError::Allocation,
            ApprovalError::DuplicatePhone => AppError::DuplicatePhone,
            ApprovalError::InvalidField(msg) => AppError::Validation(msg),
            ApprovalError::Database(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::DuplicatePhone => (StatusCode::CONFLICT, self.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::MissingProof => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::Conflict => (StatusCode::CONFLICT, self.to_string()),
            AppError::Storage(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Allocation => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            ),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "success": false,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
