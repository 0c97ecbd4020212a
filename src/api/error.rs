use crate::services::upload_service::{ErrorCategory, UploadError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Request Timeout: {0}")]
    RequestTimeout(String),

    #[error("Service Unavailable: {0}")]
    Unavailable(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

// Upload failures are logged where they are detected, so the mapping stays silent.
impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        let msg = err.to_string();
        match err.category() {
            ErrorCategory::InvalidArgument => match err {
                UploadError::FileTooLarge { .. } => AppError::PayloadTooLarge(msg),
                _ => AppError::BadRequest(msg),
            },
            ErrorCategory::Internal => AppError::Internal(msg),
            ErrorCategory::Unknown => AppError::BadRequest(msg),
            ErrorCategory::Canceled => AppError::Unavailable(msg),
            ErrorCategory::DeadlineExceeded => AppError::RequestTimeout(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Internal(_) => "Internal Server Error".to_string(),
            AppError::BadRequest(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::RequestTimeout(msg)
            | AppError::Unavailable(msg) => msg,
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
