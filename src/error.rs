use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

use crate::database::models::LeaveType;
use crate::response::ApiResponse;

/// Failures raised by a store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Insufficient {0} quota")]
    InsufficientQuota(LeaveType),

    #[error("Record not found")]
    NotFound,

    #[error("Store backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{domain}: {message}")]
    Domain {
        domain: &'static str,
        message: String,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Domain { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = self.to_string();

        if status_code.is_server_error() {
            log::error!(
                "Request failed with status {}: {}",
                status_code,
                error_message
            );
        } else {
            log::warn!(
                "Request rejected with status {}: {}",
                status_code,
                error_message
            );
        }

        let response_body = ApiResponse::<()>::error(&error_message);

        HttpResponse::build(status_code).json(response_body)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        log::error!("Database error: {}", error);
        AppError::DatabaseError(error)
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            // A guarded reservation that would overdraw the balance is the
            // client's problem, not ours.
            StoreError::InsufficientQuota(leave_type) => AppError::Domain {
                domain: "Leave",
                message: format!(
                    "there are no more quota for leave type {}. Please consider selecting other type",
                    leave_type.to_string().to_lowercase()
                ),
            },
            StoreError::Database(error) => AppError::from(error),
            other => {
                log::error!("Store error: {}", other);
                AppError::Store(other)
            }
        }
    }
}

impl AppError {
    pub fn domain(domain: &'static str, message: impl Into<String>) -> Self {
        AppError::Domain {
            domain,
            message: message.into(),
        }
    }

    /// Whether the caller can correct the failure by changing the request.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            AppError::Domain { .. } | AppError::BadRequest(_) | AppError::Forbidden(_)
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
