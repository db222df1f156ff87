use axum::http::StatusCode;
use thiserror::Error;

use crate::error::{ErrorMessage, HttpError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        let unique_violation = err
            .as_database_error()
            .map(|db_err| db_err.is_unique_violation())
            .unwrap_or(false);

        if unique_violation {
            ServiceError::Conflict(err.to_string())
        } else {
            ServiceError::Database(err)
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let message = error.to_string();
        match error {
            ServiceError::InvalidArgument(_) => HttpError::bad_request(message),
            ServiceError::NotFound(_) => HttpError::not_found(message),
            ServiceError::Forbidden(_) => HttpError::forbidden(message),
            ServiceError::Conflict(_) => HttpError::conflict(message),
            ServiceError::InvalidTransition(_) => HttpError::unprocessable(message),
            ServiceError::Database(_) => {
                tracing::error!("{}", message);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
        }
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::InvalidTransition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn request_not_found(id: uuid::Uuid) -> Self {
        ServiceError::NotFound(format!("Service request {}", id))
    }

    pub fn quote_not_found(id: uuid::Uuid) -> Self {
        ServiceError::NotFound(format!("Quote {}", id))
    }

    pub fn agreement_not_found(id: uuid::Uuid) -> Self {
        ServiceError::NotFound(format!("Agreement {}", id))
    }
}
