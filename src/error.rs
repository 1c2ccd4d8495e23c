use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::domain::PaymentError;
use crate::ports::GatewayError;
use crate::use_cases::UseCaseError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Upstream error: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UseCaseError> for AppError {
    fn from(err: UseCaseError) -> Self {
        let message = err.to_string();
        match err {
            UseCaseError::PaymentNotFound(_) => AppError::NotFound(message),
            UseCaseError::PaymentAlreadyExists(_) => AppError::Conflict(message),
            UseCaseError::Payment(
                PaymentError::InvalidIdentifier { .. }
                | PaymentError::InvalidStatus(_)
                | PaymentError::InvalidType(_)
                | PaymentError::UnknownProvider(_),
            ) => AppError::Validation(message),
            UseCaseError::Payment(e) if e.is_already_in_state() => AppError::Conflict(message),
            UseCaseError::Payment(_) | UseCaseError::EmptyCart(_) | UseCaseError::CannotProcess(_) => {
                AppError::Unprocessable(message)
            }
            UseCaseError::Gateway(GatewayError::CircuitBreakerOpen(_)) => {
                AppError::Unavailable(message)
            }
            UseCaseError::Gateway(_) => AppError::BadGateway(message),
            UseCaseError::Persistence(_) | UseCaseError::Queue(_) | UseCaseError::Workflow(_) => {
                tracing::error!(error = %message, "Request failed on infrastructure");
                AppError::Internal(message)
            }
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        AppError::from(UseCaseError::Payment(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
