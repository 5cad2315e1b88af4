//! Application error type mapping to HTTP status codes and envelope format.

use axum::response::{IntoResponse, Response};
use sentinel_core::workflow::service::ServiceError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Workflow service errors.
    Service(ServiceError),
    /// Malformed request input caught before reaching the service.
    Validation(String),
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        AppError::Service(e)
    }
}

impl AppError {
    /// Machine-readable code and message for the envelope.
    fn code_and_message(&self) -> (&'static str, String) {
        match self {
            AppError::Service(ServiceError::Validation(msg))
            | AppError::Service(ServiceError::InvalidStatus(msg))
            | AppError::Validation(msg) => ("VALIDATION_ERROR", msg.clone()),
            AppError::Service(e @ ServiceError::NotFound(_)) => ("NOT_FOUND", e.to_string()),
            AppError::Service(ServiceError::Conflict(msg)) => ("CONFLICT", msg.clone()),
            AppError::Service(e @ ServiceError::Repository(_)) => {
                ("INTERNAL_ERROR", e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, message) = self.code_and_message();
        if code == "INTERNAL_ERROR" {
            tracing::error!(error = %message, "request failed");
        }

        ApiResponse::error(code, &message, uuid::Uuid::now_v7().to_string(), 0).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use sentinel_types::error::RepositoryError;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_service_errors_map_to_statuses() {
        assert_eq!(
            status_of(ServiceError::Validation("bad".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServiceError::InvalidStatus("running".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServiceError::NotFound("workflow x".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ServiceError::Conflict("already failed".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::Repository(RepositoryError::Query("boom".into())).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_message() {
        let (code, message) =
            AppError::from(ServiceError::NotFound("execution 42".into())).code_and_message();
        assert_eq!(code, "NOT_FOUND");
        assert_eq!(message, "execution 42 not found");
    }
}
