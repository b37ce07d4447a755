// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mediagate_session::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            detail: self.message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert mediagate_core errors to HTTP errors
impl From<mediagate_core::Error> for AppError {
    fn from(err: mediagate_core::Error) -> Self {
        if err.is_client_facing() {
            return Self::bad_request(err.detail());
        }
        tracing::error!("Internal error: {}", err);
        Self::internal_server_error(err.detail())
    }
}

impl From<mediagate_core::service::DeliveryError> for AppError {
    fn from(err: mediagate_core::service::DeliveryError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AlreadyConnected(_) => Self::conflict(err.to_string()),
            SessionError::AtCapacity(_) => Self::service_unavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediagate_core::models::ChannelId;

    #[test]
    fn test_core_errors_map_to_bad_request() {
        let err = AppError::from(mediagate_core::Error::InvalidRequest(
            "Error getting video info: gone".to_string(),
        ));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Error getting video info: gone");
    }

    #[test]
    fn test_internal_errors_are_masked() {
        let err = AppError::from(mediagate_core::Error::Internal("secret".to_string()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }

    #[test]
    fn test_session_errors() {
        let err = AppError::from(SessionError::AlreadyConnected(ChannelId::from("a")));
        assert_eq!(err.status, StatusCode::CONFLICT);

        let err = AppError::from(SessionError::AtCapacity(3));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
