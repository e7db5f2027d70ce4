//! Translation of core errors into HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use homecam_core::Error;
use serde::Serialize;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// Failure returned by a handler
#[derive(Debug)]
pub enum ApiError {
    /// Error raised by the core engine
    Core(Error),
    /// Request was malformed
    BadRequest(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(err) => match err {
                Error::CameraUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                Error::EncodingFailure(_) | Error::StreamingError(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                Error::AuthExpired
                | Error::AuthInvalidSignature(_)
                | Error::AuthInvalidToken { .. }
                | Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
                Error::AuthServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                Error::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
                Error::Config(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn body(&self) -> ErrorResponse {
        let (error, message) = match self {
            ApiError::BadRequest(message) => ("bad_request", message.clone()),
            // Never leak internal details
            ApiError::Core(err @ (Error::Config(_) | Error::Internal(_))) => {
                (err.code(), "Internal server error".to_string())
            }
            ApiError::Core(err) => (err.code(), err.to_string()),
        };

        ErrorResponse {
            success: false,
            error: error.to_string(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Core(err) if status.is_server_error() => {
                tracing::error!(error = %err, code = err.code(), "Request failed");
            }
            ApiError::Core(err) => tracing::warn!(error = %err, code = err.code(), "Request rejected"),
            ApiError::BadRequest(message) => tracing::debug!(message = %message, "Bad request"),
        }

        let mut response = (status, Json(self.body())).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::CameraUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::StreamingError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::AuthExpired, StatusCode::UNAUTHORIZED),
            (Error::invalid_token("x"), StatusCode::UNAUTHORIZED),
            (Error::AuthServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::NotImplemented("x".into()), StatusCode::NOT_IMPLEMENTED),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_details_hidden() {
        let body = ApiError::from(Error::Internal("secret path /etc/x".into())).body();
        assert_eq!(body.message, "Internal server error");
        assert_eq!(body.error, "internal_error");
    }
}
