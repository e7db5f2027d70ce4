//! Error types for HomeCam core

use thiserror::Error;

/// Result type alias for HomeCam core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the capture engine and token pipeline
#[derive(Debug, Error)]
pub enum Error {
    // =========================================================================
    // Capture errors
    // =========================================================================
    /// Device absent, unopenable, or released mid-operation
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    /// Codec rejected the frame
    #[error("Encoding failed: {0}")]
    EncodingFailure(String),

    /// Generic capture-path failure (read failed, streaming not active, ...)
    #[error("Streaming error: {0}")]
    StreamingError(String),

    // =========================================================================
    // Authentication errors
    // =========================================================================
    /// Token expiry has passed
    #[error("Token has expired")]
    AuthExpired,

    /// Signature did not verify, or no key matches the token key id
    #[error("Invalid token signature: {0}")]
    AuthInvalidSignature(String),

    /// Malformed or unrecognized token
    #[error("Invalid token: {reason}")]
    AuthInvalidToken {
        /// Human-readable reason
        reason: String,
        /// More specific underlying failure, when one is known
        #[source]
        cause: Option<Box<Error>>,
    },

    /// Key-set fetch failed and nothing is cached
    #[error("Authentication service unavailable: {0}")]
    AuthServiceUnavailable(String),

    /// Login credentials were rejected
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Operation intentionally not provided
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    // =========================================================================
    // Everything else
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unclassified failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an `AuthInvalidToken` without an underlying cause
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Error::AuthInvalidToken {
            reason: reason.into(),
            cause: None,
        }
    }

    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::CameraUnavailable(_) => "camera_unavailable",
            Error::EncodingFailure(_) => "encoding_failure",
            Error::StreamingError(_) => "streaming_error",
            Error::AuthExpired => "auth_expired",
            Error::AuthInvalidSignature(_) => "auth_invalid_signature",
            Error::AuthInvalidToken { .. } => "auth_invalid_token",
            Error::AuthServiceUnavailable(_) => "auth_service_unavailable",
            Error::InvalidCredentials => "invalid_credentials",
            Error::NotImplemented(_) => "not_implemented",
            Error::Config(_) => "config_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// True for any of the token/credential failures
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Error::AuthExpired
                | Error::AuthInvalidSignature(_)
                | Error::AuthInvalidToken { .. }
                | Error::AuthServiceUnavailable(_)
                | Error::InvalidCredentials
        )
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Error::AuthExpired,
            ErrorKind::InvalidSignature => Error::AuthInvalidSignature(err.to_string()),
            _ => Error::invalid_token(err.to_string()),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::EncodingFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_error_mapping() {
        let expired: Error =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::ExpiredSignature)
                .into();
        assert!(matches!(expired, Error::AuthExpired));

        let bad_sig: Error =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidSignature)
                .into();
        assert!(matches!(bad_sig, Error::AuthInvalidSignature(_)));

        let malformed: Error =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidToken).into();
        assert_eq!(malformed.code(), "auth_invalid_token");
    }

    #[test]
    fn test_invalid_token_keeps_cause() {
        let err = Error::AuthInvalidToken {
            reason: "streaming token rejected".to_string(),
            cause: Some(Box::new(Error::AuthExpired)),
        };

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Token has expired");
        assert!(err.is_auth());
    }
}
