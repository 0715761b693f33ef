//! Error handling for the story tier service
//!
//! One structured error type covers configuration, artifact loading,
//! encoding, inference, authentication and the audit sink. HTTP handlers
//! convert it into [`crate::api_errors::AppError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum TierError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Authentication error: {message}")]
    Auth { message: String },

    #[error("Encoder artifact error: {artifact} - {message}")]
    Encoder { artifact: String, message: String },

    #[error("Model error: {model} - {message}")]
    Model { model: String, message: String },

    #[error("Audit operation failed: {operation} - {message}")]
    Audit { operation: String, message: String },

    #[error("I/O operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Network operation failed: {operation}")]
    Network {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Shorthand result type used across the crate
pub type TierResult<T> = Result<T, TierError>;

impl TierError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Create an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create an encoder artifact error
    pub fn encoder(artifact: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encoder {
            artifact: artifact.into(),
            message: message.into(),
        }
    }

    /// Create a model load or inference error
    pub fn model(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Model {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create an audit sink error
    pub fn audit(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Audit {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            operation: operation.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TierError::Validation { .. } | TierError::Serialization { .. } => {
                StatusCode::BAD_REQUEST
            }
            TierError::Auth { .. } => StatusCode::UNAUTHORIZED,
            TierError::Audit { .. } | TierError::Network { .. } => StatusCode::BAD_GATEWAY,
            TierError::Config { .. }
            | TierError::Encoder { .. }
            | TierError::Model { .. }
            | TierError::Io { .. }
            | TierError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TierError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Helper trait for mutex access that reports poisoning as an error
/// instead of panicking.
pub trait SafeLock<T: ?Sized> {
    fn safe_lock(&self, resource: &str) -> TierResult<std::sync::MutexGuard<'_, T>>;
}

impl<T: ?Sized> SafeLock<T> for std::sync::Mutex<T> {
    fn safe_lock(&self, resource: &str) -> TierResult<std::sync::MutexGuard<'_, T>> {
        self.lock()
            .map_err(|_| TierError::internal(format!("mutex for {resource} poisoned")))
    }
}

impl From<serde_json::Error> for TierError {
    fn from(err: serde_json::Error) -> Self {
        TierError::serialization("json_operation", err)
    }
}

impl From<std::io::Error> for TierError {
    fn from(err: std::io::Error) -> Self {
        TierError::io("io_operation", err)
    }
}

impl From<reqwest::Error> for TierError {
    fn from(err: reqwest::Error) -> Self {
        TierError::network("http_request", err)
    }
}

impl From<figment::Error> for TierError {
    fn from(err: figment::Error) -> Self {
        TierError::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = TierError::config("Missing configuration file");
        assert!(config_err.to_string().contains("Configuration error"));

        let model_err = TierError::model("model3_fold1_best", "file not found");
        assert!(model_err.to_string().contains("model3_fold1_best"));
        assert_eq!(model_err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_chaining() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let tier_err = TierError::io("reading encoder", io_err);

        assert!(tier_err.source().is_some());
        assert!(tier_err.to_string().contains("I/O operation failed"));
    }

    #[test]
    fn status_codes_follow_failure_class() {
        assert_eq!(
            TierError::validation("genre", "unknown").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TierError::auth("bad password").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            TierError::audit("append_row", "timeout").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
