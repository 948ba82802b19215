use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for vendsync.
#[derive(Error, Debug)]
pub enum AppError {
    /// Vendor credentials were rejected or the login flow did not complete.
    #[error("Authentication failed for source '{source_name}': {message}")]
    AuthenticationFailure {
        source_name: String,
        message: String,
    },

    /// A requested scrape target, category path or source does not exist.
    #[error("Not found: {0}")]
    TargetNotFound(String),

    /// A staging or hub write violated a uniqueness constraint.
    #[error("Integrity conflict: {0}")]
    IntegrityConflict(String),

    /// Navigation or page request failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The browser automation layer failed (launch, CDP, element lookup).
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Request or run timed out.
    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The run was cancelled before it finished.
    #[error("Run cancelled")]
    Cancelled,

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The durable store is unreachable or a query failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    pub fn auth(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::AuthenticationFailure {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error is transient and the whole operation may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::DatabaseError(_) => true,
            AppError::HttpError(msg) | AppError::BrowserError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true if the caller sent something the core cannot act on.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::TargetNotFound(_)
                | AppError::IntegrityConflict(_)
                | AppError::SerializationError(_)
        )
    }
}
