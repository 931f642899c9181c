//! Error types for queue backend operations.

use thiserror::Error;

/// Error type for every call made against a queue backend
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message not found or receipt expired: {receipt}")]
    MessageNotFound { receipt: String },

    #[error("Operation timed out: {message}")]
    Timeout { message: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Batch size {size} exceeds maximum {max_size}")]
    BatchTooLarge { size: usize, max_size: usize },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

/// Errors while converting message bodies and backend responses
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,

    #[error("Malformed backend response: {message}")]
    MalformedResponse { message: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
