//! Transcoding errors
//!
//! Every operation returns [`Result`]. Nothing is retried internally; callers
//! decide what to do with [`TranscodeError::is_retryable`] failures.

use crate::types::{SchemaVersion, Subject};
use thiserror::Error;

/// Confluent-compatible registry error codes
pub mod error_codes {
    pub const SUBJECT_NOT_FOUND: u32 = 40401;
    pub const VERSION_NOT_FOUND: u32 = 40402;
    pub const SCHEMA_NOT_FOUND: u32 = 40403;

    pub const INVALID_SCHEMA: u32 = 42201;
    pub const INVALID_VERSION: u32 = 42202;
    pub const INCOMPATIBLE_SCHEMA: u32 = 409;
}

/// Errors produced while framing, resolving or transcoding a message
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// Payload is too short or does not start with the magic byte
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Transport failure, server error or timeout talking to the registry
    #[error("Schema registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// The registry has no schema for the subject/version pair
    #[error("Schema not found: {subject} version {version}")]
    SchemaNotFound {
        subject: Subject,
        version: SchemaVersion,
    },

    /// The document is not a valid Avro schema
    #[error("Schema compile error: {0}")]
    SchemaCompileError(String),

    /// Encode without auto-registration on a document unknown to the registry
    #[error("Schema is not registered for subject {subject}")]
    SchemaNotRegistered { subject: Subject },

    /// The registry refused the request (e.g. an incompatible or invalid schema)
    #[error("Schema registry rejected request ({status}): {message}")]
    RegistryRejected { status: u16, message: String },

    /// The payload body does not match its writer schema
    #[error("Decode error: {0}")]
    Decode(String),

    /// The value cannot be represented with the schema
    #[error("Encode error: {0}")]
    Encode(String),

    /// Invalid settings, such as a registry URL without an http(s) scheme
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TranscodeError {
    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TranscodeError::RegistryUnavailable(_))
    }
}

impl From<reqwest::Error> for TranscodeError {
    fn from(err: reqwest::Error) -> Self {
        TranscodeError::RegistryUnavailable(err.to_string())
    }
}

/// Result type for transcoding operations
pub type Result<T> = std::result::Result<T, TranscodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_registry_unavailable_is_retryable() {
        assert!(TranscodeError::RegistryUnavailable("timeout".into()).is_retryable());
        assert!(!TranscodeError::MalformedFrame("short".into()).is_retryable());
        assert!(!TranscodeError::SchemaNotFound {
            subject: Subject::value("orders"),
            version: SchemaVersion::new(99),
        }
        .is_retryable());
        assert!(!TranscodeError::SchemaCompileError("bad".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_identity() {
        let err = TranscodeError::SchemaNotFound {
            subject: Subject::value("orders"),
            version: SchemaVersion::new(99),
        };
        assert_eq!(err.to_string(), "Schema not found: orders-value version 99");
    }
}
