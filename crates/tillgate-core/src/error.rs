//! Error types for transaction forwarding operations.
//!
//! Defines the failure taxonomy used across the resilience layer. Errors
//! carry context for debugging and map onto [`RetryReason`] classifications
//! for retry scheduling. Checksum rejections and configuration problems are
//! never retried.

use thiserror::Error;

use crate::models::RetryReason;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Failure taxonomy for outbound forwarding calls.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Network-level connectivity failure.
    #[error("network error: {message}")]
    Network {
        /// Description of the connectivity failure
        message: String,
    },

    /// Downstream rejected the payload as invalid.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure
        message: String,
    },

    /// Downstream responded with a server-side failure.
    #[error("server error: HTTP {status_code}: {message}")]
    Server {
        /// Status code reported by the downstream service
        status_code: u16,
        /// Response detail
        message: String,
    },

    /// Unclassified delivery failure.
    #[error("delivery failed: {message}")]
    General {
        /// Description of the failure
        message: String,
    },

    /// Payload integrity verification failed.
    #[error("checksum invalid: {detail}")]
    ChecksumRejected {
        /// Which checksum comparison failed
        detail: String,
    },

    /// Referenced entity does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing entity
        what: String,
    },

    /// Invalid resilience configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem
        message: String,
    },
}

impl CoreError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Creates a server error with the downstream status code.
    pub fn server(status_code: u16, message: impl Into<String>) -> Self {
        Self::Server { status_code, message: message.into() }
    }

    /// Creates an unclassified delivery error.
    pub fn general(message: impl Into<String>) -> Self {
        Self::General { message: message.into() }
    }

    /// Creates a checksum rejection.
    pub fn checksum_rejected(detail: impl Into<String>) -> Self {
        Self::ChecksumRejected { detail: detail.into() }
    }

    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether the failure should be handed to the retry scheduler.
    ///
    /// Validation failures are retryable, just on a long delay; checksum
    /// rejections are terminal because tampering or corruption will not
    /// self-correct.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::Validation { .. }
            | Self::Server { .. }
            | Self::General { .. } => true,
            Self::ChecksumRejected { .. }
            | Self::NotFound { .. }
            | Self::Configuration { .. } => false,
        }
    }

    /// Maps the failure onto a retry reason, if it is retryable at all.
    pub fn retry_reason(&self) -> Option<RetryReason> {
        match self {
            Self::Network { .. } => Some(RetryReason::NetworkError),
            Self::Validation { .. } => Some(RetryReason::ValidationError),
            Self::Server { .. } => Some(RetryReason::ServerError),
            Self::General { .. } => Some(RetryReason::GeneralError),
            Self::ChecksumRejected { .. }
            | Self::NotFound { .. }
            | Self::Configuration { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors_identified_correctly() {
        assert!(CoreError::network("connection refused").is_retryable());
        assert!(CoreError::validation("bad amount").is_retryable());
        assert!(CoreError::server(502, "bad gateway").is_retryable());
        assert!(CoreError::general("unexpected").is_retryable());

        assert!(!CoreError::checksum_rejected("transaction checksum mismatch").is_retryable());
        assert!(!CoreError::not_found("terminal config").is_retryable());
        assert!(!CoreError::configuration("threshold must be positive").is_retryable());
    }

    #[test]
    fn retry_reasons_mapped_correctly() {
        assert_eq!(CoreError::network("x").retry_reason(), Some(RetryReason::NetworkError));
        assert_eq!(CoreError::validation("x").retry_reason(), Some(RetryReason::ValidationError));
        assert_eq!(CoreError::server(500, "x").retry_reason(), Some(RetryReason::ServerError));
        assert_eq!(CoreError::general("x").retry_reason(), Some(RetryReason::GeneralError));
        assert_eq!(CoreError::checksum_rejected("x").retry_reason(), None);
    }

    #[test]
    fn error_display_format() {
        let error = CoreError::server(503, "service unavailable");
        assert_eq!(error.to_string(), "server error: HTTP 503: service unavailable");

        let checksum = CoreError::checksum_rejected("submission checksum mismatch");
        assert_eq!(checksum.to_string(), "checksum invalid: submission checksum mismatch");
    }
}
