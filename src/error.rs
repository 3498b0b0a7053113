//! Error types for the tangent engine
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling. Callers are expected
//! to match on variants rather than inspect message strings.

use thiserror::Error;

/// Classification of a model-service failure.
///
/// The orchestrator and callers use this to decide whether repeating the
/// same request is worthwhile without changing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFailure {
    /// The request exceeded its deadline.
    Timeout,
    /// The transport failed (connect, TLS, DNS, mid-stream disconnect).
    Transport,
    /// The service answered with no usable text.
    EmptyResponse,
    /// The service answered with a payload that could not be interpreted.
    MalformedResponse,
    /// The caller abandoned the request before it completed.
    Cancelled,
}

impl ModelFailure {
    /// Whether retrying the identical request may succeed.
    ///
    /// Timeouts, transport drops, empty replies, and cancellations are
    /// transient; a malformed payload stays malformed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ModelFailure::MalformedResponse)
    }
}

impl std::fmt::Display for ModelFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModelFailure::Timeout => "timeout",
            ModelFailure::Transport => "transport",
            ModelFailure::EmptyResponse => "empty response",
            ModelFailure::MalformedResponse => "malformed response",
            ModelFailure::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Main error type for tangent operations
///
/// This enum encompasses all possible errors that can occur while
/// manipulating conversation trees, driving sessions, caching message
/// payloads, and talking to storage and model services.
#[derive(Error, Debug)]
pub enum TangentError {
    /// Caller-supplied input was rejected before any side effect ran
    #[error("Validation error: {0}")]
    Validation(String),

    /// A node id was not found in the active conversation tree
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A conversation id was not found in storage
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// A structural invariant was violated (duplicate node ids, ...)
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Serialized tree data could not be reconstructed
    #[error("Malformed tree data: {0}")]
    MalformedTree(String),

    /// Pre-JSON binary snapshots are refused, never interpreted
    #[error("Legacy binary conversation data is no longer supported; re-export it as JSON")]
    UnsupportedLegacyFormat,

    /// Model service failure, classified by [`ModelFailure`]
    #[error("Model service error ({kind}): {message}")]
    ModelService {
        /// What went wrong, coarsely
        kind: ModelFailure,
        /// Additional context about the failure
        message: String,
    },

    /// An operation was invoked in a state that does not permit it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Storage backend errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cache errors; callers treat these as non-fatal
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TangentError {
    /// Builds a [`TangentError::ModelService`] with the given kind.
    pub fn model(kind: ModelFailure, message: impl Into<String>) -> Self {
        TangentError::ModelService {
            kind,
            message: message.into(),
        }
    }

    /// Whether this error is worth retrying at the call site.
    ///
    /// Only model-service failures are ever retryable; everything else
    /// reports a condition that a repeat call cannot change.
    pub fn is_retryable(&self) -> bool {
        match self {
            TangentError::ModelService { kind, .. } => kind.is_retryable(),
            _ => false,
        }
    }
}

/// Result type alias for tangent operations
pub type Result<T> = std::result::Result<T, TangentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let error = TangentError::Validation("message text must not be empty".to_string());
        assert_eq!(
            error.to_string(),
            "Validation error: message text must not be empty"
        );
    }

    #[test]
    fn test_node_not_found_display() {
        let error = TangentError::NodeNotFound("abc-123".to_string());
        assert_eq!(error.to_string(), "Node not found: abc-123");
    }

    #[test]
    fn test_conversation_not_found_display() {
        let error = TangentError::ConversationNotFound("conv-9".to_string());
        assert_eq!(error.to_string(), "Conversation not found: conv-9");
    }

    #[test]
    fn test_model_service_error_display() {
        let error = TangentError::model(ModelFailure::Timeout, "deadline of 60s exceeded");
        let s = error.to_string();
        assert!(s.contains("timeout"));
        assert!(s.contains("deadline of 60s exceeded"));
    }

    #[test]
    fn test_legacy_format_display() {
        let error = TangentError::UnsupportedLegacyFormat;
        assert!(error.to_string().contains("no longer supported"));
    }

    #[test]
    fn test_timeout_is_retryable() {
        assert!(TangentError::model(ModelFailure::Timeout, "slow").is_retryable());
        assert!(TangentError::model(ModelFailure::Transport, "reset").is_retryable());
        assert!(TangentError::model(ModelFailure::EmptyResponse, "blank").is_retryable());
        assert!(TangentError::model(ModelFailure::Cancelled, "gone").is_retryable());
    }

    #[test]
    fn test_malformed_response_is_not_retryable() {
        assert!(!TangentError::model(ModelFailure::MalformedResponse, "no choices").is_retryable());
    }

    #[test]
    fn test_non_model_errors_are_not_retryable() {
        assert!(!TangentError::Validation("bad".to_string()).is_retryable());
        assert!(!TangentError::Storage("down".to_string()).is_retryable());
    }

    #[test]
    fn test_timeout_distinct_from_malformed() {
        let timeout = TangentError::model(ModelFailure::Timeout, "t");
        let malformed = TangentError::model(ModelFailure::MalformedResponse, "m");
        let kind_of = |e: &TangentError| match e {
            TangentError::ModelService { kind, .. } => *kind,
            _ => panic!("expected model service error"),
        };
        assert_ne!(kind_of(&timeout), kind_of(&malformed));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: TangentError = io_error.into();
        assert!(matches!(error, TangentError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_str = "{invalid json}";
        let json_error = serde_json::from_str::<serde_json::Value>(json_str).unwrap_err();
        let error: TangentError = json_error.into();
        assert!(matches!(error, TangentError::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TangentError>();
    }

    #[test]
    fn test_invalid_state_display() {
        let error = TangentError::InvalidState("cursor is not positioned".to_string());
        assert_eq!(error.to_string(), "Invalid state: cursor is not positioned");
    }
}
