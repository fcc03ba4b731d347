//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur talking to the remote data platform.
///
/// Errors are `Clone` because the last one seen by a live watcher is
/// published inside its state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The platform rejected a query or write.
    #[error("query failed ({code}): {message}")]
    Query { code: String, message: String },

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Protocol error (unexpected response or frame).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The platform refused to open a change subscription.
    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),

    /// A point query matched no row where one was required.
    #[error("not found: {0}")]
    NotFound(String),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

/// Coarse classification used to decide how an error is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Query or write failure: transient notification, state unchanged.
    Data,
    /// Authentication failure: blocking prompt to retry.
    Auth,
    /// Connection-level failure of the client itself.
    Transport,
}

impl SyncError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Query { .. } | Self::NotFound(_) | Self::Serialization(_) => ErrorKind::Data,
            Self::Network(_)
            | Self::Protocol(_)
            | Self::SubscriptionFailed(_)
            | Self::Timeout
            | Self::ChannelClosed => ErrorKind::Transport,
        }
    }

    /// Shorthand for a query error.
    pub fn query(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}
