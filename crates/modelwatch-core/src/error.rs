//! Error types for the model watcher
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for watcher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the model watcher
#[derive(Error, Debug)]
pub enum Error {
    /// A source adapter could not reach or parse its upstream.
    /// Aborts the cycle without mutating state.
    #[error("fetch error ({source_name}): {message}")]
    Fetch {
        /// Source name
        source_name: String,
        /// Error message
        message: String,
    },

    /// State store-related errors
    #[error("state store error: {0}")]
    StateStore(String),

    /// Notification delivery errors (per subscriber, never fatal to a cycle)
    #[error("notify error: {0}")]
    Notify(String),

    /// The sink reports this subscriber as permanently unreachable
    /// (e.g. the bot was removed from the chat)
    #[error("subscriber {subscriber} unreachable: {message}")]
    SubscriberGone {
        /// The unreachable subscriber
        subscriber: i64,
        /// Sink-specific detail
        message: String,
    },

    /// Administrative lookup matched nothing
    #[error("no tracked model matches {0:?}")]
    NotFound(String),

    /// Administrative lookup matched more than one record
    #[error("lookup {query:?} is ambiguous: {}", matches.join(", "))]
    Ambiguous {
        /// The lookup key as given by the caller
        query: String,
        /// Human-readable candidates, as "source/identifier"
        matches: Vec<String>,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network-related errors
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP errors from source or sink APIs
    #[error("HTTP error: {0}")]
    Http(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a fetch error for a named source
    pub fn fetch(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a notification delivery error
    pub fn notify(msg: impl Into<String>) -> Self {
        Self::Notify(msg.into())
    }

    /// Create a "not found" resolution error
    pub fn not_found(query: impl Into<String>) -> Self {
        Self::NotFound(query.into())
    }

    /// Create an ambiguous-match resolution error
    pub fn ambiguous(query: impl Into<String>, matches: Vec<String>) -> Self {
        Self::Ambiguous {
            query: query.into(),
            matches,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// True for resolution outcomes the administrative caller must handle
    /// itself (not system faults worth logging as errors).
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Ambiguous { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
