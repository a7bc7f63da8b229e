//! Error handling for dispatch operations.
//!
//! Two layers of errors live here. [`FetchError`] describes why a single
//! resource could not be retrieved; it never escapes a worker and always ends
//! up as an [`Outcome::Failure`](crate::Outcome) at that item's index.
//! [`DispatchError`] is returned for the whole call: invalid arguments,
//! configuration and input problems, and internal invariant breaches.

use std::time::Duration;
use thiserror::Error;

/// Call-level error type.
///
/// Only these errors propagate out of [`Dispatcher::dispatch`](crate::Dispatcher);
/// per-item failures are recorded in the result sequence instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    /// Concurrency must be at least one
    #[error("Invalid concurrency {concurrency}: at least one worker is required")]
    InvalidConcurrency { concurrency: usize },

    /// A slot was written twice. Indicates a bug in the worker pool.
    #[error("Internal error: outcome slot {index} was written more than once")]
    SlotAlreadySet { index: usize },

    /// A slot was still empty after every worker finished.
    #[error("Internal error: outcome slot {index} was never written")]
    SlotUnset { index: usize },

    /// Invalid user input (templates, id lists, resource lists)
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// Configuration errors (invalid settings, unparseable files)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// File I/O errors when reading resource lists or config files
    #[error("File error at '{path}': {message}")]
    File { path: String, message: String },

    /// Errors raised while setting up a fetcher (e.g. building the HTTP client)
    #[error("Fetcher setup failed: {message}")]
    FetcherSetup { message: String },

    /// Generic internal errors that don't fit other categories
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// Create a new invalid input error.
    pub fn invalid_input<I: Into<String>, R: Into<String>>(input: I, reason: R) -> Self {
        Self::InvalidInput {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::File {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for the defensive invariant checks of the slot array.
    ///
    /// These never occur in correct operation; tests assert their absence.
    pub fn is_invariant_breach(&self) -> bool {
        matches!(
            self,
            Self::SlotAlreadySet { .. } | Self::SlotUnset { .. }
        )
    }
}

/// Why a single resource could not be retrieved.
///
/// A closed set of failure kinds, decoded once at the fetcher boundary.
/// The `Display` form becomes the `reason` of the item's failed outcome.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// The request completed with a non-success status
    #[error("HTTP error! status: {code}")]
    Status { code: u16 },

    /// Connection, DNS or protocol failure
    #[error("Network error: {message}")]
    Network { message: String },

    /// The request did not finish in time
    #[error("Request timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The payload could not be decoded
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    /// The dispatch was cancelled before this item was claimed
    #[error("Cancelled before the request was issued")]
    Cancelled,

    /// The retrieval panicked; the panic was contained to this item
    #[error("Fetch panicked: {message}")]
    Panicked { message: String },
}

impl FetchError {
    /// Create a new network error.
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new decode error.
    pub fn decode<M: Into<String>>(message: M) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::Status {
                code: status.as_u16(),
            }
        } else if err.is_decode() {
            Self::decode(err.to_string())
        } else if err.is_connect() {
            Self::network(format!("Connection failed: {}", err))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(format!("JSON parsing failed: {}", err))
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

impl From<toml::de::Error> for DispatchError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("Failed to parse TOML configuration: {}", err))
    }
}
