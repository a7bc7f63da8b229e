//! Core data types for dispatching.
//!
//! This module defines the work items handed to workers, the per-item
//! outcome recorded for every input, dispatcher configuration, and the
//! caller-side statistics derived from a finished run.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound accepted by configuration layers for the worker count.
pub const MAX_CONCURRENCY: usize = 1000;

/// One unit of pending work: a resource and its position in the input.
///
/// Immutable once enqueued. Identity is the index; two items may carry the
/// same resource and are still fetched independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Position of this resource in the caller's input
    pub index: usize,
    /// Opaque resource identifier (usually a URL)
    pub resource: String,
}

/// Result of retrieving a single resource.
///
/// Serializes to the settled-promise shape consumers expect:
/// `{"status": "fulfilled", "value": ...}` or
/// `{"status": "rejected", "reason": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Outcome<T> {
    /// The resource was retrieved and decoded
    #[serde(rename = "fulfilled")]
    Success { value: T },

    /// The retrieval failed; `reason` is a human-readable description
    #[serde(rename = "rejected")]
    Failure { reason: String },
}

impl<T> Outcome<T> {
    /// Classify the result of one retrieval.
    pub fn from_result(result: Result<T, FetchError>) -> Self {
        match result {
            Ok(value) => Self::Success { value },
            Err(err) => Self::Failure {
                reason: err.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// The decoded payload, if this outcome is a success.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success { value } => Some(value),
            Self::Failure { .. } => None,
        }
    }

    /// The failure reason, if this outcome is a failure.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { reason } => Some(reason),
        }
    }
}

/// Configuration for a [`Dispatcher`](crate::Dispatcher) and its default fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of in-flight retrievals
    /// Default: 5, Range: 1-1000
    pub concurrency: usize,

    /// Timeout for each individual request
    /// Default: 10 seconds
    #[serde(skip)]
    pub request_timeout: Duration,

    /// Optional overall deadline. When it passes, no new items are claimed and
    /// unclaimed items are recorded as cancelled.
    #[serde(skip)]
    pub deadline: Option<Duration>,

    /// User-Agent header sent by the HTTP fetcher
    pub user_agent: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            request_timeout: Duration::from_secs(10),
            deadline: None,
            user_agent: format!("fetch-dispatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl DispatchConfig {
    /// Set the worker count used by [`Dispatcher::dispatch_configured`].
    ///
    /// The value is stored as given; zero is rejected when dispatching.
    ///
    /// [`Dispatcher::dispatch_configured`]: crate::Dispatcher::dispatch_configured
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set an overall deadline for the dispatch.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the User-Agent header.
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Aggregate statistics for a finished dispatch.
///
/// Derived by the caller from the outcome sequence and a wall-clock
/// measurement taken around the call; the dispatcher itself never counts or
/// times anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub successful: usize,
    pub failed: usize,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl DispatchStats {
    pub fn from_outcomes<T>(outcomes: &[Outcome<T>], duration: Duration) -> Self {
        let successful = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            successful,
            failed: outcomes.len() - successful,
            duration,
        }
    }

    pub fn total(&self) -> usize {
        self.successful + self.failed
    }
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
