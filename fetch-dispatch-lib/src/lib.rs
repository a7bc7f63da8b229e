//! # Fetch Dispatch Library
//!
//! Retrieve an ordered list of resources with a bounded number of requests in
//! flight, keeping results in input order and recording every item's success
//! or failure independently.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fetch_dispatch_lib::{DispatchStats, Dispatcher};
//! use std::time::Instant;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = Dispatcher::new()?;
//!     let urls: Vec<String> = (1..=20)
//!         .map(|id| format!("https://api.example.org/movie/{}", id))
//!         .collect();
//!
//!     let started = Instant::now();
//!     let outcomes = dispatcher.dispatch(&urls, 5).await?;
//!     let stats = DispatchStats::from_outcomes(&outcomes, started.elapsed());
//!
//!     println!("{} ok, {} failed", stats.successful, stats.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - `outcomes[i]` always belongs to `resources[i]`
//! - at most `concurrency` retrievals run at the same time
//! - a failing (or panicking) retrieval only affects its own outcome
//! - only call-level problems, like a zero concurrency, are returned as errors
//!
//! Custom transports implement [`Fetch`] and are plugged in with
//! [`Dispatcher::with_fetcher`].

pub use config::{
    load_env_config, load_env_config_from, parse_duration_string, validate_concurrency,
    ConfigManager, DefaultsConfig, EnvConfig, FileConfig, OutputConfig, SourceConfig,
};
pub use dispatcher::{dispatch, Dispatcher};
pub use error::{DispatchError, FetchError};
pub use fetcher::Fetch;
#[cfg(feature = "http")]
pub use fetcher::HttpFetcher;
pub use queue::WorkQueue;
pub use slots::OutcomeSlots;
pub use types::{DispatchConfig, DispatchStats, Outcome, WorkItem, MAX_CONCURRENCY};

// Re-exported so callers can cancel without depending on tokio-util directly
pub use tokio_util::sync::CancellationToken;

// Public modules
pub mod generate;

// Internal modules - these are not part of the public API
mod config;
mod dispatcher;
mod error;
mod fetcher;
mod queue;
mod slots;
mod types;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, DispatchError>;

// Library version and metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

/// Get library information for debugging or display purposes.
pub fn info() -> LibraryInfo {
    LibraryInfo {
        version: VERSION,
        author: AUTHOR,
        features: get_enabled_features(),
    }
}

/// Information about the library build and features
#[derive(Debug, Clone)]
pub struct LibraryInfo {
    pub version: &'static str,
    pub author: &'static str,
    pub features: Vec<&'static str>,
}

/// Get list of enabled features at compile time
#[allow(clippy::vec_init_then_push)]
fn get_enabled_features() -> Vec<&'static str> {
    let mut features = Vec::new();

    #[cfg(feature = "http")]
    features.push("http");

    features
}
