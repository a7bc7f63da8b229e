//! Retrieval collaborators.
//!
//! The dispatcher only knows the [`Fetch`] trait: given a resource
//! identifier, produce a payload or a [`FetchError`]. [`HttpFetcher`] is the
//! default implementation, issuing a GET and decoding the body as JSON.

use crate::error::FetchError;
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(feature = "http")]
pub use http::HttpFetcher;

/// Retrieves one resource.
///
/// Implementations must report failures through the returned `Result`.
/// A panic inside `fetch` is still contained to the item being fetched, but
/// it is logged as a defect.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Decoded payload produced on success
    type Payload: Send + Sync + 'static;

    async fn fetch(&self, resource: &str) -> Result<Self::Payload, FetchError>;
}

#[async_trait]
impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    type Payload = F::Payload;

    async fn fetch(&self, resource: &str) -> Result<Self::Payload, FetchError> {
        (**self).fetch(resource).await
    }
}

#[cfg(feature = "http")]
mod http {
    use super::Fetch;
    use crate::error::{DispatchError, FetchError};
    use crate::types::DispatchConfig;
    use async_trait::async_trait;
    use std::time::Duration;

    /// HTTP GET fetcher decoding JSON bodies.
    ///
    /// A 2xx response with a JSON body is a success. Any other status, a body
    /// that is not JSON, a transport error or a timeout is a failure.
    #[derive(Clone, Debug)]
    pub struct HttpFetcher {
        /// Shared connection pool for all requests of this fetcher
        http_client: reqwest::Client,
        /// Timeout for a single request, including reading the body
        timeout: Duration,
    }

    impl HttpFetcher {
        /// Create a fetcher with default settings.
        pub fn new() -> Result<Self, DispatchError> {
            Self::with_config(&DispatchConfig::default())
        }

        /// Create a fetcher using the timeout and User-Agent from `config`.
        pub fn with_config(config: &DispatchConfig) -> Result<Self, DispatchError> {
            let http_client = reqwest::Client::builder()
                .timeout(config.request_timeout + Duration::from_secs(2)) // Add buffer for HTTP timeout
                .user_agent(config.user_agent.clone())
                .build()
                .map_err(|e| DispatchError::FetcherSetup {
                    message: format!("Failed to create HTTP client: {}", e),
                })?;

            Ok(Self {
                http_client,
                timeout: config.request_timeout,
            })
        }

        pub fn timeout(&self) -> Duration {
            self.timeout
        }

        async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
            let response = self.http_client.get(url).send().await?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    code: status.as_u16(),
                });
            }

            let body = response.bytes().await?;
            Ok(serde_json::from_slice(&body)?)
        }
    }

    #[async_trait]
    impl Fetch for HttpFetcher {
        type Payload = serde_json::Value;

        async fn fetch(&self, url: &str) -> Result<serde_json::Value, FetchError> {
            match tokio::time::timeout(self.timeout, self.get_json(url)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::timeout(self.timeout)),
            }
        }
    }

}
