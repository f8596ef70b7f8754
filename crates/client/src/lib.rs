//! Latch HTTP Client
//!
//! A native Rust client for the Latch lock and presence registry.
//!
//! # Quick Start
//!
//! ```no_run
//! use latch_client::LatchClient;
//! use latch_core::{Resource, TypeCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), latch_client::Error> {
//!     let client = LatchClient::new("http://localhost:8891");
//!
//!     // Claim leadership over a named resource for 15 seconds.
//!     let resource = Resource::new("leader/scheduler", "node-1", "", TypeCode::Lock);
//!     client.lock(&resource, 15).await?;
//!
//!     // Renew the claim before the TTL elapses...
//!     client.lock(&resource, 15).await?;
//!
//!     // ...and release it when done.
//!     client.release(&resource).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! Use the builder pattern for custom configuration:
//!
//! ```no_run
//! use latch_client::LatchClientBuilder;
//! use std::time::Duration;
//!
//! let client = LatchClientBuilder::new("http://localhost:8891")
//!     .timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//! ```

mod error;

pub use error::Error;

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use latch_core::{
    FetchAllRequest, FetchAllResponse, FetchRequest, FetchResponse, LockRequest, ReleaseRequest,
    Resource, TypeCode,
};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the Latch registry.
#[derive(Debug, Clone)]
pub struct LatchClient {
    client: Client,
    base_url: String,
}

/// Builder for configuring a [`LatchClient`].
#[derive(Debug)]
pub struct LatchClientBuilder {
    base_url: String,
    timeout: Duration,
    client: Option<Client>,
}

impl LatchClientBuilder {
    /// Create a new builder with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            client: None,
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a custom reqwest Client.
    ///
    /// Useful for configuring TLS (e.g. a client certificate for a
    /// mutually-authenticated server), proxies, or other advanced
    /// settings.
    #[must_use]
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn build(self) -> Result<LatchClient, Error> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| Error::Configuration(e.to_string()))?,
        };

        Ok(LatchClient {
            client,
            base_url: self.base_url,
        })
    }
}

/// Error body returned by the server: `{"error": ..., "code": ...}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: Option<String>,
}

impl LatchClient {
    /// Create a new client with default configuration.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use latch_client::LatchClient;
    ///
    /// let client = LatchClient::new("http://localhost:8891");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        LatchClientBuilder::new(base_url)
            .build()
            .expect("default client configuration should not fail")
    }

    /// Create a builder for advanced configuration.
    pub fn builder(base_url: impl Into<String>) -> LatchClientBuilder {
        LatchClientBuilder::new(base_url)
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Acquire or renew a lease on `resource.key` for `ttl_in_seconds`.
    ///
    /// # Errors
    ///
    /// [`Error::Collision`] when the key is held by another owner;
    /// [`Error::InvalidRequest`] for rejected inputs; transport and
    /// server errors otherwise.
    pub async fn lock(&self, resource: &Resource, ttl_in_seconds: i64) -> Result<(), Error> {
        let request = LockRequest {
            resource: resource.clone(),
            ttl_in_seconds,
        };
        self.post::<_, serde_json::Value>("/v1/lock", &request)
            .await?;
        Ok(())
    }

    /// Release the lease held by `resource.owner` on `resource.key`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no lease is held; [`Error::Collision`]
    /// when another owner holds it.
    pub async fn release(&self, resource: &Resource) -> Result<(), Error> {
        let request = ReleaseRequest {
            resource: resource.clone(),
        };
        self.post::<_, serde_json::Value>("/v1/release", &request)
            .await?;
        Ok(())
    }

    /// Read the currently held lease for `key`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the key is unheld.
    pub async fn fetch(&self, key: &str) -> Result<Resource, Error> {
        let request = FetchRequest {
            key: key.to_owned(),
        };
        let response: FetchResponse = self.post("/v1/fetch", &request).await?;
        Ok(response.resource)
    }

    /// List currently held leases, optionally restricted to one type.
    ///
    /// Passing `None` returns every held lease.
    pub async fn fetch_all(&self, type_code: Option<TypeCode>) -> Result<Vec<Resource>, Error> {
        let request = FetchAllRequest {
            type_name: String::new(),
            type_code,
        };
        let response: FetchAllResponse = self.post("/v1/fetch_all", &request).await?;
        Ok(response.resources)
    }

    /// Check if the server is healthy.
    pub async fn health(&self) -> Result<bool, Error> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(response.status().is_success())
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: serde::Serialize,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| Error::Deserialization(e.to_string()));
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => {
                return Err(Error::from_response_parts(
                    status.as_u16(),
                    body.code.as_deref(),
                    body.error,
                ));
            }
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_owned(),
        };
        Err(Error::Server {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_strips_trailing_slash() {
        let client = LatchClient::new("http://localhost:8891/");
        assert_eq!(client.base_url(), "http://localhost:8891");
    }

    #[test]
    fn builder_accepts_custom_timeout() {
        let client = LatchClientBuilder::new("http://localhost:8891")
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8891");
    }

    #[test]
    fn error_body_parses_with_missing_fields() {
        let body: ErrorBody = serde_json::from_str("{}").unwrap();
        assert_eq!(body.error, "");
        assert!(body.code.is_none());
    }
}
