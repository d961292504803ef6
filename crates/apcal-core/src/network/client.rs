//! Blocking HTTP client wrapper.
//!
//! Wraps `reqwest::blocking::Client` with the library's user agent and
//! timeouts, and classifies HTTP status codes for the retry policy.

use crate::config::NetworkConfig;
use crate::error::{ApcalError, Result};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Blocking HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client with the default timeouts.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a client with a custom whole-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(NetworkConfig::USER_AGENT)
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| ApcalError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url`, failing on any non-success status.
    pub fn get(&self, url: &str) -> Result<Response> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                ApcalError::Timeout {
                    message: format!("GET {} timed out after {:?}", url, self.timeout),
                }
            } else {
                ApcalError::Network {
                    message: format!("GET {} failed: {}", url, e),
                    source: Some(e),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApcalError::DownloadFailed {
                url: url.to_string(),
                message: format!("HTTP {}", status),
                retryable: Self::is_retryable_status(status),
            });
        }
        Ok(response)
    }

    /// Check if an HTTP status code indicates a retryable error.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
    }
}
