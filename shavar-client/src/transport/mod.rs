//! Transport abstraction for shavar sync.
//!
//! This module provides a pluggable transport layer that abstracts the
//! underlying HTTP client (reqwest, mock for testing).
//!
//! # Design
//!
//! The transport is request/response only:
//! - `post()` sends a body to the downloads or gethash endpoint
//! - `fetch()` downloads redirect data
//!
//! Status codes are returned, not interpreted; mapping them to errors is
//! the engine's job.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.queue_post(HttpResponse::ok(b"n:1200\n".to_vec()));
//! let response = transport.post(&url, b"goog-malware-shavar;\n").await?;
//! ```

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::MockTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the server.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The request failed after the connection was made.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The request did not finish within the configured timeout.
    #[error("request timeout")]
    Timeout,
}

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// A 200 response with the given body.
    pub fn ok(body: Vec<u8>) -> Self {
        Self::new(200, body)
    }
}

/// Transport trait for talking to the list server.
///
/// Implementations handle the underlying HTTP mechanism.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `url`.
    async fn post(&self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError>;

    /// GET `url`.
    async fn fetch(&self, url: &str) -> Result<HttpResponse, TransportError>;
}
