//! HTTP transport over reqwest.

use super::{HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use std::time::Duration;

/// Transport that talks to the list server with reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(Self { http })
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<HttpResponse, TransportError> {
        let response = req.send().await.map_err(map_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_error)?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
        tracing::debug!("POST {} ({} bytes)", url, body.len());
        self.send(self.http.post(url).body(body.to_vec())).await
    }

    async fn fetch(&self, url: &str) -> Result<HttpResponse, TransportError> {
        tracing::debug!("GET {}", url);
        self.send(self.http.get(url)).await
    }
}

fn map_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::ConnectionFailed(e.to_string())
    } else {
        TransportError::RequestFailed(e.to_string())
    }
}
