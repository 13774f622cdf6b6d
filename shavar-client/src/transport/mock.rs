//! Mock transport for testing.
//!
//! Allows queueing responses and capturing sent requests for verification.

use super::{HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock transport for testing.
///
/// POST responses are served in queue order. Fetch responses are keyed by
/// URL, since redirects are fetched concurrently.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    post_queue: VecDeque<HttpResponse>,
    fetch_responses: HashMap<String, VecDeque<HttpResponse>>,
    posts: Vec<(String, Vec<u8>)>,
    fetches: Vec<String>,
    fail_next_post: Option<String>,
    fail_next_fetch: Option<String>,
    stall_posts: bool,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a response for the next `post()` call.
    pub fn queue_post(&self, response: HttpResponse) {
        self.inner().post_queue.push_back(response);
    }

    /// Queue a response for the next `fetch()` of `url`.
    pub fn queue_fetch(&self, url: &str, response: HttpResponse) {
        self.inner()
            .fetch_responses
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Get all `(url, body)` pairs that were posted.
    pub fn posts(&self) -> Vec<(String, Vec<u8>)> {
        self.inner().posts.clone()
    }

    /// Get the last posted `(url, body)`.
    pub fn last_post(&self) -> Option<(String, Vec<u8>)> {
        self.inner().posts.last().cloned()
    }

    /// Get all URLs that were fetched.
    pub fn fetches(&self) -> Vec<String> {
        self.inner().fetches.clone()
    }

    /// Cause the next post() to fail with the given error.
    pub fn fail_next_post(&self, error: &str) {
        self.inner().fail_next_post = Some(error.to_string());
    }

    /// Cause the next fetch() to fail with the given error.
    pub fn fail_next_fetch(&self, error: &str) {
        self.inner().fail_next_fetch = Some(error.to_string());
    }

    /// Make post() never complete until turned off again.
    pub fn stall_posts(&self, stall: bool) {
        self.inner().stall_posts = stall;
    }

    /// Clear all state (requests, queues, forced failures).
    pub fn reset(&self) {
        *self.inner() = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
        let stalled = {
            let mut inner = self.inner();
            inner.posts.push((url.to_string(), body.to_vec()));
            inner.stall_posts
        };

        if stalled {
            // Lock released above; the caller's timeout or drop ends this
            return std::future::pending().await;
        }

        let mut inner = self.inner();

        // Check for forced failure
        if let Some(error) = inner.fail_next_post.take() {
            return Err(TransportError::RequestFailed(error));
        }

        inner
            .post_queue
            .pop_front()
            .ok_or_else(|| TransportError::ConnectionFailed("no queued response".into()))
    }

    async fn fetch(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let mut inner = self.inner();
        inner.fetches.push(url.to_string());

        // Check for forced failure
        if let Some(error) = inner.fail_next_fetch.take() {
            return Err(TransportError::RequestFailed(error));
        }

        inner
            .fetch_responses
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| TransportError::ConnectionFailed(format!("nothing queued for {}", url)))
    }
}
