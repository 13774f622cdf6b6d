//! Turns a downloads response into one ordered directive batch.
//!
//! Redirects are fetched concurrently, then each redirect's directives are
//! spliced in at the position of its `u:` line, so the batch order always
//! matches the response order.

use crate::engine::ClientError;
use crate::status::{check_status, StatusError};
use crate::transport::{Transport, TransportError};
use futures_util::future::try_join_all;
use shavar_core::{parse_download_response, parse_redirect_response, ResponseItem};
use shavar_types::{Directive, ListName};
use std::time::Duration;

/// A fully resolved response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Directives in application order.
    pub directives: Vec<Directive>,
    /// Number of redirects fetched.
    pub redirects: usize,
    /// Number of lines skipped as unknown.
    pub ignored: usize,
}

/// Parses downloads responses, fetching redirect data through a transport.
pub struct ResponseParser<'a, T: Transport + ?Sized> {
    transport: &'a T,
    timeout: Duration,
}

impl<'a, T: Transport + ?Sized> ResponseParser<'a, T> {
    /// Each redirect fetch is bounded by `timeout`.
    pub fn new(transport: &'a T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Parse `raw`, resolving every redirect.
    ///
    /// Any failing redirect fails the whole parse; nothing is returned
    /// partially.
    pub async fn parse(&self, raw: &[u8]) -> Result<ParsedResponse, ClientError> {
        let items = parse_download_response(raw)?;

        let mut ignored = 0;
        let mut fetches = Vec::new();
        for item in &items {
            match item {
                ResponseItem::Ignored(line) => {
                    tracing::warn!("Ignoring unknown response line: {}", line);
                    ignored += 1;
                }
                ResponseItem::Redirect { list, url } => {
                    fetches.push(self.fetch_redirect(list, url));
                }
                ResponseItem::Directive(_) => {}
            }
        }

        let redirects = fetches.len();
        let mut fetched = try_join_all(fetches).await?.into_iter();

        let mut directives = Vec::new();
        for item in items {
            match item {
                ResponseItem::Directive(directive) => directives.push(directive),
                ResponseItem::Redirect { .. } => {
                    // One result per redirect, in the same order
                    directives.extend(fetched.next().unwrap_or_default());
                }
                ResponseItem::Ignored(_) => {}
            }
        }

        Ok(ParsedResponse {
            directives,
            redirects,
            ignored,
        })
    }

    async fn fetch_redirect(
        &self,
        list: &ListName,
        url: &str,
    ) -> Result<Vec<Directive>, ClientError> {
        let response = tokio::time::timeout(self.timeout, self.transport.fetch(url))
            .await
            .map_err(|_| TransportError::Timeout)??;

        check_status(response.status)?;
        if response.status != 200 {
            return Err(StatusError::UnknownStatus(response.status).into());
        }

        let directives = parse_redirect_response(list, &response.body)?;
        tracing::debug!(
            "Redirect {} for {}: {} directives",
            url,
            list,
            directives.len()
        );
        Ok(directives)
    }
}
