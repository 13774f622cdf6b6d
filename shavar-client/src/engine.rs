//! SyncEngine - the update cycle driver for shavar sync.
//!
//! This module provides [`SyncEngine`], which runs one update cycle at a
//! time against the list server and commits the result to a [`ChunkStore`].
//!
//! # Architecture
//!
//! SyncEngine uses a pure state machine (from shavar-core) to decide what
//! happens next and what the retry schedule becomes, and interprets the
//! actions to perform actual I/O via the Transport trait and the store.
//!
//! ```text
//! Caller → SyncEngine → Transport → list server
//!              ↓    ↘
//!   shavar-core      ChunkStore (one transaction per cycle)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use shavar_client::{SyncConfig, SyncEngine, MockTransport};
//!
//! let config = SyncConfig::new("api-key", vec!["goog-malware-shavar".into()]);
//! let engine = SyncEngine::new(config, MockTransport::new(), Arc::new(store));
//!
//! match engine.run_cycle(false).await {
//!     CycleOutcome::Synced(report) => println!("{} directives", report.directives),
//!     other => println!("{:?}", other),
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Mutex;

use shavar_core::{
    format_download_request, fullhash, requested_timeout, CycleAction, CycleEvent, CyclePhase,
    FullHashMatch, ListInventory,
};
use shavar_store::{ApplySummary, ChunkStore, FullHashCache, StoreError};
use shavar_types::{Directive, ListName, Prefix, ProtocolError, RetrySchedule};

use crate::parser::ResponseParser;
use crate::status::{check_status, StatusError};
use crate::transport::{HttpResponse, Transport, TransportError};

/// Default list server endpoint.
pub const DEFAULT_BASE_URL: &str = "https://safebrowsing.clients.google.com/safebrowsing/";
/// Default `client` query parameter.
pub const DEFAULT_CLIENT: &str = "api";
/// Default `appver` query parameter.
pub const DEFAULT_APP_VERSION: &str = "1.5.2";
/// Default `pver` query parameter.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2.2";
/// Default bound on each HTTP exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server refused the request.
    #[error("server error: {0}")]
    Status(#[from] StatusError),

    /// The response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Storage error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No lists are configured, so there is nothing to ask for.
    #[error("empty request body")]
    EmptyRequestBody,

    /// The server answered with an empty body where data was required.
    #[error("empty response body")]
    EmptyResponse,

    /// A 204 No Content answer carried a body.
    #[error("unexpected {0}-byte body on 204 response")]
    UnexpectedBody(usize),

    /// The cycle state machine produced an unexpected action.
    #[error("invalid cycle state: {0}")]
    InvalidState(String),
}

/// Configuration for SyncEngine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Endpoint prefix; `downloads` and `gethash` are appended to it.
    pub base_url: String,
    /// `client` query parameter.
    pub client: String,
    /// API key sent with every request.
    pub api_key: String,
    /// `appver` query parameter.
    pub app_version: String,
    /// `pver` query parameter.
    pub protocol_version: String,
    /// Lists to keep in sync, in request order.
    pub lists: Vec<ListName>,
    /// Bound on each HTTP exchange.
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Create a configuration with default endpoint settings.
    pub fn new(api_key: &str, lists: Vec<ListName>) -> Self {
        Self {
            api_key: api_key.to_string(),
            lists,
            ..Self::default()
        }
    }

    /// Set the endpoint prefix.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full URL for `cmd` (`downloads` or `gethash`).
    pub fn url(&self, cmd: &str) -> String {
        format!(
            "{}{}?client={}&apikey={}&appver={}&pver={}",
            self.base_url, cmd, self.client, self.api_key, self.app_version, self.protocol_version
        )
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client: DEFAULT_CLIENT.to_string(),
            api_key: String::new(),
            app_version: DEFAULT_APP_VERSION.to_string(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            lists: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// What a committed cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Directives committed, redirect contents included.
    pub directives: usize,
    /// Redirects fetched.
    pub redirects: usize,
    /// Unknown response lines skipped.
    pub ignored: usize,
    /// Row counts from the commit.
    pub applied: ApplySummary,
    /// Whether the server sent `e:pleaserekey`.
    pub rekey_requested: bool,
    /// Whether the run ignored the schedule.
    pub forced: bool,
    /// Schedule now in effect.
    pub schedule: RetrySchedule,
}

/// A failed cycle.
#[derive(Debug)]
pub struct CycleFailure {
    /// What went wrong.
    pub error: ClientError,
    /// Backoff chosen for this failure.
    pub backoff_minutes: u64,
    /// Schedule written for the failure, or `None` if it could not be
    /// recorded.
    pub schedule: Option<RetrySchedule>,
}

/// Result of one call to [`SyncEngine::run_cycle`].
#[derive(Debug)]
pub enum CycleOutcome {
    /// The schedule does not allow a cycle yet. Nothing was sent or written.
    TooSoon {
        /// Seconds until the next allowed attempt.
        wait_secs: u64,
    },
    /// The cycle committed.
    Synced(SyncReport),
    /// The cycle failed; nothing from it was applied.
    Failed(CycleFailure),
}

impl CycleOutcome {
    /// Whether the cycle failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Runs update cycles for a set of lists.
///
/// Cycles on one engine are serialised; a second caller waits for the
/// first cycle to finish and then sees the schedule it wrote.
pub struct SyncEngine<T: Transport, S: ChunkStore + ?Sized> {
    config: SyncConfig,
    transport: T,
    store: Arc<S>,
    phase: Mutex<CyclePhase>,
}

impl<T: Transport, S: ChunkStore + ?Sized> SyncEngine<T, S> {
    /// Create a new engine.
    pub fn new(config: SyncConfig, transport: T, store: Arc<S>) -> Self {
        Self {
            config,
            transport,
            store,
            phase: Mutex::new(CyclePhase::new()),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Get the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Whether a cycle is currently running.
    pub fn is_running(&self) -> bool {
        self.phase.try_lock().is_err()
    }

    /// Held chunk numbers for every configured list.
    pub async fn inventory(&self) -> Result<Vec<ListInventory>, StoreError> {
        let mut lists = Vec::with_capacity(self.config.lists.len());
        for list in &self.config.lists {
            let adds = self.store.distinct_add_chunk_numbers(list).await?;
            let subs = self.store.distinct_sub_chunk_numbers(list).await?;
            lists.push(ListInventory::new(list.clone(), adds, subs));
        }
        Ok(lists)
    }

    /// Run one cycle using the system clock.
    pub async fn run_cycle(&self, force: bool) -> CycleOutcome {
        self.run_cycle_at(unix_now(), force).await
    }

    /// Run one cycle at `now` (unix seconds).
    ///
    /// Never returns an error: failures are recorded in the retry schedule
    /// and reported as [`CycleOutcome::Failed`]. Dropping the future before
    /// it completes leaves the store untouched.
    pub async fn run_cycle_at(&self, now: u64, force: bool) -> CycleOutcome {
        let mut phase = self.phase.lock().await;
        if phase.is_active() {
            tracing::warn!("Previous cycle was interrupted while {}", phase.name());
            *phase = CyclePhase::Idle;
        }

        let schedule = match self.store.read_retry_schedule().await {
            Ok(schedule) => schedule,
            Err(e) => {
                tracing::error!("Failed to read retry schedule: {}", e);
                return CycleOutcome::Failed(CycleFailure {
                    error: e.into(),
                    backoff_minutes: 0,
                    schedule: None,
                });
            }
        };

        let start = CycleEvent::Start {
            now,
            force,
            schedule,
        };
        for action in advance(&mut phase, start) {
            match action {
                CycleAction::AbortTooSoon { wait_secs } => {
                    tracing::info!("Too soon to update, next attempt in {} seconds", wait_secs);
                    return CycleOutcome::TooSoon { wait_secs };
                }
                CycleAction::IgnoreTimeoutGuidance { wait_secs } => {
                    tracing::info!(
                        "Forced update, ignoring timeout guidance ({} seconds left)",
                        wait_secs
                    );
                }
                _ => {}
            }
        }

        tracing::info!("Starting update for {} lists", self.config.lists.len());
        match self.execute(&mut phase, force).await {
            Ok(report) => CycleOutcome::Synced(report),
            Err(error) => CycleOutcome::Failed(self.record_failure(&mut phase, error).await),
        }
    }

    /// Ask the server for the full hashes behind `prefixes` and cache them
    /// as confirmed at `now`.
    pub async fn fetch_full_hashes(
        &self,
        prefixes: &[Prefix],
        now: u64,
    ) -> Result<Vec<FullHashMatch>, ClientError> {
        if prefixes.is_empty() {
            return Ok(Vec::new());
        }

        let body = fullhash::encode_request(prefixes)?;
        let response = self.post("gethash", &body).await?;
        check_status(response.status)?;
        if response.status == 204 {
            if !response.body.is_empty() {
                return Err(ClientError::UnexpectedBody(response.body.len()));
            }
            tracing::debug!("No full hashes for {} prefixes", prefixes.len());
            return Ok(Vec::new());
        }
        if response.body.is_empty() {
            return Err(ClientError::EmptyResponse);
        }

        let matches = fullhash::parse_response(&response.body)?;
        let cache = FullHashCache::new(Arc::clone(&self.store));
        for m in &matches {
            cache.insert(m.list.clone(), m.add_chunk, m.hash, now).await?;
        }

        tracing::debug!(
            "Got {} full hashes for {} prefixes",
            matches.len(),
            prefixes.len()
        );
        Ok(matches)
    }

    async fn execute(
        &self,
        phase: &mut CyclePhase,
        forced: bool,
    ) -> Result<SyncReport, ClientError> {
        let body = format_download_request(&self.inventory().await?);
        if body.is_empty() {
            return Err(ClientError::EmptyRequestBody);
        }
        tracing::debug!("Request body:\n{}", body.trim_end());
        advance(phase, CycleEvent::RequestBuilt);

        let raw = self.download(body.as_bytes()).await?;
        advance(phase, CycleEvent::ResponseReceived);

        let parsed = ResponseParser::new(&self.transport, self.config.request_timeout)
            .parse(&raw)
            .await?;
        let parsed_event = CycleEvent::Parsed {
            requested_timeout: requested_timeout(&parsed.directives),
        };
        let (expected, next) = match advance(phase, parsed_event).as_slice() {
            [CycleAction::ApplyBatch { expected, next }] => (*expected, *next),
            other => return Err(ClientError::InvalidState(format!("{:?}", other))),
        };

        let applied = self
            .store
            .commit_cycle(&parsed.directives, expected, next)
            .await?;
        advance(phase, CycleEvent::Committed);

        let rekey_requested = parsed.directives.contains(&Directive::Rekey);
        if rekey_requested {
            tracing::warn!("Server requested rekey; this client does not hold keys");
        }
        if applied.resets > 0 {
            tracing::info!("Server requested reset; local list data cleared");
        }

        tracing::info!(
            "Update finished: {} directives ({} inserted, {} deleted), next update in {} seconds",
            parsed.directives.len(),
            applied.inserted,
            applied.deleted,
            next.next_attempt.saturating_sub(next.last_attempt)
        );

        Ok(SyncReport {
            directives: parsed.directives.len(),
            redirects: parsed.redirects,
            ignored: parsed.ignored,
            applied,
            rekey_requested,
            forced,
            schedule: next,
        })
    }

    async fn download(&self, body: &[u8]) -> Result<Vec<u8>, ClientError> {
        let response = self.post("downloads", body).await?;
        check_status(response.status)?;
        if response.body.is_empty() {
            return Err(ClientError::EmptyResponse);
        }
        Ok(response.body)
    }

    async fn post(&self, cmd: &str, body: &[u8]) -> Result<HttpResponse, ClientError> {
        let url = self.config.url(cmd);
        let response = tokio::time::timeout(
            self.config.request_timeout,
            self.transport.post(&url, body),
        )
        .await
        .map_err(|_| TransportError::Timeout)??;
        Ok(response)
    }

    async fn record_failure(&self, phase: &mut CyclePhase, error: ClientError) -> CycleFailure {
        tracing::error!("Update failed: {}", error);

        let failed = CycleEvent::Failed {
            error: error.to_string(),
        };
        let recorded = advance(phase, failed).into_iter().find_map(|action| match action {
            CycleAction::RecordFailure {
                expected,
                next,
                backoff_minutes,
                ..
            } => Some((expected, next, backoff_minutes)),
            _ => None,
        });
        let Some((expected, next, backoff_minutes)) = recorded else {
            return CycleFailure {
                error,
                backoff_minutes: 0,
                schedule: None,
            };
        };

        let schedule = match self.store.write_retry_schedule(expected, next).await {
            Ok(()) => {
                tracing::info!(
                    "{} consecutive failures, next attempt in {} minutes",
                    next.error_count,
                    backoff_minutes
                );
                Some(next)
            }
            Err(StoreError::ScheduleConflict) => {
                tracing::warn!("Retry schedule changed by another writer; failure not recorded");
                None
            }
            Err(e) => {
                tracing::error!("Failed to record failure: {}", e);
                None
            }
        };

        CycleFailure {
            error,
            backoff_minutes,
            schedule,
        }
    }
}

/// Feed `event` to the phase machine and return the resulting actions.
fn advance(phase: &mut CyclePhase, event: CycleEvent) -> Vec<CycleAction> {
    let from = phase.name();
    let (next, actions) = std::mem::take(phase).on_event(event);
    tracing::debug!("Cycle phase {} -> {}", from, next.name());
    *phase = next;
    actions
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
