//! # shavar-client
//!
//! Update cycle driver for shavar threat-list sync.
//!
//! This is the library that applications use to keep local list data
//! current and to confirm prefix hits against the server.
//!
//! ## Features
//!
//! - **Single Writer**: cycles are serialised in-process, and the retry
//!   schedule is swapped with a compare-and-swap across processes
//! - **Transport Abstraction**: Pluggable transport layer (reqwest, mock)
//! - **Pure State Machine**: Uses shavar-core for side-effect-free logic
//! - **Atomic Commits**: a cycle's directives and schedule land in one
//!   transaction, or not at all
//!
//! ## Example
//!
//! ```ignore
//! use shavar_client::{HttpTransport, SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::new("api-key", vec!["goog-malware-shavar".into()]);
//! let transport = HttpTransport::new(config.request_timeout)?;
//! let engine = SyncEngine::new(config, transport, Arc::new(store));
//!
//! // One update cycle, honouring the retry schedule
//! let outcome = engine.run_cycle(false).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod parser;
pub mod runner;
pub mod status;
pub mod transport;

pub use engine::{
    unix_now, ClientError, CycleFailure, CycleOutcome, SyncConfig, SyncEngine, SyncReport,
};
pub use parser::{ParsedResponse, ResponseParser};
pub use runner::{spawn_sync_task, RunnerConfig};
pub use status::{check_status, StatusError};
pub use transport::{HttpResponse, HttpTransport, MockTransport, Transport, TransportError};
