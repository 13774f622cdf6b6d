//! # shavar-core
//!
//! Pure protocol logic for shavar threat-list sync (no I/O, instant tests).
//!
//! This crate implements the codecs and the sync-cycle state machine
//! without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (HTTP, SQLite) is performed by `shavar-client` and
//! `shavar-store`, which interpret the values produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod fullhash;
pub mod range;
pub mod request;
pub mod response;
pub mod schedule;

pub use chunk::{decode_add_chunk, decode_sub_chunk};
pub use fullhash::FullHashMatch;
pub use request::{format_download_request, format_list_request, ListInventory};
pub use response::{parse_download_response, parse_redirect_response, ResponseItem};
pub use schedule::{
    backoff_minutes, requested_timeout, CycleAction, CycleEvent, CyclePhase, DEFAULT_TIMEOUT_SECS,
};
