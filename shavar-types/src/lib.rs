//! # shavar-types
//!
//! Wire and storage types for the shavar threat-list sync protocol.
//!
//! This crate provides the foundational types used across all shavar crates:
//! - [`ListName`], [`ChunkRange`], [`HostKey`], [`Prefix`], [`FullHash`] - Addressing types
//! - [`AddEntry`], [`SubEntry`], [`FullHashEntry`] - Reconciled records
//! - [`Directive`] - Ordered reconciliation steps decoded from a response
//! - [`RetrySchedule`] - The persisted sync gate
//! - [`ProtocolError`] - Wire format errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod directive;
mod error;
mod ids;
mod schedule;

pub use directive::{AddEntry, Directive, FullHashEntry, SubEntry, FULL_HASH_TTL_SECS};
pub use error::ProtocolError;
pub use ids::{
    ChunkNum, ChunkRange, FullHash, HostKey, ListName, Prefix, FULL_HASH_LEN, HOST_KEY_LEN,
    MAX_PREFIX_LEN,
};
pub use schedule::RetrySchedule;
