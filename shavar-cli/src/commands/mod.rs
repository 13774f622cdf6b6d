//! CLI command implementations.

pub mod flush;
pub mod purge;
pub mod run;
pub mod status;
pub mod update;
