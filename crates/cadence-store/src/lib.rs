//! # cadence-store
//!
//! Disk persistence for the stream engine: a bounded, versioned snapshot of
//! the recent streams list, one file per account, reloaded at startup and
//! rewritten in the background after every mutation of the canonical list.

pub mod cache;
pub mod legacy;

mod error;

pub use cache::{StreamCache, CACHE_VERSION, MAX_CACHED_STREAMS};
pub use error::{Result, StoreError};
