//! The sync journal: an embedded SQLite store for per-file sync metadata.
//!
//! One [`JournalStore`] instance lives for exactly one sync pass. Loading
//! validates (and if necessary discards) the on-disk journal, then copies it
//! to a working sidecar file so a crash mid-pass can never corrupt the
//! last-known-good journal. All statement execution is wrapped in bounded
//! busy-wait and schema-drift retry loops because another process may hold
//! the database lock or alter table definitions concurrently.
//!
//! # Submodules
//!
//! - [`schema`] - `metadata` table DDL
//! - [`store`] - the store implementation

pub mod schema;
pub mod store;

pub use store::{JournalStore, QueryError, RetryPolicy, Row};
