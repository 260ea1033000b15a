//! Reconciliation engine seam.
//!
//! The controller treats the engine as an opaque async unit of work: it
//! hands over a fully configured [`SyncContext`], waits for the returned
//! report, and reads the `another_sync_needed` flag off it. Transport,
//! tree diffing and conflict policy all live behind this trait.
//!
//! # Submodules
//!
//! - [`local`] - the built-in local indexing engine

pub mod local;

use crate::session::SyncContext;
use std::future::Future;

/// Errors an engine can report for a whole pass.
///
/// These end the pass, not the process; the controller records a failed
/// pass and tears the session down normally.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no journal attached to the sync context")]
    MissingJournal,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Internal(String),
}

/// Counters from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct PassStats {
    /// Files visited in the source tree.
    pub files_seen: u64,
    /// Journal rows inserted or replaced.
    pub rows_written: u64,
    /// Journal rows removed for files that disappeared.
    pub rows_removed: u64,
    /// Journal statements that failed softly and were skipped.
    pub soft_failures: u64,
}

impl PassStats {
    /// Fold another pass's counters into this one.
    pub fn absorb(&mut self, other: PassStats) {
        self.files_seen += other.files_seen;
        self.rows_written += other.rows_written;
        self.rows_removed += other.rows_removed;
        self.soft_failures += other.soft_failures;
    }
}

/// What a finished pass reports back to the controller.
#[derive(Debug)]
pub struct EngineReport {
    /// Completion outcome of the pass.
    pub result: Result<PassStats, EngineError>,
    /// Changes arrived during the pass; the session needs another one.
    pub another_sync_needed: bool,
}

/// An asynchronous reconciliation engine.
///
/// `run` consumes the context and must hand it back so the controller can
/// finish teardown (journal promotion) afterwards.
pub trait ReconcileEngine: Send + Sync + 'static {
    /// One-time transport setup per pass, before the context initializes.
    ///
    /// # Errors
    ///
    /// An error here is fatal to the session.
    fn startup(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Execute one reconciliation pass over the prepared context.
    fn run(&self, ctx: SyncContext) -> impl Future<Output = (SyncContext, EngineReport)> + Send;

    /// Teardown counterpart of [`ReconcileEngine::startup`], called after
    /// the context is destroyed.
    fn shutdown(&self) {}
}
