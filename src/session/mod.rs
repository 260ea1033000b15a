//! Sync session orchestration.
//!
//! A session runs one or more passes. Each pass provisions a fresh
//! [`SyncContext`], configures it (proxy, exclusion rules, journal,
//! credential hooks), hands it to the reconciliation engine, and tears it
//! down completely. The controller repeats passes while the engine reports
//! that another one is needed.
//!
//! # Submodules
//!
//! - [`config`] - per-context configuration
//! - [`context`] - the per-pass aggregate
//! - [`controller`] - the state machine and restart loop

pub mod config;
pub mod context;
pub mod controller;

pub use config::SessionConfig;
pub use context::SyncContext;
pub use controller::SyncSessionController;

use crate::engine::PassStats;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Tri-state outcome of one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResult {
    /// The pass finished and nothing further is pending.
    Clean,
    /// The pass finished but changes arrived during it; run again.
    NeedsRepeat,
    /// The engine reported failure. Ends the session, not the process.
    Failed,
}

impl PassResult {
    /// Stable label for machine-readable output.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Clean => "clean",
            Self::NeedsRepeat => "needs_repeat",
            Self::Failed => "failed",
        }
    }
}

/// What a whole session amounted to.
#[derive(Debug)]
pub struct SessionSummary {
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Number of passes run, including the failed one if any.
    pub passes: u32,
    /// Aggregated engine counters across all passes.
    pub stats: PassStats,
    /// Outcome of the final pass.
    pub outcome: PassResult,
    /// Wall-clock duration of the whole session.
    pub duration: Duration,
}

impl SessionSummary {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            passes: 0,
            stats: PassStats::default(),
            outcome: PassResult::Clean,
            duration: Duration::ZERO,
        }
    }

    pub(crate) fn record(&mut self, result: PassResult, stats: PassStats) {
        self.passes += 1;
        self.stats.absorb(stats);
        self.outcome = result;
    }

    /// Whether the session ended without an engine failure.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome != PassResult::Failed
    }
}
