//! The per-pass sync context.
//!
//! One [`SyncContext`] aggregates everything a single synchronization
//! attempt works with: source path, target endpoint, exclusion rules,
//! session configuration, credentials and the journal handle. A context is
//! built fresh for every pass and destroyed at teardown; nothing in it
//! survives into the next pass.

use crate::creds::Credentials;
use crate::error::{Error, Result};
use crate::exclude::ExcludeList;
use crate::journal::JournalStore;
use crate::session::SessionConfig;
use crate::target::TargetUrl;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
pub struct SyncContext {
    pass: u32,
    source_dir: PathBuf,
    target: TargetUrl,
    trust_ssl: bool,
    config: SessionConfig,
    excludes: ExcludeList,
    credentials: Credentials,
    journal: Option<JournalStore>,
    initialized: bool,
}

impl SyncContext {
    /// Allocate a context bound to a source directory and target endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContextCreate`] when the source is not an existing
    /// directory. This is fatal to the session.
    pub fn new(pass: u32, source_dir: &Path, target: TargetUrl, trust_ssl: bool) -> Result<Self> {
        if !source_dir.is_dir() {
            return Err(Error::ContextCreate {
                path: source_dir.to_path_buf(),
                reason: "source is not an existing directory".to_string(),
            });
        }

        Ok(Self {
            pass,
            source_dir: source_dir.to_path_buf(),
            target,
            trust_ssl,
            config: SessionConfig::default(),
            excludes: ExcludeList::default(),
            credentials: Credentials::default(),
            journal: None,
            initialized: false,
        })
    }

    /// Internal initialization: pin down the source path and prove it is
    /// readable before anything else runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContextInit`]; fatal to the session.
    pub fn init(&mut self) -> Result<()> {
        let canonical = self
            .source_dir
            .canonicalize()
            .map_err(|e| Error::ContextInit(format!("cannot resolve source directory: {e}")))?;

        std::fs::read_dir(&canonical)
            .map_err(|e| Error::ContextInit(format!("cannot read source directory: {e}")))?;

        debug!(source = %canonical.display(), pass = self.pass, "sync context initialized");
        self.source_dir = canonical;
        self.initialized = true;
        Ok(())
    }

    /// Which pass of the session this context belongs to (1-based).
    #[must_use]
    pub fn pass_number(&self) -> u32 {
        self.pass
    }

    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    #[must_use]
    pub fn target(&self) -> &TargetUrl {
        &self.target
    }

    #[must_use]
    pub fn trust_ssl(&self) -> bool {
        self.trust_ssl
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    #[must_use]
    pub fn excludes(&self) -> &ExcludeList {
        &self.excludes
    }

    pub fn set_excludes(&mut self, excludes: ExcludeList) {
        self.excludes = excludes;
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    /// The attached journal, if the configure stage got that far.
    #[must_use]
    pub fn journal(&self) -> Option<&JournalStore> {
        self.journal.as_ref()
    }

    pub fn attach_journal(&mut self, journal: JournalStore) {
        self.journal = Some(journal);
    }

    /// Detach the journal, e.g. to hand it to a blocking worker or to
    /// promote it during teardown.
    pub fn take_journal(&mut self) -> Option<JournalStore> {
        self.journal.take()
    }
}
