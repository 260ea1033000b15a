//! Session controller: drives passes from context creation to teardown.
//!
//! The per-pass protocol is strict: create the context, start the engine's
//! transport, run the credential pre-init hook, initialize the context,
//! configure it (proxy, exclusion rules, journal), run the credential
//! pre-start hook, then dispatch the engine asynchronously and wait for
//! its report. Teardown of one pass finishes before the next pass begins;
//! a repeat re-acquires context, journal and credentials from scratch.

use crate::config::{self, SessionOptions};
use crate::creds::CredentialsProvider;
use crate::engine::{PassStats, ReconcileEngine};
use crate::error::{Error, Result};
use crate::exclude::ExcludeList;
use crate::journal::JournalStore;
use crate::proxy::{self, ProxyConfig, SystemProxyResolver};
use crate::session::{PassResult, SessionSummary, SyncContext};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct SyncSessionController<E, C, R> {
    options: SessionOptions,
    engine: Arc<E>,
    credentials: C,
    proxy_resolver: R,
    passes: u32,
}

impl<E, C, R> SyncSessionController<E, C, R>
where
    E: ReconcileEngine,
    C: CredentialsProvider,
    R: SystemProxyResolver,
{
    pub fn new(options: SessionOptions, engine: Arc<E>, credentials: C, proxy_resolver: R) -> Self {
        Self {
            options,
            engine,
            credentials,
            proxy_resolver,
            passes: 0,
        }
    }

    /// Run passes until one comes back clean or failed.
    ///
    /// The engine's needs-repeat flag is authoritative and uncapped; each
    /// restart is logged so a pathological engine is at least visible.
    ///
    /// # Errors
    ///
    /// Propagates fatal errors (context creation/init, transport startup,
    /// journal load). Engine-reported failures are not fatal; they end the
    /// session with a failed outcome in the summary.
    pub async fn run(&mut self) -> Result<SessionSummary> {
        let mut summary = SessionSummary::new(Utc::now());
        let clock = Instant::now();

        loop {
            let (result, stats) = self.run_pass().await?;
            summary.record(result, stats);

            match result {
                PassResult::NeedsRepeat => {
                    info!(pass = self.passes, "restarting sync, another pass is needed");
                }
                PassResult::Clean | PassResult::Failed => break,
            }
        }

        summary.duration = clock.elapsed();
        Ok(summary)
    }

    /// Exactly one pass: Created -> Initialized -> Configured -> Running
    /// -> Finished.
    async fn run_pass(&mut self) -> Result<(PassResult, PassStats)> {
        self.passes += 1;
        debug!(pass = self.passes, "creating sync context");

        // Created
        let mut ctx = SyncContext::new(
            self.passes,
            &self.options.source_dir,
            self.options.target.clone(),
            self.options.trust_ssl,
        )?;

        // Initialized
        self.engine
            .startup()
            .map_err(|e| Error::EngineStartup(e.to_string()))?;
        self.credentials.on_context_pre_init(&mut ctx)?;
        ctx.init()?;

        // Configured
        self.configure(&mut ctx)?;
        self.credentials.on_context_pre_start(&mut ctx)?;

        // Running: dispatch asynchronously so anything already queued on
        // the runtime gets to run first, then wait for the completion
        // signal.
        info!(
            pass = self.passes,
            source = %ctx.source_dir().display(),
            target = %ctx.target(),
            "starting sync pass"
        );
        let engine = Arc::clone(&self.engine);
        let handle = tokio::spawn(async move { engine.run(ctx).await });

        let (mut ctx, report) = match handle.await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "reconciliation task died");
                self.engine.shutdown();
                return Ok((PassResult::Failed, PassStats::default()));
            }
        };

        // Finished
        let outcome = match report.result {
            Ok(stats) => {
                if let Some(journal) = ctx.take_journal() {
                    if let Err(e) = journal.promote() {
                        warn!(error = %e, "could not promote journal, keeping previous one");
                    }
                }
                let result = if report.another_sync_needed {
                    PassResult::NeedsRepeat
                } else {
                    PassResult::Clean
                };
                (result, stats)
            }
            Err(e) => {
                error!(pass = self.passes, error = %e, "sync pass failed");
                (PassResult::Failed, PassStats::default())
            }
        };

        // Teardown completes before any next pass is created.
        drop(ctx);
        self.engine.shutdown();

        Ok(outcome)
    }

    /// Populate the context: proxy, exclusion rules, journal.
    fn configure(&self, ctx: &mut SyncContext) -> Result<()> {
        // Explicit proxy configuration always wins over auto-detection.
        ctx.config_mut().proxy = match self.options.proxy.as_deref() {
            Some(raw) => proxy::parse_proxy(raw),
            None => self.proxy_resolver.resolve(ctx.target()),
        };
        if let ProxyConfig::Http { host, port } = &ctx.config().proxy {
            debug!(host = %host, port = port.unwrap_or_default(), "using http proxy");
        }

        if let Some(path) = &self.options.exclude_file {
            match ExcludeList::load(path) {
                Ok(excludes) => {
                    ctx.config_mut().exclusion_path = Some(path.clone());
                    ctx.set_excludes(excludes);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "could not load exclusion list");
                }
            }
        }

        let journal = JournalStore::load(&config::journal_path(ctx.source_dir()))?;
        if !journal.existed() {
            journal.ensure_schema()?;
        }
        ctx.attach_journal(journal);

        Ok(())
    }
}
