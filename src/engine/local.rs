//! Built-in local indexing engine.
//!
//! Walks the source tree, diffs each file's (inode, mode, modtime, size)
//! against the journal's `metadata` rows and writes the differences back.
//! Files that change underneath the scan raise the needs-repeat flag so
//! the session runs again. Journal statements that fail softly are counted
//! and skipped; they never abort the pass.

use crate::config::JOURNAL_FILE_NAME;
use crate::engine::{EngineError, EngineReport, PassStats, ReconcileEngine};
use crate::exclude::ExcludeList;
use crate::journal::JournalStore;
use crate::session::SyncContext;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_64;

/// Local scan engine. Stateless across passes.
#[derive(Debug, Default)]
pub struct LocalScanEngine;

impl LocalScanEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ReconcileEngine for LocalScanEngine {
    fn run(&self, mut ctx: SyncContext) -> impl Future<Output = (SyncContext, EngineReport)> + Send {
        async move {
            let journal = ctx.take_journal();
            let source = ctx.source_dir().to_path_buf();
            let excludes = ctx.excludes().clone();

            // Journal calls block for up to the busy-retry ceiling, so the
            // scan runs on the blocking pool.
            match tokio::task::spawn_blocking(move || scan(&source, &excludes, journal)).await {
                Ok((journal, report)) => {
                    if let Some(journal) = journal {
                        ctx.attach_journal(journal);
                    }
                    (ctx, report)
                }
                Err(e) => (
                    ctx,
                    EngineReport {
                        result: Err(EngineError::Internal(format!("scan task failed: {e}"))),
                        another_sync_needed: false,
                    },
                ),
            }
        }
    }
}

/// One full pass over the tree. Returns the journal so the caller can
/// reattach it to the context.
fn scan(
    source: &Path,
    excludes: &ExcludeList,
    journal: Option<JournalStore>,
) -> (Option<JournalStore>, EngineReport) {
    let Some(journal) = journal else {
        return (
            None,
            EngineReport {
                result: Err(EngineError::MissingJournal),
                another_sync_needed: false,
            },
        );
    };

    let scan_epoch = chrono::Utc::now().timestamp();
    let mut stats = PassStats::default();
    let mut needs_repeat = false;

    // Previous state, keyed by the synchronization key. A soft query
    // failure degrades to "remember nothing": every file looks changed and
    // gets rewritten, which is correct, just not incremental.
    let mut known: HashMap<i64, (i64, i64)> = HashMap::new();
    match journal.query("SELECT key, modtime, size FROM metadata") {
        Ok(rows) => {
            for row in rows {
                if let (Some(key), Some(modtime), Some(size)) = (
                    row.first().and_then(|v| v.parse::<i64>().ok()),
                    row.get(1).and_then(|v| v.parse::<i64>().ok()),
                    row.get(2).and_then(|v| v.parse::<i64>().ok()),
                ) {
                    known.insert(key, (modtime, size));
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "could not read journal state, rescanning everything");
            stats.soft_failures += 1;
        }
    }

    let walker = WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            let rel = relative_str(entry.path(), source);
            !is_journal_artifact(&rel)
                && !excludes.is_excluded(&rel, entry.file_type().is_dir())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = relative_str(entry.path(), source);
        let Ok(meta) = entry.metadata() else {
            warn!(path = %rel, "could not stat file, skipping");
            continue;
        };

        stats.files_seen += 1;

        let modtime = modtime_secs(&meta);
        let size = i64::try_from(meta.len()).unwrap_or(i64::MAX);
        let key = sync_key(&rel);

        if modtime > scan_epoch {
            debug!(path = %rel, "file changed during the scan");
            needs_repeat = true;
        }

        match known.remove(&key) {
            Some((old_modtime, old_size)) if old_modtime == modtime && old_size == size => {}
            _ => {
                let statement = format!(
                    "INSERT OR REPLACE INTO metadata \
                     (key, path, inode, mode, modtime, type, size) \
                     VALUES ({key}, '{}', {}, {}, {modtime}, 0, {size})",
                    sql_escape(&rel),
                    inode_of(&meta),
                    mode_of(&meta),
                );
                match journal.insert(&statement) {
                    Ok(_) => stats.rows_written += 1,
                    Err(e) => {
                        warn!(path = %rel, error = %e, "journal write failed, skipping row");
                        stats.soft_failures += 1;
                    }
                }
            }
        }
    }

    // Whatever is still in the map no longer exists on disk.
    for key in known.keys() {
        match journal.insert(&format!("DELETE FROM metadata WHERE key = {key}")) {
            Ok(_) => stats.rows_removed += 1,
            Err(e) => {
                warn!(key, error = %e, "journal delete failed, skipping row");
                stats.soft_failures += 1;
            }
        }
    }

    info!(
        files = stats.files_seen,
        written = stats.rows_written,
        removed = stats.rows_removed,
        "local scan finished"
    );

    (
        Some(journal),
        EngineReport {
            result: Ok(stats),
            another_sync_needed: needs_repeat,
        },
    )
}

/// The synchronization key for a path, stable across passes.
#[allow(clippy::cast_possible_wrap)]
fn sync_key(relative: &str) -> i64 {
    xxh3_64(relative.as_bytes()) as i64
}

fn relative_str(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn is_journal_artifact(relative: &str) -> bool {
    relative == JOURNAL_FILE_NAME
        || relative
            .strip_prefix(JOURNAL_FILE_NAME)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn sql_escape(s: &str) -> String {
    s.replace('\'', "''")
}

fn modtime_secs(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(0)
}

#[cfg(unix)]
fn inode_of(meta: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    i64::try_from(meta.ino()).unwrap_or(0)
}

#[cfg(not(unix))]
fn inode_of(_meta: &std::fs::Metadata) -> i64 {
    0
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    i64::from(meta.mode())
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> i64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::target::TargetUrl;
    use std::fs;
    use tempfile::TempDir;

    fn context_with_journal(dir: &TempDir) -> SyncContext {
        let target = TargetUrl::parse("https://files.example.org/dav").unwrap();
        let mut ctx = SyncContext::new(1, dir.path(), target, false).unwrap();
        ctx.init().unwrap();

        let journal = JournalStore::load(&config::journal_path(dir.path())).unwrap();
        journal.ensure_schema().unwrap();
        ctx.attach_journal(journal);
        ctx
    }

    fn row_count(ctx: &SyncContext) -> usize {
        ctx.journal()
            .unwrap()
            .query("SELECT key FROM metadata")
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn first_scan_indexes_every_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"beta").unwrap();

        let engine = LocalScanEngine::new();
        let (ctx, report) = engine.run(context_with_journal(&dir)).await;

        let stats = report.result.unwrap();
        assert_eq!(stats.files_seen, 2);
        assert_eq!(stats.rows_written, 2);
        assert!(!report.another_sync_needed);
        assert_eq!(row_count(&ctx), 2);
    }

    #[tokio::test]
    async fn unchanged_files_write_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"alpha").unwrap();

        let engine = LocalScanEngine::new();
        let (ctx, _) = engine.run(context_with_journal(&dir)).await;

        // Same journal, same tree: nothing changed.
        let (_, report) = engine.run(ctx).await;
        let stats = report.result.unwrap();
        assert_eq!(stats.files_seen, 1);
        assert_eq!(stats.rows_written, 0);
    }

    #[tokio::test]
    async fn removed_files_drop_their_rows() {
        let dir = TempDir::new().unwrap();
        let victim = dir.path().join("a.txt");
        fs::write(&victim, b"alpha").unwrap();

        let engine = LocalScanEngine::new();
        let (ctx, _) = engine.run(context_with_journal(&dir)).await;

        fs::remove_file(&victim).unwrap();
        let (ctx, report) = engine.run(ctx).await;

        let stats = report.result.unwrap();
        assert_eq!(stats.rows_removed, 1);
        assert_eq!(row_count(&ctx), 0);
    }

    #[tokio::test]
    async fn excluded_files_are_invisible() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.txt"), b"keep").unwrap();
        fs::write(dir.path().join("drop.tmp"), b"drop").unwrap();

        let mut ctx = context_with_journal(&dir);
        let mut excludes = ExcludeList::default();
        excludes.add("*.tmp");
        ctx.set_excludes(excludes);

        let engine = LocalScanEngine::new();
        let (_, report) = engine.run(ctx).await;

        let stats = report.result.unwrap();
        assert_eq!(stats.files_seen, 1);
    }

    #[tokio::test]
    async fn journal_file_is_never_indexed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("real.txt"), b"data").unwrap();

        // The journal and its sidecar already live inside the tree.
        let engine = LocalScanEngine::new();
        let (_, report) = engine.run(context_with_journal(&dir)).await;

        assert_eq!(report.result.unwrap().files_seen, 1);
    }

    #[tokio::test]
    async fn future_modtime_requests_another_pass() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("racing.txt");
        fs::write(&path, b"mid-flight change").unwrap();

        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(3600))
            .unwrap();
        drop(file);

        let engine = LocalScanEngine::new();
        let (_, report) = engine.run(context_with_journal(&dir)).await;

        assert!(report.another_sync_needed);
    }

    #[tokio::test]
    async fn missing_journal_fails_the_pass() {
        let dir = TempDir::new().unwrap();
        let target = TargetUrl::parse("https://files.example.org/dav").unwrap();
        let mut ctx = SyncContext::new(1, dir.path(), target, false).unwrap();
        ctx.init().unwrap();

        let engine = LocalScanEngine::new();
        let (_, report) = engine.run(ctx).await;

        assert!(matches!(report.result, Err(EngineError::MissingJournal)));
    }
}
