//! Journal store implementation.
//!
//! The load path self-heals corruption: a journal file that is missing,
//! empty, has a foreign format header, or fails to open is discarded and
//! recreated empty rather than blocking the session. Query and insert carry
//! the bounded retry loops described in the module docs; after the retry
//! budget is exhausted they fail softly with [`QueryError`], which callers
//! treat as "no usable data" rather than a reason to end the session.

use crate::error::{Error, Result};
use crate::journal::schema;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// First bytes of every SQLite database file.
const FORMAT_MAGIC: &[u8] = b"SQLite format 3";

/// Suffix appended to the journal path for the working sidecar copy.
const SIDECAR_SUFFIX: &str = "tmp";

/// Probe distinguishing an existing journal from a fresh one. A fresh
/// database has no tables at all, so the probe errors out on it; an
/// existing journal returns a single count row.
const EXISTS_PROBE: &str = "SELECT COUNT(key) FROM metadata LIMIT 1 OFFSET 0;";

/// One result row: column values rendered as text, in select order.
///
/// Columns are untyped at this layer; callers parse what they need. NULL
/// renders as the empty string.
pub type Row = Vec<String>;

/// Retry ceilings for statement execution.
///
/// The defaults bound a worst-case stall at roughly 12 seconds
/// (120 iterations x 100 ms). Tests shorten the sleep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum busy-wait iterations, applied independently to the prepare
    /// and the row-stepping phase.
    pub busy_max: u32,
    /// Sleep between busy-wait iterations.
    pub busy_delay: Duration,
    /// Maximum full prepare-and-step reruns after a concurrent schema change.
    pub schema_max: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            busy_max: 120,
            busy_delay: Duration::from_millis(100),
            schema_max: 10,
        }
    }
}

/// Soft failure of a single query or insert.
///
/// These never end the session: the statement produced no usable data and
/// the caller moves on.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("gave up waiting for the database lock after {attempts} attempts")]
    Busy { attempts: u32 },

    #[error("schema changed {retries} times during execution, giving up")]
    SchemaDrift { retries: u32 },

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

/// Outcome of one prepare-and-step attempt, before schema-drift rerunning.
enum StatementError {
    Busy { attempts: u32 },
    Schema,
    Sql(rusqlite::Error),
}

/// A live handle onto the journal's working copy.
///
/// Exactly one connection per instance, closed exactly once when the store
/// is dropped or promoted. Instances are never shared across sync passes.
#[derive(Debug)]
pub struct JournalStore {
    conn: Connection,
    journal_path: PathBuf,
    sidecar_path: PathBuf,
    existed: bool,
    retry: RetryPolicy,
}

impl JournalStore {
    /// Load the journal at `path` with the default retry policy.
    ///
    /// # Errors
    ///
    /// Fails only when the sidecar copy cannot be created or opened.
    /// Corruption of the journal itself is self-healed, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_policy(path, RetryPolicy::default())
    }

    /// Load the journal with an explicit retry policy.
    ///
    /// # Errors
    ///
    /// Same conditions as [`JournalStore::load`].
    pub fn load_with_policy(path: &Path, retry: RetryPolicy) -> Result<Self> {
        check_or_recreate(path);

        let sidecar_path = sidecar_path_for(path);

        // Work on a copy so a crash mid-pass corrupts only the sidecar,
        // never the last-known-good journal.
        fs::copy(path, &sidecar_path).map_err(|source| Error::JournalCopy {
            path: path.to_path_buf(),
            source,
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&sidecar_path, fs::Permissions::from_mode(0o644)).map_err(
                |source| Error::JournalCopy {
                    path: path.to_path_buf(),
                    source,
                },
            )?;
        }

        let conn = Connection::open(&sidecar_path).map_err(|source| Error::JournalOpen {
            path: sidecar_path.clone(),
            source,
        })?;

        let mut store = Self {
            conn,
            journal_path: path.to_path_buf(),
            sidecar_path,
            existed: false,
            retry,
        };

        // A recreated journal has no tables, so the probe errors out on it
        // and the flag stays false. File presence alone proves nothing here.
        store.existed = match store.query(EXISTS_PROBE) {
            Ok(rows) => !rows.is_empty(),
            Err(_) => false,
        };

        if store.existed {
            debug!(journal = %store.journal_path.display(), "journal loaded");
        } else {
            info!(journal = %store.journal_path.display(), "journal does not exist");
        }

        Ok(store)
    }

    /// Whether the journal existed before this load.
    ///
    /// False for fresh journals and for corrupt ones that were discarded
    /// and recreated during the load.
    #[must_use]
    pub fn existed(&self) -> bool {
        self.existed
    }

    /// Path of the journal file this store was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.journal_path
    }

    /// Path of the working sidecar the live connection points at.
    #[must_use]
    pub fn working_path(&self) -> &Path {
        &self.sidecar_path
    }

    /// Create the journal tables on the working copy.
    ///
    /// Called by the session controller when [`JournalStore::existed`] is
    /// false; idempotent otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub fn ensure_schema(&self) -> Result<()> {
        schema::apply_schema(&self.conn).map_err(Error::from)
    }

    /// Run a row-producing statement, retrying through lock contention and
    /// concurrent schema changes.
    ///
    /// `Ok(vec![])` means the statement ran and matched nothing; `Err`
    /// means it produced no usable data after the retry budget ran out.
    ///
    /// # Errors
    ///
    /// [`QueryError`] after exhausting the busy or schema-drift budget, or
    /// on a hard SQL error.
    pub fn query(&self, statement: &str) -> std::result::Result<Vec<Row>, QueryError> {
        let mut schema_retries = 0u32;

        loop {
            match self.run_statement(statement, true) {
                Ok(rows) => return Ok(rows),
                Err(StatementError::Schema) => {
                    schema_retries += 1;
                    error!(statement, "schema changed during query");
                    if schema_retries >= self.retry.schema_max {
                        error!(statement, "schema retry budget exhausted, aborting statement");
                        return Err(QueryError::SchemaDrift {
                            retries: schema_retries,
                        });
                    }
                    debug!("retrying query after schema change");
                }
                Err(StatementError::Busy { attempts }) => {
                    return Err(QueryError::Busy { attempts });
                }
                Err(StatementError::Sql(e)) => {
                    warn!(statement, error = %e, "query failed");
                    return Err(QueryError::Sql(e));
                }
            }
        }
    }

    /// Run a write statement, retrying with the same policy as
    /// [`JournalStore::query`], and return the connection's last insert
    /// row id.
    ///
    /// An empty statement is a no-op returning 0 without touching the
    /// database. On exhausted retries this returns `Err` instead of a
    /// possibly-stale row id.
    ///
    /// # Errors
    ///
    /// Same conditions as [`JournalStore::query`].
    pub fn insert(&self, statement: &str) -> std::result::Result<i64, QueryError> {
        if statement.is_empty() {
            return Ok(0);
        }

        let mut schema_retries = 0u32;

        loop {
            match self.run_statement(statement, false) {
                Ok(_) => return Ok(self.conn.last_insert_rowid()),
                Err(StatementError::Schema) => {
                    schema_retries += 1;
                    error!(statement, "schema changed during insert");
                    if schema_retries >= self.retry.schema_max {
                        error!(statement, "schema retry budget exhausted, aborting statement");
                        return Err(QueryError::SchemaDrift {
                            retries: schema_retries,
                        });
                    }
                    debug!("retrying insert after schema change");
                }
                Err(StatementError::Busy { attempts }) => {
                    return Err(QueryError::Busy { attempts });
                }
                Err(StatementError::Sql(e)) => {
                    error!(statement, error = %e, "insert failed");
                    return Err(QueryError::Sql(e));
                }
            }
        }
    }

    /// Promote the working copy: close the connection and atomically rename
    /// the sidecar over the journal path.
    ///
    /// This completes the two-phase commit a load began. Skipping promotion
    /// (e.g. after a failed pass) leaves the previous journal untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails; the previous journal is still
    /// intact in that case.
    pub fn promote(self) -> Result<()> {
        let Self {
            conn,
            journal_path,
            sidecar_path,
            ..
        } = self;
        drop(conn);
        fs::rename(&sidecar_path, &journal_path)?;
        debug!(journal = %journal_path.display(), "journal promoted");
        Ok(())
    }

    /// One prepare-and-step attempt with independent busy budgets for the
    /// prepare and the stepping phase.
    fn run_statement(
        &self,
        statement: &str,
        collect: bool,
    ) -> std::result::Result<Vec<Row>, StatementError> {
        let mut stmt = self.prepare_with_busy_retry(statement)?;
        let column_count = stmt.column_count();
        let mut step_busy = 0u32;

        // A busy step re-runs the statement from scratch. Statements here
        // are single SELECTs or single writes, so the restart is
        // observationally equivalent to resuming the step.
        'restart: loop {
            let mut collected: Vec<Row> = Vec::new();
            let mut rows = stmt.query([]).map_err(classify)?;

            loop {
                match rows.next() {
                    Ok(Some(row)) => {
                        if collect {
                            let mut columns = Vec::with_capacity(column_count);
                            for i in 0..column_count {
                                columns.push(render_column(row.get_ref(i).map_err(classify)?));
                            }
                            collected.push(columns);
                        }
                    }
                    Ok(None) => return Ok(collected),
                    Err(e) if is_busy(&e) => {
                        step_busy += 1;
                        if step_busy > self.retry.busy_max {
                            error!("busy counter has reached its maximum, aborting statement");
                            return Err(StatementError::Busy {
                                attempts: step_busy,
                            });
                        }
                        std::thread::sleep(self.retry.busy_delay);
                        trace!(busy = step_busy, "step: database busy, retrying");
                        continue 'restart;
                    }
                    Err(e) => return Err(classify(e)),
                }
            }
        }
    }

    /// Compile a statement, sleeping and reattempting while the database
    /// is locked by someone else.
    fn prepare_with_busy_retry(
        &self,
        statement: &str,
    ) -> std::result::Result<rusqlite::Statement<'_>, StatementError> {
        let mut busy = 0u32;

        loop {
            if busy > 0 {
                std::thread::sleep(self.retry.busy_delay);
                debug!(busy, "prepare: database busy, retrying");
            }
            match self.conn.prepare(statement) {
                Ok(stmt) => return Ok(stmt),
                Err(e) if is_busy(&e) => {
                    busy += 1;
                    if busy > self.retry.busy_max {
                        error!("gave up waiting for the database lock to clear");
                        return Err(StatementError::Busy { attempts: busy });
                    }
                }
                Err(e) => return Err(classify(e)),
            }
        }
    }
}

/// Render one column value as text, the way untyped callers expect it.
fn render_column(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => v.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

fn classify(e: rusqlite::Error) -> StatementError {
    if is_schema_drift(&e) {
        StatementError::Schema
    } else {
        StatementError::Sql(e)
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::DatabaseBusy
                || f.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

fn is_schema_drift(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::SchemaChanged
    )
}

fn sidecar_path_for(journal: &Path) -> PathBuf {
    let mut name = journal.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(SIDECAR_SUFFIX);
    journal.with_file_name(name)
}

/// Validate the on-disk journal, discarding and recreating it when it is
/// unusable. Failures here are deliberately non-fatal: the sidecar copy
/// right after is what surfaces a genuinely unusable location.
fn check_or_recreate(path: &Path) {
    match validate_existing(path) {
        Validation::Valid => return,
        Validation::Missing => {}
        Validation::Corrupt(reason) => {
            warn!(journal = %path.display(), reason, "journal unusable, removing");
            if let Err(e) = fs::remove_file(path) {
                warn!(journal = %path.display(), error = %e, "could not remove corrupt journal");
            }
        }
    }

    match Connection::open(path) {
        Ok(conn) => drop(conn),
        Err(e) => warn!(journal = %path.display(), error = %e, "could not create fresh journal"),
    }
}

enum Validation {
    Valid,
    Missing,
    Corrupt(&'static str),
}

fn validate_existing(path: &Path) -> Validation {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return Validation::Missing,
    };

    let mut header = [0u8; 16];
    let n = match file.read(&mut header) {
        Ok(n) => n,
        Err(_) => return Validation::Corrupt("unreadable header"),
    };
    drop(file);

    if n == 0 {
        return Validation::Corrupt("empty file");
    }
    if n < FORMAT_MAGIC.len() || &header[..FORMAT_MAGIC.len()] != FORMAT_MAGIC {
        return Validation::Corrupt("format magic mismatch");
    }

    // Magic looked right; make sure the database actually opens.
    match Connection::open(path) {
        Ok(conn) => {
            let probe: rusqlite::Result<i64> =
                conn.query_row("PRAGMA schema_version", [], |row| row.get(0));
            match probe {
                Ok(_) => Validation::Valid,
                Err(_) => Validation::Corrupt("database corrupted"),
            }
        }
        Err(_) => Validation::Corrupt("database corrupted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn journal_path(dir: &TempDir) -> PathBuf {
        dir.path().join(".dirsync_journal.db")
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            busy_max: 5,
            busy_delay: Duration::from_millis(1),
            schema_max: 10,
        }
    }

    /// Build a journal on disk that has the schema and one row.
    fn seeded_journal(dir: &TempDir) -> PathBuf {
        let path = journal_path(dir);
        let store = JournalStore::load(&path).unwrap();
        store.ensure_schema().unwrap();
        store
            .insert("INSERT INTO metadata (key, path, modtime) VALUES (1, 'a.txt', 100)")
            .unwrap();
        store.promote().unwrap();
        path
    }

    #[test]
    fn fresh_journal_reports_not_existing() {
        let dir = TempDir::new().unwrap();
        let path = journal_path(&dir);

        let store = JournalStore::load(&path).unwrap();
        assert!(!store.existed());
        assert!(store.working_path().exists());
    }

    #[test]
    fn idempotent_load() {
        let dir = TempDir::new().unwrap();
        let path = seeded_journal(&dir);

        let first = JournalStore::load(&path).unwrap();
        assert!(first.existed());
        let rows_first = first.query("SELECT key, path FROM metadata ORDER BY key").unwrap();
        drop(first);

        let second = JournalStore::load(&path).unwrap();
        assert!(second.existed());
        let rows_second = second.query("SELECT key, path FROM metadata ORDER BY key").unwrap();

        assert_eq!(rows_first, rows_second);
        assert_eq!(rows_first, vec![vec!["1".to_string(), "a.txt".to_string()]]);
    }

    #[test]
    fn corruption_recovery() {
        let dir = TempDir::new().unwrap();
        let path = journal_path(&dir);
        let garbage = b"this is not a database at all, not even close";
        fs::write(&path, garbage).unwrap();

        let store = JournalStore::load(&path).unwrap();
        assert!(!store.existed());

        // The corrupt bytes are gone from the journal path.
        let on_disk = fs::read(&path).unwrap();
        assert_ne!(on_disk.as_slice(), garbage.as_slice());
    }

    #[test]
    fn empty_file_is_recovered() {
        let dir = TempDir::new().unwrap();
        let path = journal_path(&dir);
        fs::write(&path, b"").unwrap();

        let store = JournalStore::load(&path).unwrap();
        assert!(!store.existed());
    }

    #[test]
    fn sidecar_isolation() {
        let dir = TempDir::new().unwrap();
        let path = seeded_journal(&dir);
        let before = fs::read(&path).unwrap();

        let store = JournalStore::load(&path).unwrap();
        store
            .insert("INSERT INTO metadata (key, path, modtime) VALUES (2, 'b.txt', 200)")
            .unwrap();

        // The original journal is byte-identical until promotion.
        assert_eq!(fs::read(&path).unwrap(), before);

        store.promote().unwrap();
        assert_ne!(fs::read(&path).unwrap(), before);

        let reloaded = JournalStore::load(&path).unwrap();
        let rows = reloaded.query("SELECT key FROM metadata ORDER BY key").unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn busy_retry_is_bounded() {
        let dir = TempDir::new().unwrap();
        let path = seeded_journal(&dir);

        let store = JournalStore::load_with_policy(&path, fast_policy()).unwrap();

        // Hold an exclusive lock on the working copy from a second
        // connection so every step returns busy.
        let blocker = Connection::open(store.working_path()).unwrap();
        blocker.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let result = store.query("SELECT key FROM metadata");
        match result {
            Err(QueryError::Busy { attempts }) => assert!(attempts <= 6),
            other => panic!("expected busy failure, got {other:?}"),
        }

        let result = store.insert("INSERT INTO metadata (key, path) VALUES (9, 'c.txt')");
        assert!(matches!(result, Err(QueryError::Busy { .. })));
    }

    #[test]
    fn empty_insert_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let store = JournalStore::load(&journal_path(&dir)).unwrap();
        assert_eq!(store.insert("").unwrap(), 0);
    }

    #[test]
    fn insert_returns_last_row_id() {
        let dir = TempDir::new().unwrap();
        let store = JournalStore::load(&journal_path(&dir)).unwrap();
        store.ensure_schema().unwrap();

        let id = store
            .insert("INSERT INTO metadata (key, path, modtime) VALUES (7, 'x.txt', 1)")
            .unwrap();
        assert_eq!(id, 7);
    }

    #[test]
    fn query_failure_is_soft() {
        let dir = TempDir::new().unwrap();
        let store = JournalStore::load(&journal_path(&dir)).unwrap();

        let result = store.query("SELECT nothing FROM nowhere");
        assert!(matches!(result, Err(QueryError::Sql(_))));
    }

    #[test]
    fn null_columns_render_as_empty_text() {
        let dir = TempDir::new().unwrap();
        let store = JournalStore::load(&journal_path(&dir)).unwrap();
        store.ensure_schema().unwrap();
        store
            .insert("INSERT INTO metadata (key, path) VALUES (1, 'a.txt')")
            .unwrap();

        let rows = store.query("SELECT path, inode, modtime FROM metadata").unwrap();
        assert_eq!(rows, vec![vec!["a.txt".to_string(), String::new(), String::new()]]);
    }
}
