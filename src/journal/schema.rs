//! Journal schema definition.
//!
//! The schema is embedded at compile time and applied on demand, never at
//! load: a freshly recovered journal must stay table-less so the existence
//! probe in [`super::store`] reports it as new.

use rusqlite::Connection;

/// DDL for the `metadata` table.
///
/// Rows are keyed by an opaque integer synchronization key; all other
/// columns describe the local file the key stands for. Statements are
/// idempotent so re-applying on an already-populated journal is safe.
pub const METADATA_DDL: &str = "
CREATE TABLE IF NOT EXISTS metadata (
    key INTEGER PRIMARY KEY,
    path TEXT NOT NULL,
    inode INTEGER,
    mode INTEGER,
    modtime INTEGER,
    type INTEGER,
    size INTEGER
);
CREATE INDEX IF NOT EXISTS metadata_path_idx ON metadata (path);
";

/// Apply the journal schema to a connection.
///
/// # Errors
///
/// Returns an error if the DDL fails to execute.
pub fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(METADATA_DDL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_applies_to_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("schema should apply");

        let count: i64 = conn
            .query_row("SELECT COUNT(key) FROM metadata", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("first apply should succeed");
        apply_schema(&conn).expect("second apply should succeed");
    }
}
