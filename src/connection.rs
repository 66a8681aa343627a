//! Store adapter: fresh short-lived connections against a single SQLite file.
//!
//! Adapted from a pooled (`r2d2`) connection style to a fresh-connection-
//! per-operation discipline: every public `LiteQueue` method opens its own
//! [`rusqlite::Connection`], executes, and lets it close. No connection is
//! ever shared across threads, so the store's thread-affinity rules are
//! trivially satisfied.

use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Sentinel rejected by [`crate::LiteQueue::open`]; every feature of this
/// engine depends on crash-durable, multi-connection-visible storage.
pub const IN_MEMORY_SENTINEL: &str = ":memory:";

/// Open a fresh connection to `path`, applying the durability pragmas the
/// engine relies on: write-ahead logging (so readers don't block writers),
/// `synchronous = NORMAL` (fsync on checkpoint, not per commit — a
/// deliberate throughput/durability trade for a local job queue), and a
/// busy timeout matching `lock_timeout` so contended writers block up to
/// that long before reporting [`Error::LockTimeout`].
pub(crate) fn open_conn(path: &Path, lock_timeout: Duration) -> Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(lock_timeout)?;
    Ok(conn)
}

/// Idempotent schema creation for the `messages` and `dlq` tables, plus the
/// covering index over `(queue_name, visible_after, created_at)` that keeps
/// `pop`'s candidate selection sub-linear.
pub(crate) fn ensure_schema(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id            TEXT PRIMARY KEY,
            queue_name    TEXT NOT NULL DEFAULT 'default',
            data          BLOB NOT NULL,
            visible_after INTEGER NOT NULL,
            retry_count   INTEGER NOT NULL DEFAULT 0,
            created_at    INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pop
            ON messages (queue_name, visible_after, created_at);

        CREATE TABLE IF NOT EXISTS dlq (
            id         TEXT PRIMARY KEY,
            queue_name TEXT NOT NULL,
            data       BLOB NOT NULL,
            failed_at  INTEGER NOT NULL,
            reason     TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Reject the in-memory sentinel path: an in-memory SQLite database is
/// invisible to any other connection, which defeats every multi-consumer
/// guarantee this engine makes.
pub(crate) fn reject_in_memory(path: &Path) -> Result<()> {
    if path.as_os_str() == IN_MEMORY_SENTINEL {
        return Err(Error::InMemoryUnsupported);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_in_memory_sentinel() {
        let err = reject_in_memory(Path::new(":memory:")).unwrap_err();
        assert!(matches!(err, Error::InMemoryUnsupported));
    }

    #[test]
    fn accepts_file_path() {
        assert!(reject_in_memory(Path::new("queue.db")).is_ok());
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.db");
        let conn = open_conn(&path, Duration::from_secs(1)).unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('messages', 'dlq')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn pragmas_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.db");
        let conn = open_conn(&path, Duration::from_secs(1)).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
