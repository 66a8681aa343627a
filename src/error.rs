//! Error types for the queue engine.

use thiserror::Error;

/// Errors that can occur while operating a [`crate::LiteQueue`].
#[derive(Debug, Error)]
pub enum Error {
    /// The backing store reported a failure (I/O error, disk full, corruption,
    /// constraint violation). Rolled back and propagated as-is.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Primary-key collision on enqueue survived the bounded retry budget.
    /// Astronomically unlikely given the ID scheme in [`crate::ids`]; surfaced
    /// rather than retried forever.
    #[error("id conflict after {attempts} attempt(s)")]
    Conflict {
        /// Number of insert attempts made before giving up.
        attempts: u32,
    },

    /// Could not acquire the store's write lock within the configured
    /// timeout. `pop` treats this as "try again" and handles it internally,
    /// only surfacing it once the overall wait budget is exhausted; every
    /// other operation surfaces it directly to the caller.
    #[error("timed out waiting for the store's write lock")]
    LockTimeout,

    /// The closure passed to [`crate::LiteQueue::consume`] returned an error.
    /// The message has already been nacked by the time this is returned.
    #[error("consumer failed: {0}")]
    Consumer(String),

    /// `open` was asked to use the in-memory sentinel path. Every feature of
    /// this engine depends on crash-durable, multi-connection-visible
    /// storage, so this is rejected outright.
    #[error("in-memory databases are not supported; pass a file path")]
    InMemoryUnsupported,
}

/// Convenience alias for the engine's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classify a raw `rusqlite` error as a lock-acquisition timeout ("database
/// is locked"/"database is busy") versus any other store failure.
pub(crate) fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::DatabaseBusy | rusqlite::ffi::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

/// Classify a raw `rusqlite` error as a primary-key/unique constraint
/// violation, the signal [`crate::LiteQueue::put`] retries on.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::ConstraintViolation,
                ..
            },
            _,
        )
    )
}

/// Map a raw `rusqlite` error into the public [`Error`] type, surfacing a
/// busy/locked store as [`Error::LockTimeout`] rather than the catch-all
/// [`Error::Store`]. Used by every operation outside `pop`'s own dequeue
/// loop, which classifies busy errors itself to decide whether to retry
/// internally.
pub(crate) fn classify(err: rusqlite::Error) -> Error {
    if is_busy(&err) {
        Error::LockTimeout
    } else {
        Error::Store(err)
    }
}

/// Reclassify an already-converted [`Error`], promoting a busy/locked
/// [`Error::Store`] to [`Error::LockTimeout`]. Covers call sites that go
/// through a helper returning `Result<T>` directly (e.g. [`crate::connection::open_conn`])
/// rather than a raw `rusqlite::Error` that [`classify`] can consume.
pub(crate) fn reclassify(err: Error) -> Error {
    match err {
        Error::Store(e) if is_busy(&e) => Error::LockTimeout,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_display_includes_attempts() {
        let err = Error::Conflict { attempts: 3 };
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn consumer_display_includes_message() {
        let err = Error::Consumer("boom".to_string());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn store_error_wraps_rusqlite() {
        let inner = rusqlite::Error::InvalidQuery;
        let err: Error = inner.into();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn classify_maps_busy_to_lock_timeout() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::DatabaseBusy,
                extended_code: 0,
            },
            None,
        );
        assert!(matches!(classify(busy), Error::LockTimeout));
    }

    #[test]
    fn classify_maps_other_errors_to_store() {
        assert!(matches!(classify(rusqlite::Error::InvalidQuery), Error::Store(_)));
    }
}
