//! The queue engine: [`LiteQueue`] and its transactional dequeue protocol.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rusqlite::{OptionalExtension as _, TransactionBehavior, params};
use tracing::{debug, info, instrument, warn};

use crate::config::{PopOptions, PutOptions, QueueConfig};
use crate::connection::{ensure_schema, open_conn, reject_in_memory};
use crate::error::{Error, Result, classify, is_busy, is_constraint_violation, reclassify};
use crate::ids;
use crate::message::{DeadLetterMessage, Message, row_to_dead_letter, row_to_message};
use crate::notify::Notifier;

/// Upper bound on the number of payloads accepted by [`LiteQueue::put_batch`]
/// in one call.
pub const MAX_BATCH_SIZE: usize = 50;

const ID_CONFLICT_RETRIES: u32 = 5;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An embedded, durable, multi-consumer message queue backed by a single
/// SQLite file.
///
/// Cheap to clone and safe to share across threads: a `LiteQueue` holds no
/// connection of its own — every operation opens a fresh one — only the
/// file path, the engine configuration, and a local same-process wakeup
/// notifier used to avoid busy-polling when multiple handles share a
/// process. Multiple independent handles may be opened against the same
/// file, including from other processes, subject to the backing store's
/// file-locking discipline.
#[derive(Debug, Clone)]
pub struct LiteQueue {
    path: Arc<PathBuf>,
    config: QueueConfig,
    notifier: Arc<Notifier>,
}

enum DequeueOutcome {
    Empty,
    Promoted,
    Delivered(Message),
}

impl LiteQueue {
    /// Open (creating if absent) the queue file at `path` with default
    /// configuration (`max_retries = 5`, `lock_timeout = 5s`).
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, QueueConfig::default())
    }

    /// Open (creating if absent) the queue file at `path`. Applies schema
    /// creation and durability pragmas. Rejects the `:memory:` sentinel,
    /// since every feature here depends on a real file other connections
    /// can see.
    pub fn open(path: impl AsRef<Path>, config: QueueConfig) -> Result<Self> {
        let path = path.as_ref();
        reject_in_memory(path)?;

        let conn = open_conn(path, config.lock_timeout)?;
        ensure_schema(&conn)?;

        info!(path = %path.display(), max_retries = config.max_retries, "queue opened");

        Ok(Self {
            path: Arc::new(path.to_path_buf()),
            config,
            notifier: Arc::new(Notifier::new()),
        })
    }

    /// Enqueue a single payload. Returns the assigned message ID.
    ///
    /// `data` is expected to be non-empty; the engine does not enforce this
    /// at runtime, matching the original implementation — an empty payload
    /// is accepted and delivered back unchanged.
    #[instrument(skip(self, data), fields(queue = %opts.queue_name))]
    pub fn put(&self, data: &[u8], opts: &PutOptions) -> Result<String> {
        let now = now_secs();
        let visible_after = now + opts.visible_after_seconds;
        let conn = open_conn(&self.path, self.config.lock_timeout).map_err(reclassify)?;

        for attempt in 1..=ID_CONFLICT_RETRIES {
            let id = ids::generate();
            let result = conn.execute(
                "INSERT INTO messages (id, queue_name, data, visible_after, retry_count, created_at) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![id, opts.queue_name, data, visible_after, now],
            );

            match result {
                Ok(_) => {
                    self.notifier.notify_all();
                    debug!(id = %id, "message enqueued");
                    return Ok(id);
                },
                Err(e) if is_constraint_violation(&e) => {
                    warn!(attempt, "id collision on enqueue, retrying");
                    std::thread::sleep(Duration::from_millis(5));
                },
                Err(e) => return Err(classify(e)),
            }
        }

        Err(Error::Conflict {
            attempts: ID_CONFLICT_RETRIES,
        })
    }

    /// Enqueue up to [`MAX_BATCH_SIZE`] payloads in a single transaction.
    /// Optimization over repeated [`LiteQueue::put`] calls; the one-at-a-
    /// time API remains the contract.
    ///
    /// # Panics
    ///
    /// Panics if `items.len() > MAX_BATCH_SIZE`; this is a caller
    /// programming error, not a runtime condition.
    #[instrument(skip(self, items), fields(queue = %opts.queue_name, count = items.len()))]
    pub fn put_batch(&self, items: &[&[u8]], opts: &PutOptions) -> Result<Vec<String>> {
        assert!(
            items.len() <= MAX_BATCH_SIZE,
            "put_batch accepts at most {MAX_BATCH_SIZE} payloads, got {}",
            items.len()
        );

        let now = now_secs();
        let visible_after = now + opts.visible_after_seconds;
        let mut conn = open_conn(&self.path, self.config.lock_timeout).map_err(reclassify)?;

        for attempt in 1..=ID_CONFLICT_RETRIES {
            let tx = conn.transaction().map_err(classify)?;
            let ids: Vec<String> = items.iter().map(|_| ids::generate()).collect();
            let mut conflicted = false;

            for (id, data) in ids.iter().zip(items.iter()) {
                let result = tx.execute(
                    "INSERT INTO messages (id, queue_name, data, visible_after, retry_count, created_at) \
                     VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                    params![id, opts.queue_name, data, visible_after, now],
                );
                if let Err(e) = result {
                    if is_constraint_violation(&e) {
                        conflicted = true;
                        break;
                    }
                    return Err(classify(e));
                }
            }

            if conflicted {
                tx.rollback().map_err(classify)?;
                warn!(attempt, "id collision during batch enqueue, retrying whole batch");
                std::thread::sleep(Duration::from_millis(5));
                continue;
            }

            tx.commit().map_err(classify)?;
            self.notifier.notify_all();
            debug!(count = ids.len(), "batch enqueued");
            return Ok(ids);
        }

        Err(Error::Conflict {
            attempts: ID_CONFLICT_RETRIES,
        })
    }

    /// Dequeue the next eligible message. Blocks for up to
    /// `opts.wait_seconds` if nothing is immediately available.
    #[instrument(skip(self), fields(queue = %opts.queue_name))]
    pub fn pop(&self, opts: &PopOptions) -> Result<Option<Message>> {
        self.poll_until(opts.wait_seconds, || self.try_pop(opts))
    }

    /// One non-blocking attempt at the dequeue transaction, looping
    /// in-process through DLQ promotions until a message is delivered or
    /// the queue is genuinely empty.
    fn try_pop(&self, opts: &PopOptions) -> Result<Option<Message>> {
        let mut conn = open_conn(&self.path, self.config.lock_timeout)?;
        loop {
            match self.dequeue_attempt(&mut conn, opts) {
                Ok(DequeueOutcome::Empty) => return Ok(None),
                Ok(DequeueOutcome::Promoted) => continue,
                Ok(DequeueOutcome::Delivered(msg)) => return Ok(Some(msg)),
                // Lock acquisition timed out: report "try again" by
                // surfacing as empty for this attempt, rather than as
                // Error::LockTimeout — the caller's poll loop (or the next
                // call to pop) will retry without this ever blocking the
                // current transaction.
                Err(Error::Store(e)) if is_busy(&e) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    fn dequeue_attempt(
        &self,
        conn: &mut rusqlite::Connection,
        opts: &PopOptions,
    ) -> Result<DequeueOutcome> {
        let now = now_secs();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidate = tx
            .query_row(
                "SELECT id, queue_name, data, visible_after, retry_count, created_at \
                 FROM messages \
                 WHERE queue_name = ?1 AND visible_after <= ?2 \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1",
                params![opts.queue_name, now],
                row_to_message,
            )
            .optional()?;

        let Some(msg) = candidate else {
            tx.rollback()?;
            return Ok(DequeueOutcome::Empty);
        };

        if msg.retry_count + 1 > self.config.max_retries {
            tx.execute(
                "INSERT INTO dlq (id, queue_name, data, failed_at, reason) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    msg.id,
                    msg.queue_name,
                    msg.data,
                    now,
                    "Max retries exceeded during pop"
                ],
            )?;
            tx.execute("DELETE FROM messages WHERE id = ?1", params![msg.id])?;
            tx.commit()?;
            warn!(id = %msg.id, queue = %opts.queue_name, "message promoted to dead-letter queue");
            return Ok(DequeueOutcome::Promoted);
        }

        tx.execute(
            "UPDATE messages SET visible_after = ?1, retry_count = retry_count + 1 WHERE id = ?2",
            params![now + opts.invisible_seconds, msg.id],
        )?;
        tx.commit()?;
        Ok(DequeueOutcome::Delivered(msg))
    }

    /// Return the message [`LiteQueue::pop`] would take, without mutating
    /// state. A non-transactional snapshot read, so it never competes with
    /// `pop`'s write lock.
    pub fn peek(&self, queue_name: &str) -> Result<Option<Message>> {
        let now = now_secs();
        let conn = open_conn(&self.path, self.config.lock_timeout).map_err(reclassify)?;
        let msg = conn
            .query_row(
                "SELECT id, queue_name, data, visible_after, retry_count, created_at \
                 FROM messages \
                 WHERE queue_name = ?1 AND visible_after <= ?2 \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1",
                params![queue_name, now],
                row_to_message,
            )
            .optional()
            .map_err(classify)?;
        Ok(msg)
    }

    /// Unconditionally delete the message with the given ID. Idempotent.
    pub fn ack(&self, id: &str) -> Result<()> {
        let conn = open_conn(&self.path, self.config.lock_timeout).map_err(reclassify)?;
        conn.execute("DELETE FROM messages WHERE id = ?1", params![id])
            .map_err(classify)?;
        Ok(())
    }

    /// Report a failed delivery attempt. Promotes to the DLQ if the retry
    /// budget is exhausted, otherwise increments `retry_count` without
    /// resetting `visible_after` — the lease already granted at `pop` acts
    /// as a one-lease-length backoff.
    #[instrument(skip(self, message), fields(id = %message.id, queue = %message.queue_name))]
    pub fn nack(&self, message: &Message, reason: &str) -> Result<()> {
        let now = now_secs();
        let new_retry_count = message.retry_count + 1;
        let mut conn = open_conn(&self.path, self.config.lock_timeout).map_err(reclassify)?;

        if new_retry_count > self.config.max_retries {
            let tx = conn.transaction().map_err(classify)?;
            tx.execute(
                "INSERT INTO dlq (id, queue_name, data, failed_at, reason) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![message.id, message.queue_name, message.data, now, reason],
            )
            .map_err(classify)?;
            tx.execute("DELETE FROM messages WHERE id = ?1", params![message.id])
                .map_err(classify)?;
            tx.commit().map_err(classify)?;
            warn!(reason = %reason, "message promoted to dead-letter queue after explicit nack");
        } else {
            conn.execute(
                "UPDATE messages SET retry_count = ?1 WHERE id = ?2",
                params![new_retry_count, message.id],
            )
            .map_err(classify)?;
            debug!(retry_count = new_retry_count, "message nacked, will become visible again after its current lease");
        }

        Ok(())
    }

    /// Row count in `messages` for `queue_name`, including currently-leased
    /// (invisible) rows.
    pub fn qsize(&self, queue_name: &str) -> Result<u64> {
        let conn = open_conn(&self.path, self.config.lock_timeout).map_err(reclassify)?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE queue_name = ?1",
                params![queue_name],
                |row| row.get(0),
            )
            .map_err(classify)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// `qsize(queue_name) == 0`.
    pub fn empty(&self, queue_name: &str) -> Result<bool> {
        Ok(self.qsize(queue_name)? == 0)
    }

    /// Row count in `dlq` for `queue_name`.
    pub fn dlq_size(&self, queue_name: &str) -> Result<u64> {
        let conn = open_conn(&self.path, self.config.lock_timeout).map_err(reclassify)?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM dlq WHERE queue_name = ?1",
                params![queue_name],
                |row| row.get(0),
            )
            .map_err(classify)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Dead-lettered messages for `queue_name`, most recently failed first.
    /// Inspection only — use [`LiteQueue::redrive`] to requeue them.
    pub fn list_dlq(&self, queue_name: &str, limit: u32) -> Result<Vec<DeadLetterMessage>> {
        let conn = open_conn(&self.path, self.config.lock_timeout).map_err(reclassify)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, queue_name, data, failed_at, reason FROM dlq \
                 WHERE queue_name = ?1 ORDER BY failed_at DESC LIMIT ?2",
            )
            .map_err(classify)?;
        let rows = stmt
            .query_map(params![queue_name, limit], row_to_dead_letter)
            .map_err(classify)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(classify)?;
        Ok(rows)
    }

    /// Block until `empty(queue_name)` is true. No fairness guarantee
    /// beyond the store's.
    pub fn join(&self, queue_name: &str) -> Result<()> {
        loop {
            if self.empty(queue_name)? {
                return Ok(());
            }
            self.notifier.wait_timeout(POLL_INTERVAL);
        }
    }

    /// Delete all rows for `queue_name` from `messages`, and, if
    /// `include_dlq` is set, from `dlq` too. One transaction.
    pub fn clear(&self, queue_name: &str, include_dlq: bool) -> Result<()> {
        let mut conn = open_conn(&self.path, self.config.lock_timeout).map_err(reclassify)?;
        let tx = conn.transaction().map_err(classify)?;
        tx.execute("DELETE FROM messages WHERE queue_name = ?1", params![queue_name])
            .map_err(classify)?;
        if include_dlq {
            tx.execute("DELETE FROM dlq WHERE queue_name = ?1", params![queue_name])
                .map_err(classify)?;
        }
        tx.commit().map_err(classify)?;
        Ok(())
    }

    /// Move every `dlq` row for `queue_name` back into `messages`, with
    /// `retry_count` reset to `0` and `visible_after`/`created_at` set to
    /// now. Message IDs are preserved. Returns the number of rows moved.
    #[instrument(skip(self), fields(queue = %queue_name))]
    pub fn redrive(&self, queue_name: &str) -> Result<u64> {
        let now = now_secs();
        let mut conn = open_conn(&self.path, self.config.lock_timeout).map_err(reclassify)?;
        let tx = conn.transaction().map_err(classify)?;

        let rows: Vec<(String, Vec<u8>)> = {
            let mut stmt = tx
                .prepare("SELECT id, data FROM dlq WHERE queue_name = ?1")
                .map_err(classify)?;
            stmt.query_map(params![queue_name], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(classify)?
                .collect::<rusqlite::Result<_>>()
                .map_err(classify)?
        };

        for (id, data) in &rows {
            tx.execute(
                "INSERT INTO messages (id, queue_name, data, visible_after, retry_count, created_at) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![id, queue_name, data, now, now],
            )
            .map_err(classify)?;
        }
        tx.execute("DELETE FROM dlq WHERE queue_name = ?1", params![queue_name])
            .map_err(classify)?;
        tx.commit().map_err(classify)?;

        if !rows.is_empty() {
            self.notifier.notify_all();
            info!(count = rows.len(), "redrive moved dead-lettered messages back to the live queue");
        }

        Ok(rows.len() as u64)
    }

    /// Shared poll loop backing `pop`'s `wait_seconds` blocking wait. Also
    /// used by [`crate::consume`] through `pop`.
    fn poll_until<T>(
        &self,
        wait_seconds: u64,
        mut attempt: impl FnMut() -> Result<Option<T>>,
    ) -> Result<Option<T>> {
        let deadline = Instant::now() + Duration::from_secs(wait_seconds);
        loop {
            if let Some(value) = attempt()? {
                return Ok(Some(value));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.notifier.wait_timeout((deadline - now).min(POLL_INTERVAL));
        }
    }

}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
