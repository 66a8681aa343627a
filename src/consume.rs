//! Scoped consumption: the `process()`/`consume()` idiom from the original
//! implementation, reworked as a closure-taking method plus an optional RAII
//! guard for callers that want to hold a message across several statements
//! instead of inside one closure.

use tracing::{instrument, warn};

use crate::config::ConsumeOptions;
use crate::engine::LiteQueue;
use crate::error::{Error, Result};
use crate::message::Message;

impl LiteQueue {
    /// Pop a message, run `f` against it, and ack on success or nack on
    /// failure. Returns `Ok(None)` if no message was available within
    /// `opts.wait_seconds`.
    ///
    /// This is the direct analogue of the original's `process()` context
    /// manager: the body runs with the message already leased, and the
    /// ack/nack bookkeeping happens regardless of how `f` returns.
    #[instrument(skip(self, f))]
    pub fn consume<T, E, F>(&self, opts: ConsumeOptions, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&Message) -> std::result::Result<T, E>,
        E: std::fmt::Display,
    {
        let pop_opts = opts.into();
        let Some(message) = self.pop(&pop_opts)? else {
            return Ok(None);
        };

        match f(&message) {
            Ok(value) => {
                self.ack(&message.id)?;
                Ok(Some(value))
            },
            Err(err) => {
                let reason = err.to_string();
                if let Err(nack_err) = self.nack(&message, &reason) {
                    warn!(id = %message.id, error = %nack_err, "failed to nack message after consumer error");
                }
                Err(Error::Consumer(reason))
            },
        }
    }

    /// Pop a message and hand back a [`Lease`] instead of running a closure
    /// against it. Useful when the ack/nack decision depends on state that
    /// spans multiple statements, or on an external call that isn't easily
    /// expressed as one `FnOnce`.
    pub fn begin(&self, opts: ConsumeOptions) -> Result<Option<Lease>> {
        let pop_opts = opts.into();
        let message = self.pop(&pop_opts)?;
        Ok(message.map(|message| Lease {
            message,
            queue: self.clone(),
            done: false,
        }))
    }
}

/// A message leased from the queue, waiting to be acked or nacked.
///
/// Dropping a `Lease` without calling either does *not* nack it — the
/// message simply remains invisible until its lease (`invisible_seconds`
/// from the originating `pop`/`consume` call) expires on its own, at which
/// point it becomes eligible for redelivery again. A warning is logged so
/// the omission isn't silent.
#[derive(Debug)]
#[must_use = "a Lease should be ack'd or nack'd; dropping it silently waits out the visibility lease"]
pub struct Lease {
    message: Message,
    queue: LiteQueue,
    done: bool,
}

impl Lease {
    /// The leased message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Delete the message: processing succeeded.
    pub fn ack(mut self) -> Result<()> {
        self.done = true;
        self.queue.ack(&self.message.id)
    }

    /// Report a failed delivery attempt, per [`LiteQueue::nack`].
    pub fn nack(mut self, reason: &str) -> Result<()> {
        self.done = true;
        self.queue.nack(&self.message, reason)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.done {
            warn!(
                id = %self.message.id,
                "lease dropped without ack/nack; message reappears once its visibility lease expires"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PutOptions;
    use tempfile::tempdir;

    fn open_queue() -> (tempfile::TempDir, LiteQueue) {
        let dir = tempdir().unwrap();
        let queue = LiteQueue::open_default(dir.path().join("q.db")).unwrap();
        (dir, queue)
    }

    #[test]
    fn consume_acks_on_success() {
        let (_dir, q) = open_queue();
        q.put(b"hello", &PutOptions::default()).unwrap();

        let result: Option<usize> = q
            .consume(ConsumeOptions::default(), |msg| {
                Ok::<_, std::convert::Infallible>(msg.data.len())
            })
            .unwrap();

        assert_eq!(result, Some(5));
        assert!(q.empty("default").unwrap());
    }

    #[test]
    fn consume_nacks_on_failure() {
        let (_dir, q) = open_queue();
        q.put(b"hello", &PutOptions::default()).unwrap();

        let result = q.consume(ConsumeOptions::default(), |_msg| Err::<(), _>("boom"));

        assert!(result.is_err());
        // Message was nacked, not deleted: still present (leased).
        assert_eq!(q.qsize("default").unwrap(), 1);
    }

    #[test]
    fn consume_returns_none_when_queue_empty() {
        let (_dir, q) = open_queue();
        let result: Result<Option<()>> =
            q.consume(ConsumeOptions::default(), |_msg| Ok::<_, std::convert::Infallible>(()));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn lease_ack_deletes_message() {
        let (_dir, q) = open_queue();
        q.put(b"x", &PutOptions::default()).unwrap();

        let lease = q.begin(ConsumeOptions::default()).unwrap().unwrap();
        assert_eq!(lease.message().data, b"x");
        lease.ack().unwrap();

        assert!(q.empty("default").unwrap());
    }

    #[test]
    fn lease_nack_keeps_message_leased() {
        let (_dir, q) = open_queue();
        q.put(b"x", &PutOptions::default()).unwrap();

        let lease = q.begin(ConsumeOptions::default()).unwrap().unwrap();
        lease.nack("handler error").unwrap();

        assert_eq!(q.qsize("default").unwrap(), 1);
    }
}
