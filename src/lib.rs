//! `litequeue`: an embedded, durable, multi-consumer message queue backed by
//! a single local SQLite file.
//!
//! No broker, no network hop, no server process — any number of threads or
//! OS processes that can open the same file can produce and consume from
//! it. Delivery is at-least-once: a popped message is leased for a caller-
//! chosen duration, and reappears automatically if never acked. Messages
//! that exceed their retry budget are moved to a per-queue dead-letter
//! sidetrack instead of cycling forever.
//!
//! ```no_run
//! use litequeue::{LiteQueue, PutOptions, PopOptions};
//!
//! # fn main() -> litequeue::Result<()> {
//! let queue = LiteQueue::open_default("jobs.db")?;
//! queue.put(b"do the thing", &PutOptions::default())?;
//!
//! if let Some(message) = queue.pop(&PopOptions::default())? {
//!     // ... handle message.data ...
//!     queue.ack(&message.id)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! See [`LiteQueue::consume`] for the scoped ack/nack idiom, and
//! [`LiteQueue::begin`] for a [`Lease`]-based alternative when the handling
//! logic doesn't fit neatly in one closure.

#![forbid(unsafe_code)]

mod config;
mod connection;
mod consume;
mod engine;
mod error;
mod ids;
mod message;
mod notify;

pub use config::{ConsumeOptions, PopOptions, PutOptions, QueueConfig};
pub use consume::Lease;
pub use engine::{LiteQueue, MAX_BATCH_SIZE};
pub use error::{Error, Result};
pub use message::{DeadLetterMessage, Message};
