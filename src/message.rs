//! Message types returned by the queue engine.

use serde::{Deserialize, Serialize};

/// A message dequeued (or peeked) from the live queue.
///
/// `retry_count` reflects the number of *prior* delivery attempts: `0` on
/// first delivery, incremented on every subsequent lease grant — the
/// pre-update view is what's returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Time-ordered unique message ID.
    pub id: String,
    /// Logical queue this message belongs to.
    pub queue_name: String,
    /// Opaque payload, preserved byte-for-byte.
    pub data: Vec<u8>,
    /// Number of prior delivery attempts.
    pub retry_count: u32,
    /// Seconds-since-epoch the message was originally enqueued.
    pub created_at: i64,
}

/// A message that has been promoted to the dead-letter sidetrack after
/// exhausting `max_retries`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterMessage {
    /// ID preserved from the originating message.
    pub id: String,
    /// Logical queue the message originated from.
    pub queue_name: String,
    /// Opaque payload, preserved byte-for-byte.
    pub data: Vec<u8>,
    /// Seconds-since-epoch the message was promoted to the DLQ.
    pub failed_at: i64,
    /// Human-readable reason for the promotion.
    pub reason: String,
}

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get("id")?,
        queue_name: row.get("queue_name")?,
        data: row.get("data")?,
        retry_count: row.get("retry_count")?,
        created_at: row.get("created_at")?,
    })
}

pub(crate) fn row_to_dead_letter(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeadLetterMessage> {
    Ok(DeadLetterMessage {
        id: row.get("id")?,
        queue_name: row.get("queue_name")?,
        data: row.get("data")?,
        failed_at: row.get("failed_at")?,
        reason: row.get("reason")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_equality_is_field_wise() {
        let a = Message {
            id: "1".to_string(),
            queue_name: "default".to_string(),
            data: vec![1, 2, 3],
            retry_count: 0,
            created_at: 100,
        };
        let b = a.clone();
        assert_eq!(a, b);
    }
}
