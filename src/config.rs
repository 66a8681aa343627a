//! Engine-wide and per-call configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_max_retries() -> u32 {
    5
}

const fn default_lock_timeout_secs() -> u64 {
    5
}

/// Engine-wide configuration, fixed at [`crate::LiteQueue::open`] time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum delivery attempts before a message is promoted to the DLQ.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// How long a write operation waits to acquire the store's write lock
    /// before reporting [`crate::Error::LockTimeout`] (or, inside `pop`,
    /// retrying internally).
    #[serde(
        default = "default_lock_timeout",
        with = "duration_secs",
        rename = "lock_timeout_seconds"
    )]
    pub lock_timeout: Duration,
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(default_lock_timeout_secs())
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            lock_timeout: default_lock_timeout(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Options for [`crate::LiteQueue::put`] and [`crate::LiteQueue::put_batch`].
#[derive(Debug, Clone)]
pub struct PutOptions {
    /// Logical queue to insert into.
    pub queue_name: String,
    /// Seconds to delay visibility after enqueue (default 0, visible
    /// immediately).
    pub visible_after_seconds: i64,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            queue_name: "default".to_string(),
            visible_after_seconds: 0,
        }
    }
}

/// Options for [`crate::LiteQueue::pop`].
#[derive(Debug, Clone)]
pub struct PopOptions {
    /// Logical queue to dequeue from.
    pub queue_name: String,
    /// Lease length in seconds granted on successful dequeue (default 60).
    pub invisible_seconds: i64,
    /// Maximum time to block waiting for a message (default 0, no wait).
    pub wait_seconds: u64,
}

impl Default for PopOptions {
    fn default() -> Self {
        Self {
            queue_name: "default".to_string(),
            invisible_seconds: 60,
            wait_seconds: 0,
        }
    }
}

/// Options for [`crate::LiteQueue::consume`] and [`crate::LiteQueue::begin`].
#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    /// Logical queue to consume from.
    pub queue_name: String,
    /// Lease length in seconds granted on receive (default 60).
    pub invisible_seconds: i64,
    /// Maximum time to block waiting for a message (default 0, no wait).
    pub wait_seconds: u64,
}

impl Default for ConsumeOptions {
    fn default() -> Self {
        Self {
            queue_name: "default".to_string(),
            invisible_seconds: 60,
            wait_seconds: 0,
        }
    }
}

impl From<ConsumeOptions> for PopOptions {
    fn from(opts: ConsumeOptions) -> Self {
        Self {
            queue_name: opts.queue_name,
            invisible_seconds: opts.invisible_seconds,
            wait_seconds: opts.wait_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
    }

    #[test]
    fn put_options_default_queue_is_default() {
        assert_eq!(PutOptions::default().queue_name, "default");
    }

    #[test]
    fn pop_options_default_lease_is_sixty_seconds() {
        assert_eq!(PopOptions::default().invisible_seconds, 60);
    }

    #[test]
    fn consume_options_converts_into_pop_options() {
        let consume = ConsumeOptions {
            queue_name: "jobs".to_string(),
            invisible_seconds: 30,
            wait_seconds: 5,
        };
        let pop: PopOptions = consume.into();
        assert_eq!(pop.queue_name, "jobs");
        assert_eq!(pop.invisible_seconds, 30);
        assert_eq!(pop.wait_seconds, 5);
    }
}
