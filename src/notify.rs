//! Local (single-process) wakeup optimization for blocking `pop`/`join`.
//!
//! Polling is the only mechanism that is correct across processes sharing
//! the queue file, since nothing else is visible to every writer. A
//! [`std::sync::Condvar`] signaled on every successful mutation is a
//! purely local optimization layered on top — same-process waiters wake
//! immediately, cross-process waiters simply never observe this condvar
//! and fall back to the polling cadence.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct Notifier {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wake every thread currently waiting on this notifier.
    pub(crate) fn notify_all(&self) {
        let _guard = self.mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.condvar.notify_all();
    }

    /// Block for at most `timeout`, or until [`Notifier::notify_all`] is
    /// called by another thread sharing this `Notifier`. Never errors: a
    /// spurious wakeup or a poisoned mutex both just fall through to the
    /// caller re-attempting its operation, which is always safe here.
    pub(crate) fn wait_timeout(&self, timeout: Duration) {
        let guard = self.mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = self.condvar.wait_timeout(guard, timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn notify_wakes_a_waiting_thread_promptly() {
        let notifier = Arc::new(Notifier::new());
        let waiter = notifier.clone();

        let start = std::time::Instant::now();
        let handle = thread::spawn(move || {
            waiter.wait_timeout(Duration::from_secs(5));
        });

        thread::sleep(Duration::from_millis(20));
        notifier.notify_all();
        handle.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wait_times_out_without_notification() {
        let notifier = Notifier::new();
        let start = std::time::Instant::now();
        notifier.wait_timeout(Duration::from_millis(30));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }
}
