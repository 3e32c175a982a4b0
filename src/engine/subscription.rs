use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::task::JoinHandle;

/// Holds the spawned watcher behind one live document feed. At most one
/// watcher is active per slot; arming a new one aborts the old.
#[derive(Default)]
pub struct SubscriptionSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self, handle: JoinHandle<()>) {
        let previous = {
            let mut guard = self.handle.lock().unwrap_or_else(|e| e.into_inner());
            guard.replace(handle)
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Best-effort teardown; never fails, idempotent.
    pub fn clear(&self) {
        let previous = {
            let mut guard = self.handle.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for SubscriptionSlot {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Monotonic counter stamping each (re-)initialization. Watchers capture
/// the value they were spawned under and stand down once it moves on, so a
/// late callback from a torn-down feed cannot resurrect stale state.
#[derive(Default)]
pub struct Generation(AtomicU64);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, stamp: u64) -> bool {
        self.current() == stamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_invalidates_older_stamps() {
        let generation = Generation::new();
        let first = generation.advance();
        assert!(generation.is_current(first));

        let second = generation.advance();
        assert!(!generation.is_current(first));
        assert!(generation.is_current(second));
    }

    #[tokio::test]
    async fn arming_twice_aborts_the_first_watcher() {
        let slot = SubscriptionSlot::new();
        let first = tokio::spawn(std::future::pending::<()>());
        let aborted = first.abort_handle();
        slot.arm(first);
        slot.arm(tokio::spawn(std::future::pending::<()>()));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(aborted.is_finished());
        slot.clear();
    }
}
