use std::sync::atomic::{AtomicU64, Ordering};

/// Number of users online, as seen by this process.
///
/// Incremented on every first-handle registration and decremented on every
/// last-handle removal observed here. With several server instances each
/// process only counts the transitions it performed, so the value is an
/// approximation; it is reported in `numUsers` and never used for routing.
#[derive(Debug, Default)]
pub struct PresenceCounter {
    users: AtomicU64,
}

impl PresenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new value.
    pub fn increment(&self) -> u64 {
        self.users.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the new value. Never goes below zero.
    pub fn decrement(&self) -> u64 {
        let previous = self
            .users
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn current(&self) -> u64 {
        self.users.load(Ordering::SeqCst)
    }
}
