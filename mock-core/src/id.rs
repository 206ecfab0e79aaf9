use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out 1, 2, 3, ... for the lifetime of the owning context.
///
/// Message correlation ids and log ids each get their own factory; a log id
/// outlives many message round-trips, so the two sequences never share a counter.
#[derive(Debug, Default)]
pub struct IdFactory {
    last: AtomicU64,
}

impl IdFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last id handed out, 0 if none yet
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}
