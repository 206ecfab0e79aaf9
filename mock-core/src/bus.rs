use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use std::sync::Arc;

/// Correlation table pairing outstanding queries with their answers.
///
/// Each id holds at most one continuation and is consumed the first time it is
/// resolved. Answers for unknown ids are dropped.
#[derive(Debug, Clone)]
pub struct MessageBus<T = Value> {
    /// Maps correlation id -> sender for the answer
    pending: Arc<DashMap<u64, oneshot::Sender<T>>>,
}

impl<T> Default for MessageBus<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }
}

impl<T> MessageBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `id`. The receiver completes once `resolve(id, ..)` runs.
    /// Registering an id twice replaces the earlier continuation, whose receiver
    /// then observes a closed channel.
    pub fn register(&self, id: u64) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        rx
    }

    /// Fulfil and remove the continuation for `id`. Returns false when nothing
    /// was waiting.
    pub fn resolve(&self, id: u64, payload: T) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                // The waiter may have given up already; that is not an error.
                let _ = tx.send(payload);
                true
            }
            None => {
                debug!("Dropping answer for unknown correlation id {}", id);
                false
            }
        }
    }

    /// Forget a continuation whose waiter stopped listening (e.g. timed out).
    pub fn abandon(&self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
