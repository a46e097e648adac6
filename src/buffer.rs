//! Append-only queues drained atomically at window boundaries.

use std::sync::Mutex;

/// Multi-producer queue whose consumer removes everything in one step.
///
/// `take_all` swaps the backing storage under the same lock that guards
/// `push`, so an item pushed concurrently with a drain lands either in the
/// returned batch or in the fresh queue — never in both, never nowhere.
/// This is the drain invariant the aggregation and flush timers rely on.
#[derive(Debug, Default)]
pub struct SwapQueue<T> {
    items: Mutex<Vec<T>>,
}

impl<T> SwapQueue<T> {
    /// New empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Append one item.
    pub fn push(&self, item: T) {
        self.lock().push(item);
    }

    /// Remove and return the entire contents, leaving the queue empty.
    pub fn take_all(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        // A poisoned lock only means a producer panicked mid-push; the
        // queue contents are still coherent.
        self.items.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
