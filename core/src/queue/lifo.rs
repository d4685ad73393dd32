//! `LifoQueue`: a locked stack.

use super::{check_context, Queue};
use crate::{Context, QueueError};
use parking_lot::Mutex;

/// Non-blocking last-in, first-out queue.
pub struct LifoQueue<T> {
    items: Mutex<Vec<T>>,
}

impl<T> LifoQueue<T> {
    /// Create an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Push an item.
    ///
    /// # Errors
    ///
    /// The context's error when it is done.
    pub fn enqueue(&self, ctx: &Context, item: T) -> Result<(), QueueError> {
        check_context(ctx)?;
        self.items.lock().push(item);
        Ok(())
    }

    /// Pop the most recently pushed item.
    ///
    /// # Errors
    ///
    /// The context's error when it is done, [`QueueError::Empty`] when empty.
    pub fn dequeue(&self, ctx: &Context) -> Result<T, QueueError> {
        check_context(ctx)?;
        self.items.lock().pop().ok_or(QueueError::Empty)
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drop every item.
    pub fn clear(&self) {
        self.items.lock().clear();
    }
}

impl<T: Clone> LifoQueue<T> {
    /// Copy of the top item.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.items.lock().last().cloned()
    }
}

impl<T: Send> Queue<T> for LifoQueue<T> {
    fn enqueue(&self, ctx: &Context, item: T) -> Result<(), QueueError> {
        LifoQueue::enqueue(self, ctx, item)
    }

    fn dequeue(&self, ctx: &Context) -> Result<T, QueueError> {
        LifoQueue::dequeue(self, ctx)
    }

    fn len(&self) -> usize {
        LifoQueue::len(self)
    }

    fn clear(&self) {
        LifoQueue::clear(self);
    }
}

impl<T> Default for LifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for LifoQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifoQueue")
            .field("len", &self.len())
            .finish()
    }
}
