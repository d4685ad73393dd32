//! `PriorityQueue`: binary max-heap keyed on an `i64` priority.
//!
//! The heap is a 0-indexed `Vec`: the children of `i` are `2i + 1` and
//! `2i + 2`. Push sifts up, pop swaps the root with the last slot and sifts
//! down. Items with equal priority come out in no particular order.

use super::{check_context, Queue};
use crate::{Context, QueueError};
use parking_lot::Mutex;

/// An item paired with its priority. Larger priorities dequeue first.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct Prioritized<T> {
    /// The payload.
    pub value: T,
    /// Its priority.
    pub priority: i64,
}

impl<T> Prioritized<T> {
    /// Pair `value` with `priority`.
    pub fn new(value: T, priority: i64) -> Self {
        Self { value, priority }
    }
}

/// Locked binary max-heap.
///
/// ```
/// use ruleq::{Context, PriorityQueue};
///
/// let ctx = Context::new();
/// let q = PriorityQueue::new();
/// q.push(&ctx, "low", 1).unwrap();
/// q.push(&ctx, "high", 10).unwrap();
/// assert_eq!(q.pop(&ctx).unwrap(), "high");
/// ```
pub struct PriorityQueue<T> {
    heap: Mutex<Vec<Prioritized<T>>>,
}

impl<T> PriorityQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(Vec::new()),
        }
    }

    /// Insert an item.
    ///
    /// # Errors
    ///
    /// The context's error when it is done.
    pub fn enqueue(&self, ctx: &Context, item: Prioritized<T>) -> Result<(), QueueError> {
        check_context(ctx)?;
        let mut heap = self.heap.lock();
        heap.push(item);
        let last = heap.len() - 1;
        sift_up(&mut heap, last);
        Ok(())
    }

    /// Remove the highest-priority item.
    ///
    /// # Errors
    ///
    /// The context's error when it is done, [`QueueError::Empty`] when empty.
    pub fn dequeue(&self, ctx: &Context) -> Result<Prioritized<T>, QueueError> {
        check_context(ctx)?;
        let mut heap = self.heap.lock();
        if heap.is_empty() {
            return Err(QueueError::Empty);
        }
        let last = heap.len() - 1;
        heap.swap(0, last);
        let top = heap.pop().ok_or(QueueError::Empty)?;
        sift_down(&mut heap, 0);
        Ok(top)
    }

    /// Insert `value` with `priority`.
    ///
    /// # Errors
    ///
    /// See [`enqueue`](Self::enqueue).
    pub fn push(&self, ctx: &Context, value: T, priority: i64) -> Result<(), QueueError> {
        self.enqueue(ctx, Prioritized::new(value, priority))
    }

    /// Remove the highest-priority value, dropping its priority.
    ///
    /// # Errors
    ///
    /// See [`dequeue`](Self::dequeue).
    pub fn pop(&self, ctx: &Context) -> Result<T, QueueError> {
        self.dequeue(ctx).map(|p| p.value)
    }

    /// Priority of the item [`dequeue`](Self::dequeue) would return.
    #[must_use]
    pub fn peek_priority(&self) -> Option<i64> {
        self.heap.lock().first().map(|p| p.priority)
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Returns `true` when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Drop every item.
    pub fn clear(&self) {
        self.heap.lock().clear();
    }
}

impl<T: Clone> PriorityQueue<T> {
    /// Copy of the item [`dequeue`](Self::dequeue) would return.
    #[must_use]
    pub fn peek(&self) -> Option<Prioritized<T>> {
        self.heap.lock().first().cloned()
    }
}

fn sift_up<T>(heap: &mut [Prioritized<T>], mut i: usize) {
    while i > 0 {
        let parent = (i - 1) / 2;
        if heap[parent].priority >= heap[i].priority {
            break;
        }
        heap.swap(parent, i);
        i = parent;
    }
}

fn sift_down<T>(heap: &mut [Prioritized<T>], mut i: usize) {
    let n = heap.len();
    loop {
        let left = 2 * i + 1;
        let right = left + 1;
        let mut largest = i;
        if left < n && heap[left].priority > heap[largest].priority {
            largest = left;
        }
        if right < n && heap[right].priority > heap[largest].priority {
            largest = right;
        }
        if largest == i {
            break;
        }
        heap.swap(i, largest);
        i = largest;
    }
}

impl<T: Send> Queue<Prioritized<T>> for PriorityQueue<T> {
    fn enqueue(&self, ctx: &Context, item: Prioritized<T>) -> Result<(), QueueError> {
        PriorityQueue::enqueue(self, ctx, item)
    }

    fn dequeue(&self, ctx: &Context) -> Result<Prioritized<T>, QueueError> {
        PriorityQueue::dequeue(self, ctx)
    }

    fn len(&self) -> usize {
        PriorityQueue::len(self)
    }

    fn clear(&self) {
        PriorityQueue::clear(self);
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for PriorityQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.len())
            .field("top", &self.peek_priority())
            .finish()
    }
}
