//! `FifoQueue`: non-blocking FIFO with factor-based resize.

use super::{check_context, Queue};
use crate::{Context, QueueError};
use parking_lot::Mutex;
use std::collections::VecDeque;

struct State<T> {
    items: VecDeque<T>,
    capacity: usize,
}

/// Non-blocking FIFO queue.
///
/// Full → capacity × growth factor (default 2.0). After a dequeue, when fewer
/// than capacity × shrink factor (default 0.5) items remain and capacity is
/// above the minimum, capacity shrinks by the shrink factor, never below the
/// minimum or the item count.
///
/// ```
/// use ruleq::{Context, FifoQueue};
///
/// let ctx = Context::new();
/// let q = FifoQueue::new(2).with_growth_factor(3.0);
/// q.enqueue(&ctx, 'a').unwrap();
/// q.enqueue(&ctx, 'b').unwrap();
/// q.enqueue(&ctx, 'c').unwrap();
/// assert_eq!(q.cap(), 6);
/// assert_eq!(q.dequeue(&ctx), Ok('a'));
/// ```
pub struct FifoQueue<T> {
    state: Mutex<State<T>>,
    growth_factor: f64,
    shrink_factor: f64,
    min_capacity: usize,
}

impl<T> FifoQueue<T> {
    /// Create a queue with the given initial (and minimum) capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                capacity,
            }),
            growth_factor: 2.0,
            shrink_factor: 0.5,
            min_capacity: capacity,
        }
    }

    /// Set the growth factor. Growth is at least one slot.
    #[must_use]
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Set the shrink factor, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_shrink_factor(mut self, factor: f64) -> Self {
        self.shrink_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Set the minimum capacity. Raises the current capacity if needed.
    #[must_use]
    pub fn with_min_capacity(mut self, min_capacity: usize) -> Self {
        self.min_capacity = min_capacity.max(1);
        let state = self.state.get_mut();
        if state.capacity < self.min_capacity {
            state.capacity = self.min_capacity;
            let additional = self.min_capacity.saturating_sub(state.items.len());
            state.items.reserve(additional);
        }
        self
    }

    /// Append an item, growing if full.
    ///
    /// # Errors
    ///
    /// The context's error when it is done.
    pub fn enqueue(&self, ctx: &Context, item: T) -> Result<(), QueueError> {
        check_context(ctx)?;
        let mut state = self.state.lock();
        if state.items.len() >= state.capacity {
            let from = state.capacity;
            let to = scale(from, self.growth_factor).max(from + 1);
            let additional = to - state.items.len();
            state.items.reserve(additional);
            state.capacity = to;
            tracing::debug!(from, to, "fifo queue grew");
        }
        state.items.push_back(item);
        Ok(())
    }

    /// Remove the head item.
    ///
    /// # Errors
    ///
    /// The context's error when it is done, [`QueueError::Empty`] when empty.
    pub fn dequeue(&self, ctx: &Context) -> Result<T, QueueError> {
        check_context(ctx)?;
        let mut state = self.state.lock();
        let item = state.items.pop_front().ok_or(QueueError::Empty)?;
        let len = state.items.len();
        let from = state.capacity;
        if from > self.min_capacity && len < scale(from, self.shrink_factor) {
            let to = scale(from, self.shrink_factor)
                .max(self.min_capacity)
                .max(len);
            if to < from {
                state.items.shrink_to(to);
                state.capacity = to;
                tracing::debug!(from, to, "fifo queue shrank");
            }
        }
        Ok(item)
    }

    /// Current capacity.
    #[must_use]
    pub fn cap(&self) -> usize {
        self.state.lock().capacity
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every item. Capacity is kept.
    pub fn clear(&self) {
        self.state.lock().items.clear();
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn scale(n: usize, factor: f64) -> usize {
    (n as f64 * factor) as usize
}

impl<T: Send> Queue<T> for FifoQueue<T> {
    fn enqueue(&self, ctx: &Context, item: T) -> Result<(), QueueError> {
        FifoQueue::enqueue(self, ctx, item)
    }

    fn dequeue(&self, ctx: &Context) -> Result<T, QueueError> {
        FifoQueue::dequeue(self, ctx)
    }

    fn len(&self) -> usize {
        FifoQueue::len(self)
    }

    fn clear(&self) {
        FifoQueue::clear(self);
    }
}

impl<T> std::fmt::Debug for FifoQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FifoQueue")
            .field("len", &state.items.len())
            .field("capacity", &state.capacity)
            .field("min_capacity", &self.min_capacity)
            .finish_non_exhaustive()
    }
}
