//! Queues: typed in-memory queues that honour the caller's [`Context`]
//!
//! | Queue | Order | Blocking | Close | Resize |
//! |---|---|---|---|---|
//! | [`BoundedQueue`] | FIFO | `dequeue` waits | yes | smart grow/shrink within `[min, max]` |
//! | [`FifoQueue`] | FIFO | no | no | growth/shrink factors |
//! | [`LifoQueue`] | LIFO | no | no | `Vec` growth |
//! | [`PriorityQueue`] | highest priority first | no | no | `Vec` growth |
//!
//! All four implement [`Queue`]. A context that is already done makes every
//! `enqueue`/`dequeue` return its error as [`QueueError::Context`].
//!
//! [`Deque`] is a single-owner ring buffer and takes `&mut self` instead.

mod bounded;
mod deque;
mod fifo;
mod lifo;
mod priority;

pub use bounded::{BoundedQueue, BoundedQueueConfig, BoundedQueueStats};
pub use deque::{Deque, DrainBack, DrainFront, IntoIter, Iter};
pub use fifo::FifoQueue;
pub use lifo::LifoQueue;
pub use priority::{Prioritized, PriorityQueue};

use crate::{Context, QueueError};

/// Operations shared by the concurrent queues.
pub trait Queue<T>: Send + Sync {
    /// Add an item.
    ///
    /// # Errors
    ///
    /// Returns the context's error when it is done, or a queue-specific
    /// error (`Closed`, `Full`).
    fn enqueue(&self, ctx: &Context, item: T) -> Result<(), QueueError>;

    /// Remove the next item.
    ///
    /// # Errors
    ///
    /// Returns the context's error when it is done, `Empty` for
    /// non-blocking queues, or `Closed`.
    fn dequeue(&self, ctx: &Context) -> Result<T, QueueError>;

    /// Number of queued items.
    fn len(&self) -> usize;

    /// Returns `true` when nothing is queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every queued item.
    fn clear(&self);
}

/// Fail fast when the caller's context is already done.
#[inline]
pub(crate) fn check_context(ctx: &Context) -> Result<(), QueueError> {
    match ctx.err() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContextError;

    fn cancelled() -> Context {
        let ctx = Context::new();
        ctx.with_cancel();
        ctx.cancel();
        ctx
    }

    fn all_queues() -> Vec<(&'static str, Box<dyn Queue<u32>>)> {
        vec![
            ("bounded", Box::new(BoundedQueue::new(4, 64))),
            ("fifo", Box::new(FifoQueue::new(4))),
            ("lifo", Box::new(LifoQueue::new())),
        ]
    }

    #[test]
    fn test_cancelled_context_is_rejected_everywhere() {
        let ctx = cancelled();
        for (name, q) in all_queues() {
            assert_eq!(
                q.enqueue(&ctx, 1),
                Err(QueueError::Context(ContextError::Cancelled)),
                "{name}"
            );
            assert_eq!(
                q.dequeue(&ctx),
                Err(QueueError::Context(ContextError::Cancelled)),
                "{name}"
            );
        }
        let pq = PriorityQueue::new();
        assert!(pq.enqueue(&ctx, Prioritized::new(1u32, 1)).is_err());
    }

    #[test]
    fn test_trait_objects_share_contract() {
        let ctx = Context::new();
        for (name, q) in all_queues() {
            assert!(q.is_empty(), "{name}");
            q.enqueue(&ctx, 1).unwrap();
            q.enqueue(&ctx, 2).unwrap();
            assert_eq!(q.len(), 2, "{name}");
            q.clear();
            assert!(q.is_empty(), "{name}");
        }
    }
}
