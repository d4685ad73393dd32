//! `BoundedQueue`: blocking FIFO with a capacity range and smart resize
//!
//! # Resize policy
//!
//! When full, auto-resize is on and capacity is below the maximum:
//!
//! | Capacity | Next |
//! |---|---|
//! | `< 1024` | `× 2` |
//! | `1024..10000` | `× growth_factor` |
//! | `≥ 10000` | `+ min(25%, 10000)` |
//!
//! The result never exceeds `2 × capacity` or the maximum. After each
//! dequeue, once fewer than a quarter of the slots are used and capacity is
//! above the minimum, capacity drops to `max(capacity × 2/3, min, 2 × len)`.
//!
//! # Waking
//!
//! One mutex guards the buffer and one condition variable signals "not
//! empty". A waiting consumer registers an `on_done` callback on its context
//! that takes the mutex and broadcasts, and sleeps no longer than the
//! context's deadline, so cancellation and expiry both wake it.

use super::{check_context, Queue};
use crate::{Context, Listener, QueueError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DOUBLING_LIMIT: usize = 1024;
const LINEAR_LIMIT: usize = 10_000;
const MAX_STEP: usize = 10_000;

/// Construction options for a [`BoundedQueue`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "json",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, rename_all = "camelCase")
)]
pub struct BoundedQueueConfig {
    /// Starting and minimum capacity. At least 1.
    pub min_capacity: usize,
    /// Hard upper bound. Raised to `min_capacity` if smaller.
    pub max_capacity: usize,
    /// Grow when full instead of returning [`QueueError::Full`].
    pub auto_resize: bool,
    /// Multiplier used between 1024 and 10000 slots.
    pub growth_factor: f64,
}

impl BoundedQueueConfig {
    /// Config with the given capacity range and default options.
    #[must_use]
    pub fn new(min_capacity: usize, max_capacity: usize) -> Self {
        Self {
            min_capacity,
            max_capacity,
            ..Self::default()
        }
    }

    /// Set auto-resize.
    #[must_use]
    pub fn with_auto_resize(mut self, auto_resize: bool) -> Self {
        self.auto_resize = auto_resize;
        self
    }

    /// Set the growth factor. Values at or below 1.0 still grow by one slot.
    #[must_use]
    pub fn with_growth_factor(mut self, growth_factor: f64) -> Self {
        self.growth_factor = growth_factor;
        self
    }
}

impl Default for BoundedQueueConfig {
    fn default() -> Self {
        Self {
            min_capacity: 16,
            max_capacity: 1 << 20,
            auto_resize: true,
            growth_factor: 1.5,
        }
    }
}

/// Snapshot returned by [`BoundedQueue::stats`].
///
/// With the `json` feature it serializes with camelCase field names
/// (`minCapacity`, `resizeCount`, ...).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "json",
    derive(serde::Serialize),
    serde(rename_all = "camelCase")
)]
pub struct BoundedQueueStats {
    /// Items queued.
    pub length: usize,
    /// Current capacity.
    pub capacity: usize,
    /// Configured minimum.
    pub min_capacity: usize,
    /// Configured maximum.
    pub max_capacity: usize,
    /// `length / capacity` as a percentage.
    pub utilization: f64,
    /// Whether the queue grows when full.
    pub auto_resize: bool,
    /// Whether the queue is closed.
    pub closed: bool,
    /// Number of grow operations.
    pub resize_count: u64,
    /// Number of shrink operations.
    pub shrink_count: u64,
    /// Configured growth factor.
    pub growth_factor: f64,
}

struct Shared<T> {
    ring: Mutex<Ring<T>>,
    not_empty: Condvar,
}

struct Ring<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Ring<T> {
    /// Move the items into a fresh buffer of `capacity` slots, front first.
    fn relocate(&mut self, capacity: usize) {
        let mut items = VecDeque::with_capacity(capacity);
        items.extend(self.items.drain(..));
        self.items = items;
        self.capacity = capacity;
    }
}

/// Blocking FIFO queue with a capacity range and smart auto-resize.
///
/// ```
/// use ruleq::{BoundedQueue, Context, QueueError};
///
/// let ctx = Context::new();
/// let q = BoundedQueue::new(2, 4);
/// for i in 0..4 {
///     q.enqueue(&ctx, i).unwrap();
/// }
/// assert_eq!(q.enqueue(&ctx, 4), Err(QueueError::Full));
/// assert_eq!(q.cap(), 4);
///
/// q.close();
/// assert_eq!(q.dequeue(&ctx), Ok(0));
/// ```
pub struct BoundedQueue<T> {
    shared: Arc<Shared<T>>,
    count: AtomicUsize,
    closed: AtomicBool,
    auto_resize: AtomicBool,
    min_capacity: usize,
    max_capacity: usize,
    growth_factor: f64,
    resize_count: AtomicU64,
    shrink_count: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// Create a queue starting at `min_capacity` that may grow to
    /// `max_capacity`. Auto-resize is on, growth factor 1.5.
    #[must_use]
    pub fn new(min_capacity: usize, max_capacity: usize) -> Self {
        Self::with_config(BoundedQueueConfig::new(min_capacity, max_capacity))
    }

    /// Create a queue from a config.
    #[must_use]
    pub fn with_config(config: BoundedQueueConfig) -> Self {
        let min_capacity = config.min_capacity.max(1);
        let max_capacity = config.max_capacity.max(min_capacity);
        Self {
            shared: Arc::new(Shared {
                ring: Mutex::new(Ring {
                    items: VecDeque::with_capacity(min_capacity),
                    capacity: min_capacity,
                }),
                not_empty: Condvar::new(),
            }),
            count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            auto_resize: AtomicBool::new(config.auto_resize),
            min_capacity,
            max_capacity,
            growth_factor: config.growth_factor,
            resize_count: AtomicU64::new(0),
            shrink_count: AtomicU64::new(0),
        }
    }

    /// Add an item, growing if full and allowed.
    ///
    /// Never waits for space.
    ///
    /// # Errors
    ///
    /// The context's error if it is done, [`QueueError::Closed`] after
    /// [`close`](Self::close), [`QueueError::Full`] when full and unable to
    /// grow.
    pub fn enqueue(&self, ctx: &Context, item: T) -> Result<(), QueueError> {
        check_context(ctx)?;
        let mut ring = self.shared.ring.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        if ring.items.len() >= ring.capacity {
            if !self.auto_resize.load(Ordering::Relaxed) || ring.capacity >= self.max_capacity {
                return Err(QueueError::Full);
            }
            self.grow(&mut ring);
        }
        ring.items.push_back(item);
        self.count.store(ring.items.len(), Ordering::Release);
        drop(ring);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Remove the head item without waiting. Returns `None` when empty,
    /// closed or not.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut ring = self.shared.ring.lock();
        self.pop_locked(&mut ring)
    }

    /// Close the queue. Idempotent. Wakes every waiting consumer.
    pub fn close(&self) {
        let ring = self.shared.ring.lock();
        let was_closed = self.closed.swap(true, Ordering::AcqRel);
        drop(ring);
        if !was_closed {
            tracing::debug!(pending = self.len(), "bounded queue closed");
        }
        self.shared.not_empty.notify_all();
    }

    /// Returns `true` after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Turn growth on or off. Existing capacity is kept.
    pub fn set_auto_resize(&self, enabled: bool) -> &Self {
        self.auto_resize.store(enabled, Ordering::Relaxed);
        self
    }

    /// Current capacity.
    #[must_use]
    pub fn cap(&self) -> usize {
        self.shared.ring.lock().capacity
    }

    /// Number of queued items. Lock-free.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Returns `true` when nothing is queued. Lock-free.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every queued item. Capacity is kept.
    pub fn clear(&self) {
        let mut ring = self.shared.ring.lock();
        ring.items.clear();
        self.count.store(0, Ordering::Release);
    }

    /// Snapshot of sizes, options and counters.
    #[must_use]
    pub fn stats(&self) -> BoundedQueueStats {
        let (length, capacity) = {
            let ring = self.shared.ring.lock();
            (ring.items.len(), ring.capacity)
        };
        #[allow(clippy::cast_precision_loss)]
        let utilization = length as f64 / capacity as f64 * 100.0;
        BoundedQueueStats {
            length,
            capacity,
            min_capacity: self.min_capacity,
            max_capacity: self.max_capacity,
            utilization,
            auto_resize: self.auto_resize.load(Ordering::Relaxed),
            closed: self.is_closed(),
            resize_count: self.resize_count.load(Ordering::Relaxed),
            shrink_count: self.shrink_count.load(Ordering::Relaxed),
            growth_factor: self.growth_factor,
        }
    }

    fn pop_locked(&self, ring: &mut Ring<T>) -> Option<T> {
        let item = ring.items.pop_front()?;
        self.count.store(ring.items.len(), Ordering::Release);
        self.maybe_shrink(ring);
        Some(item)
    }

    fn grow(&self, ring: &mut Ring<T>) {
        let from = ring.capacity;
        let to = self.next_capacity(from);
        ring.relocate(to);
        self.resize_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(from, to, "bounded queue grew");
    }

    fn next_capacity(&self, capacity: usize) -> usize {
        let target = if capacity < DOUBLING_LIMIT {
            capacity.saturating_mul(2)
        } else if capacity < LINEAR_LIMIT {
            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let scaled = (capacity as f64 * self.growth_factor) as usize;
            scaled
        } else {
            capacity.saturating_add((capacity / 4).min(MAX_STEP))
        };
        target
            .max(capacity + 1)
            .min(capacity.saturating_mul(2))
            .min(self.max_capacity)
    }

    fn maybe_shrink(&self, ring: &mut Ring<T>) {
        let len = ring.items.len();
        let from = ring.capacity;
        if len >= from / 4 || from <= self.min_capacity {
            return;
        }
        let to = (from * 2 / 3).max(self.min_capacity).max(len * 2);
        if to >= from {
            return;
        }
        ring.relocate(to);
        self.shrink_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(from, to, "bounded queue shrank");
    }
}

impl<T: Send + 'static> BoundedQueue<T> {
    /// Remove the head item, waiting until one arrives, the queue closes, or
    /// `ctx` is done.
    ///
    /// Items queued before [`close`](Self::close) are still delivered.
    ///
    /// # Errors
    ///
    /// The context's error if it is (or becomes) done, [`QueueError::Closed`]
    /// once the queue is closed and empty.
    pub fn dequeue(&self, ctx: &Context) -> Result<T, QueueError> {
        check_context(ctx)?;
        if let Some(item) = self.try_dequeue() {
            return Ok(item);
        }

        self.dequeue_slow(ctx)
    }

    fn dequeue_slow(&self, ctx: &Context) -> Result<T, QueueError> {
        // Registered before the first wait; dropped on return.
        let waker = self.waker();
        let _guard = ctx.on_done(waker);

        loop {
            check_context(ctx)?;
            let mut ring = self.shared.ring.lock();
            if let Some(item) = self.pop_locked(&mut ring) {
                return Ok(item);
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(QueueError::Closed);
            }
            // Re-checked under the lock so a cancel between `check_context`
            // and the wait cannot be missed. `err()` is not used here: it may
            // fire the token, and the listener takes this lock.
            if ctx.is_signalled() {
                continue;
            }
            match ctx.deadline() {
                Some(deadline) if deadline <= Instant::now() => continue,
                Some(deadline) => {
                    let _ = self.shared.not_empty.wait_until(&mut ring, deadline);
                }
                None => self.shared.not_empty.wait(&mut ring),
            }
        }
    }

    /// Like [`dequeue`](Self::dequeue) with a context that expires after
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// [`ContextError::DeadlineExceeded`](crate::ContextError::DeadlineExceeded)
    /// on timeout, [`QueueError::Closed`] once closed and empty.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        let ctx = Context::new();
        ctx.with_timeout(timeout);
        self.dequeue(&ctx)
    }

    fn waker(&self) -> Listener {
        let shared = Arc::downgrade(&self.shared);
        Arc::new(move || {
            if let Some(shared) = shared.upgrade() {
                let _ring = shared.ring.lock();
                shared.not_empty.notify_all();
            }
        })
    }
}

impl<T: Send + 'static> Queue<T> for BoundedQueue<T> {
    fn enqueue(&self, ctx: &Context, item: T) -> Result<(), QueueError> {
        BoundedQueue::enqueue(self, ctx, item)
    }

    fn dequeue(&self, ctx: &Context) -> Result<T, QueueError> {
        BoundedQueue::dequeue(self, ctx)
    }

    fn len(&self) -> usize {
        BoundedQueue::len(self)
    }

    fn clear(&self) {
        BoundedQueue::clear(self);
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
