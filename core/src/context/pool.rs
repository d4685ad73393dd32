//! Size-classed byte buffer pool.
//!
//! Contexts holding byte values can draw their storage from a pool. The pool
//! is best-effort: buffers are only reused when handed back with
//! [`BufferPool::put`], and a context overwriting a value just drops the old
//! buffer.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Buffer capacities served by the pool, smallest first.
pub const SIZE_CLASSES: [usize; 6] = [64, 256, 1024, 4096, 16384, 65536];

const MAX_FREE_PER_CLASS: usize = 64;

/// A fixed set of free lists, one per size class.
#[derive(Debug)]
pub struct BufferPool {
    classes: [Mutex<Vec<Vec<u8>>>; SIZE_CLASSES.len()],
    reused: AtomicU64,
    allocated: AtomicU64,
}

impl BufferPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            classes: Default::default(),
            reused: AtomicU64::new(0),
            allocated: AtomicU64::new(0),
        }
    }

    /// Get an empty buffer with capacity for at least `len` bytes.
    ///
    /// Requests larger than the biggest class bypass the pool.
    pub fn get(&self, len: usize) -> Vec<u8> {
        let Some(class) = class_index(len) else {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            return Vec::with_capacity(len);
        };
        if let Some(mut buf) = self.classes[class].lock().pop() {
            buf.clear();
            self.reused.fetch_add(1, Ordering::Relaxed);
            return buf;
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Vec::with_capacity(SIZE_CLASSES[class])
    }

    /// Copy `bytes` into a pooled buffer.
    pub fn copy_from(&self, bytes: &[u8]) -> Vec<u8> {
        let mut buf = self.get(bytes.len());
        buf.extend_from_slice(bytes);
        buf
    }

    /// Return a buffer. Buffers whose capacity is not exactly a size class
    /// are dropped.
    pub fn put(&self, buf: Vec<u8>) {
        let Some(class) = SIZE_CLASSES.iter().position(|&c| c == buf.capacity()) else {
            return;
        };
        let mut free = self.classes[class].lock();
        if free.len() < MAX_FREE_PER_CLASS {
            free.push(buf);
        }
    }

    /// Number of `get` calls served from a free list.
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    /// Number of `get` calls that had to allocate.
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

fn class_index(len: usize) -> Option<usize> {
    SIZE_CLASSES.iter().position(|&c| len <= c)
}
