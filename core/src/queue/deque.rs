//! `Deque`: double-ended queue on a power-of-two ring buffer
//!
//! The backing buffer always holds a power-of-two number of slots, at least
//! 16, so neighbouring indices are computed with a mask:
//! `(i ± 1) & (cap - 1)`. The buffer doubles when full and halves once fewer
//! than a quarter of the slots are used, never dropping below the deque's
//! minimum capacity.
//!
//! Unlike the queues in this module, a `Deque` is single-owner: mutation
//! takes `&mut self`. An [`Iter`] borrows the deque, so modifying it while
//! iterating does not compile. The draining iterators ([`DrainFront`],
//! [`DrainBack`]) hold `&mut` and shrink once, when dropped.
//!
//! ```
//! use ruleq::Deque;
//!
//! let mut d = Deque::new();
//! d.push_back(1);
//! d.push_back(2);
//! d.insert(1, 3);
//! assert_eq!(d.iter().copied().collect::<Vec<_>>(), vec![1, 3, 2]);
//!
//! d.rotate(1);
//! assert_eq!(d.front(), Some(&3));
//! ```

use std::fmt;
use std::iter::FusedIterator;
use std::ops::{Index, IndexMut};

/// Smallest buffer a deque ever uses.
pub(crate) const MIN_CAPACITY: usize = 16;

/// Double-ended queue backed by a growable power-of-two ring buffer.
pub struct Deque<T> {
    buf: Vec<Option<T>>,
    head: usize,
    tail: usize,
    len: usize,
    min_capacity: usize,
}

impl<T> Deque<T> {
    /// Create an empty deque with 16 slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }

    /// Create an empty deque whose minimum capacity is `capacity` rounded up
    /// to a power of two (and at least 16).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let min_capacity = round_capacity(capacity);
        Self {
            buf: empty_slots(min_capacity),
            head: 0,
            tail: 0,
            len: 0,
            min_capacity,
        }
    }

    /// Number of items.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots in the backing buffer.
    #[inline]
    #[must_use]
    pub fn cap(&self) -> usize {
        self.buf.len()
    }

    /// The capacity the deque never shrinks below.
    #[must_use]
    pub fn min_capacity(&self) -> usize {
        self.min_capacity
    }

    #[inline]
    fn mask(&self) -> usize {
        self.buf.len() - 1
    }

    #[inline]
    fn next(&self, i: usize) -> usize {
        (i + 1) & self.mask()
    }

    #[inline]
    fn prev(&self, i: usize) -> usize {
        i.wrapping_sub(1) & self.mask()
    }

    /// Physical slot of logical index `i`.
    #[inline]
    fn slot(&self, i: usize) -> usize {
        (self.head + i) & self.mask()
    }

    fn take_slot(&mut self, slot: usize) -> T {
        match self.buf[slot].take() {
            Some(v) => v,
            None => unreachable!("slot {slot} inside the live range is empty"),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Ends
    // ═══════════════════════════════════════════════════════════════════════

    /// Append to the back.
    pub fn push_back(&mut self, item: T) {
        self.grow_if_full();
        self.buf[self.tail] = Some(item);
        self.tail = self.next(self.tail);
        self.len += 1;
    }

    /// Prepend to the front.
    pub fn push_front(&mut self, item: T) {
        self.grow_if_full();
        self.head = self.prev(self.head);
        self.buf[self.head] = Some(item);
        self.len += 1;
    }

    /// Remove from the front.
    pub fn pop_front(&mut self) -> Option<T> {
        let item = self.pop_front_raw()?;
        self.shrink_if_sparse();
        Some(item)
    }

    /// Remove from the back.
    pub fn pop_back(&mut self) -> Option<T> {
        let item = self.pop_back_raw()?;
        self.shrink_if_sparse();
        Some(item)
    }

    fn pop_front_raw(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.take_slot(self.head);
        self.head = self.next(self.head);
        self.len -= 1;
        Some(item)
    }

    fn pop_back_raw(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.tail = self.prev(self.tail);
        let item = self.take_slot(self.tail);
        self.len -= 1;
        Some(item)
    }

    /// The front item.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    /// The back item.
    #[must_use]
    pub fn back(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|i| self.get(i))
    }

    /// Mutable front item.
    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.get_mut(0)
    }

    /// Mutable back item.
    pub fn back_mut(&mut self) -> Option<&mut T> {
        let i = self.len.checked_sub(1)?;
        self.get_mut(i)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Random access
    // ═══════════════════════════════════════════════════════════════════════

    /// Item at `index` from the front, or `None` when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        self.buf[self.slot(index)].as_ref()
    }

    /// Mutable item at `index`, or `None` when out of range.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.len {
            return None;
        }
        let slot = self.slot(index);
        self.buf[slot].as_mut()
    }

    /// Item at `index` from the front.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[must_use]
    pub fn at(&self, index: usize) -> &T {
        let len = self.len;
        self.get(index)
            .unwrap_or_else(|| out_of_range("at", index, len))
    }

    /// Mutable item at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn at_mut(&mut self, index: usize) -> &mut T {
        let len = self.len;
        self.get_mut(index)
            .unwrap_or_else(|| out_of_range("at_mut", index, len))
    }

    /// Replace the item at `index`, returning the old one.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn set(&mut self, index: usize, item: T) -> T {
        std::mem::replace(self.at_mut(index), item)
    }

    /// Insert `item` so that it ends up at `index`. `index == len` appends.
    ///
    /// Shifts whichever side of `index` is shorter.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, item: T) {
        if index > self.len {
            out_of_range("insert", index, self.len);
        }
        if index == 0 {
            return self.push_front(item);
        }
        if index == self.len {
            return self.push_back(item);
        }

        self.grow_if_full();
        if index < self.len / 2 {
            // Open a slot before the front and shift [0, index) down by one.
            self.head = self.prev(self.head);
            for i in 0..index {
                let from = self.slot(i + 1);
                let to = self.slot(i);
                self.buf[to] = self.buf[from].take();
            }
        } else {
            // Shift [index, len) up by one into the free tail slot.
            for i in (index..self.len).rev() {
                let from = self.slot(i);
                let to = self.slot(i + 1);
                self.buf[to] = self.buf[from].take();
            }
            self.tail = self.next(self.tail);
        }
        let slot = self.slot(index);
        self.buf[slot] = Some(item);
        self.len += 1;
    }

    /// Remove and return the item at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        if index >= self.len {
            out_of_range("remove", index, self.len);
        }
        let target = self.slot(index);
        let item = self.take_slot(target);

        if index < self.len / 2 {
            for i in (0..index).rev() {
                let from = self.slot(i);
                let to = self.slot(i + 1);
                self.buf[to] = self.buf[from].take();
            }
            self.head = self.next(self.head);
        } else {
            for i in index..self.len - 1 {
                let from = self.slot(i + 1);
                let to = self.slot(i);
                self.buf[to] = self.buf[from].take();
            }
            self.tail = self.prev(self.tail);
        }
        self.len -= 1;
        self.shrink_if_sparse();
        item
    }

    /// Rotate `n` steps front-to-back: the front item moves to the back `n`
    /// times. Negative `n` rotates back-to-front.
    ///
    /// Multiples of `len` are no-ops. A full buffer rotates by moving its
    /// indices only.
    pub fn rotate(&mut self, n: isize) {
        if self.len <= 1 {
            return;
        }
        let Ok(len) = isize::try_from(self.len) else {
            return;
        };
        // rem_euclid of a positive modulus is in [0, len).
        let forward = n.rem_euclid(len).unsigned_abs();
        if forward == 0 {
            return;
        }

        if self.len == self.buf.len() {
            self.head = (self.head + forward) & self.mask();
            self.tail = self.head;
            return;
        }

        let backward = self.len - forward;
        if forward <= backward {
            for _ in 0..forward {
                self.buf[self.tail] = self.buf[self.head].take();
                self.head = self.next(self.head);
                self.tail = self.next(self.tail);
            }
        } else {
            for _ in 0..backward {
                self.head = self.prev(self.head);
                self.tail = self.prev(self.tail);
                self.buf[self.head] = self.buf[self.tail].take();
            }
        }
    }

    /// Remove every item. Capacity is kept.
    pub fn clear(&mut self) {
        for i in 0..self.len {
            let slot = self.slot(i);
            self.buf[slot] = None;
        }
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Search & iteration
    // ═══════════════════════════════════════════════════════════════════════

    /// Front-to-back iterator.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            deque: self,
            front: 0,
            back: self.len,
        }
    }

    /// Pop from the front as the iterator advances. Items not consumed stay
    /// in the deque. Shrinking happens once, when the iterator is dropped.
    pub fn drain_front(&mut self) -> DrainFront<'_, T> {
        DrainFront { deque: self }
    }

    /// Pop from the back as the iterator advances. Items not consumed stay
    /// in the deque. Shrinking happens once, when the iterator is dropped.
    pub fn drain_back(&mut self) -> DrainBack<'_, T> {
        DrainBack { deque: self }
    }

    /// Index of the first item (from the front) matching `pred`.
    pub fn index<F>(&self, mut pred: F) -> Option<usize>
    where
        F: FnMut(&T) -> bool,
    {
        self.iter().position(|item| pred(item))
    }

    /// Index of the last item (searching from the back) matching `pred`.
    pub fn rindex<F>(&self, mut pred: F) -> Option<usize>
    where
        F: FnMut(&T) -> bool,
    {
        (0..self.len).rev().find(|&i| self.get(i).is_some_and(&mut pred))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Capacity
    // ═══════════════════════════════════════════════════════════════════════

    /// Make room for at least `additional` more items without regrowing.
    pub fn grow(&mut self, additional: usize) {
        let needed = self.len.saturating_add(additional);
        if needed > self.buf.len() {
            self.resize(round_capacity(needed));
        }
    }

    /// Set the capacity the deque never shrinks below, rounded up to a power
    /// of two (and at least 16). Grows immediately if needed.
    pub fn set_min_capacity(&mut self, capacity: usize) {
        self.min_capacity = round_capacity(capacity);
        if self.buf.len() < self.min_capacity {
            self.resize(self.min_capacity);
        }
    }

    fn grow_if_full(&mut self) {
        if self.len == self.buf.len() {
            self.resize(self.buf.len() << 1);
        }
    }

    fn shrink_if_sparse(&mut self) {
        if self.buf.len() > self.min_capacity && self.len < self.buf.len() / 4 {
            self.resize(self.buf.len() >> 1);
        }
    }

    /// Shrink as far as the quarter rule allows, in one resize.
    fn shrink_deferred(&mut self) {
        let mut target = self.buf.len();
        while target > self.min_capacity && self.len < target / 4 {
            target >>= 1;
        }
        if target != self.buf.len() {
            self.resize(target);
        }
    }

    fn resize(&mut self, capacity: usize) {
        let mut buf = empty_slots(capacity);
        for (i, slot) in buf.iter_mut().enumerate().take(self.len) {
            let from = self.slot(i);
            *slot = self.buf[from].take();
        }
        self.buf = buf;
        self.head = 0;
        self.tail = self.len & (capacity - 1);
    }
}

fn round_capacity(capacity: usize) -> usize {
    capacity.max(MIN_CAPACITY).next_power_of_two()
}

fn empty_slots<T>(capacity: usize) -> Vec<Option<T>> {
    std::iter::repeat_with(|| None).take(capacity).collect()
}

#[cold]
#[track_caller]
fn out_of_range(op: &str, index: usize, len: usize) -> ! {
    panic!("deque {op}: index {index} out of range for length {len}")
}

impl<T> Default for Deque<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Deque<T> {
    fn clone(&self) -> Self {
        let mut out = Self::with_capacity(self.min_capacity);
        out.grow(self.len);
        out.extend(self.iter().cloned());
        out
    }
}

impl<T: fmt::Debug> fmt::Debug for Deque<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for Deque<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for Deque<T> {}

impl<T> Index<usize> for Deque<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        self.at(index)
    }
}

impl<T> IndexMut<usize> for Deque<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        self.at_mut(index)
    }
}

impl<T> Extend<T> for Deque<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push_back(item);
        }
    }
}

impl<T> FromIterator<T> for Deque<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut deque = Self::new();
        deque.extend(iter);
        deque
    }
}

impl<'a, T> IntoIterator for &'a Deque<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<T> IntoIterator for Deque<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { deque: self }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Iterators
// ═══════════════════════════════════════════════════════════════════════════════

/// Borrowing iterator returned by [`Deque::iter`].
pub struct Iter<'a, T> {
    deque: &'a Deque<T>,
    front: usize,
    back: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.front >= self.back {
            return None;
        }
        let item = self.deque.get(self.front);
        self.front += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.deque.get(self.back)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

/// Destructive front-to-back iterator returned by [`Deque::drain_front`].
pub struct DrainFront<'a, T> {
    deque: &'a mut Deque<T>,
}

impl<T> Iterator for DrainFront<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.deque.pop_front_raw()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.deque.len, Some(self.deque.len))
    }
}

impl<T> Drop for DrainFront<'_, T> {
    fn drop(&mut self) {
        self.deque.shrink_deferred();
    }
}

/// Destructive back-to-front iterator returned by [`Deque::drain_back`].
pub struct DrainBack<'a, T> {
    deque: &'a mut Deque<T>,
}

impl<T> Iterator for DrainBack<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.deque.pop_back_raw()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.deque.len, Some(self.deque.len))
    }
}

impl<T> Drop for DrainBack<'_, T> {
    fn drop(&mut self) {
        self.deque.shrink_deferred();
    }
}

/// Owning iterator.
pub struct IntoIter<T> {
    deque: Deque<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.deque.pop_front_raw()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.deque.len, Some(self.deque.len))
    }
}

impl<T> DoubleEndedIterator for IntoIter<T> {
    fn next_back(&mut self) -> Option<T> {
        self.deque.pop_back_raw()
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}
