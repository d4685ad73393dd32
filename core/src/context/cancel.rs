//! Cancellation signal shared between a context and everything derived from it.
//!
//! A [`Cancellation`] moves from active to done exactly once. The first
//! transition records why (explicit cancel or deadline) and every later
//! attempt is ignored. Children derived with [`Cancellation::child`] are
//! cancelled with the parent's reason; cancelling a child never touches its
//! parent.
//!
//! Blocking waiters park on a condition variable. Other code can register a
//! wake callback with [`Cancellation::on_cancel`]; the returned
//! [`ListenerGuard`] unregisters it on drop.

use crate::ContextError;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

const ACTIVE: u8 = 0;
const CANCELLED: u8 = 1;
const DEADLINE_EXCEEDED: u8 = 2;

/// Callback run once when a cancellation fires.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Why a cancellation fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `cancel()` was called.
    Cancelled,
    /// The deadline elapsed.
    DeadlineExceeded,
}

impl From<CancelReason> for ContextError {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => ContextError::Cancelled,
            CancelReason::DeadlineExceeded => ContextError::DeadlineExceeded,
        }
    }
}

/// Monotonic cancellation token. Clones share state.
#[derive(Clone, Default)]
pub struct Cancellation {
    inner: Arc<CancellationState>,
}

#[derive(Default)]
struct CancellationState {
    state: AtomicU8,
    listeners: Mutex<Listeners>,
    cond: Condvar,
    // Keeps this token registered with its parent for as long as it lives.
    link: Mutex<Option<ListenerGuard>>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

impl Cancellation {
    /// Create an active token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the token has fired.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != ACTIVE
    }

    /// Returns why the token fired, or `None` while active.
    pub fn reason(&self) -> Option<CancelReason> {
        match self.inner.state.load(Ordering::Acquire) {
            CANCELLED => Some(CancelReason::Cancelled),
            DEADLINE_EXCEEDED => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fire with [`CancelReason::Cancelled`].
    ///
    /// Returns `true` if this call caused the transition.
    pub fn cancel(&self) -> bool {
        self.fire(CancelReason::Cancelled)
    }

    /// Fire with the given reason. Returns `true` if this call caused the
    /// transition.
    pub fn fire(&self, reason: CancelReason) -> bool {
        let code = match reason {
            CancelReason::Cancelled => CANCELLED,
            CancelReason::DeadlineExceeded => DEADLINE_EXCEEDED,
        };
        let fired = {
            let mut listeners = self.inner.listeners.lock();
            if self
                .inner
                .state
                .compare_exchange(ACTIVE, code, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return false;
            }
            self.inner.cond.notify_all();
            std::mem::take(&mut listeners.entries)
        };
        // Run outside the lock so listeners may touch other tokens.
        for (_, listener) in fired {
            listener();
        }
        true
    }

    /// Derive a token that fires when this one does.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        let weak = Arc::downgrade(&child.inner);
        let parent = Arc::downgrade(&self.inner);
        let guard = self.on_cancel(Arc::new(move || {
            let (Some(child), Some(parent)) = (weak.upgrade(), parent.upgrade()) else {
                return;
            };
            let reason = Cancellation { inner: parent }
                .reason()
                .unwrap_or(CancelReason::Cancelled);
            Cancellation { inner: child }.fire(reason);
        }));
        *child.inner.link.lock() = Some(guard);
        child
    }

    /// Register a callback run when the token fires.
    ///
    /// Runs the callback immediately (on this thread) if already fired.
    pub fn on_cancel(&self, listener: Listener) -> ListenerGuard {
        {
            let mut listeners = self.inner.listeners.lock();
            if !self.is_cancelled() {
                let id = listeners.next_id;
                listeners.next_id += 1;
                listeners.entries.push((id, listener));
                return ListenerGuard {
                    state: Arc::downgrade(&self.inner),
                    id: Some(id),
                };
            }
        }
        listener();
        ListenerGuard::inert()
    }

    /// Block until the token fires or `timeout` elapses.
    ///
    /// Returns `true` if the token fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline),
            None => {
                self.wait();
                true
            }
        }
    }

    /// Block until the token fires or `deadline` passes.
    ///
    /// Returns `true` if the token fired.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut listeners = self.inner.listeners.lock();
        while !self.is_cancelled() {
            if self
                .inner
                .cond
                .wait_until(&mut listeners, deadline)
                .timed_out()
            {
                return self.is_cancelled();
            }
        }
        true
    }

    /// Block until the token fires.
    pub fn wait(&self) {
        let mut listeners = self.inner.listeners.lock();
        while !self.is_cancelled() {
            self.inner.cond.wait(&mut listeners);
        }
    }

    /// Number of registered listeners. Exposed for leak tests.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().entries.len()
    }

    /// Returns `true` if both handles share the same token.
    #[must_use]
    pub fn same_token(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancellation")
            .field("reason", &self.reason())
            .finish()
    }
}

/// Unregisters a listener when dropped.
#[must_use = "dropping the guard unregisters the listener"]
pub struct ListenerGuard {
    state: Weak<CancellationState>,
    id: Option<u64>,
}

impl ListenerGuard {
    fn inert() -> Self {
        Self {
            state: Weak::new(),
            id: None,
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let (Some(id), Some(state)) = (self.id, self.state.upgrade()) else {
            return;
        };
        state.listeners.lock().entries.retain(|(entry, _)| *entry != id);
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_cancel_is_monotonic() {
        let c = Cancellation::new();
        assert!(!c.is_cancelled());
        assert!(c.cancel());
        assert!(!c.cancel());
        assert!(!c.fire(CancelReason::DeadlineExceeded));
        assert_eq!(c.reason(), Some(CancelReason::Cancelled));
    }

    #[test]
    fn test_child_inherits_parent_reason() {
        let parent = Cancellation::new();
        let child = parent.child();
        parent.fire(CancelReason::DeadlineExceeded);
        assert!(child.is_cancelled());
        assert_eq!(child.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let parent = Cancellation::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_dropped_child_unregisters() {
        let parent = Cancellation::new();
        let child = parent.child();
        assert_eq!(parent.listener_count(), 1);
        drop(child);
        assert_eq!(parent.listener_count(), 0);
    }

    #[test]
    fn test_listener_runs_once() {
        let c = Cancellation::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _guard = c.on_cancel(Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        c.cancel();
        c.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_on_fired_token_runs_immediately() {
        let c = Cancellation::new();
        c.cancel();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _guard = c.on_cancel(Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_guard_is_not_called() {
        let c = Cancellation::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let guard = c.on_cancel(Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        drop(guard);
        c.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wait_wakes_on_cancel() {
        let c = Cancellation::new();
        let remote = c.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        assert!(c.wait_timeout(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_times_out() {
        let c = Cancellation::new();
        let start = Instant::now();
        assert!(!c.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
