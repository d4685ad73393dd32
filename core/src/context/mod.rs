//! Context: keyed values, deadline, cancellation and metadata
//!
//! A [`Context`] is the one collaborator shared by the matcher and the
//! queues. It is mutated through `&self` builder methods that return `&Self`,
//! so a single instance can be shared behind an `Arc` and still be extended:
//!
//! ```
//! use ruleq::Context;
//! use std::time::Duration;
//!
//! let ctx = Context::new();
//! ctx.with_value("role", "admin")
//!     .with_value("level", 3i64)
//!     .with_metadata("request_id", "r-1")
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ctx.get::<String>("role"), "admin");
//! assert_eq!(ctx.get::<i64>("level"), 3);
//! assert!(!ctx.is_expired());
//! ```
//!
//! # Lookup
//!
//! [`Context::value`] reads the local map first and falls back to the parent.
//! [`Context::range`], [`Context::remove`] and fingerprinting only ever see
//! local entries.
//!
//! # Expiry
//!
//! A context is expired once its own token fires, its deadline passes, or any
//! ancestor is expired. Deadline expiry is observed lazily: the first reader
//! to notice fires the token with [`CancelReason::DeadlineExceeded`], which
//! also cascades to tokens derived from it.

mod cancel;
#[cfg(feature = "json")]
mod codec;
mod duration;
mod key;
mod pool;
mod timeout;
mod value;

pub use cancel::{CancelReason, Cancellation, Listener, ListenerGuard};
pub use duration::parse_duration;
pub use key::Key;
pub use pool::{BufferPool, SIZE_CLASSES};
pub use timeout::{or_background, with_timeout, with_timeout_in, with_timeout_value};
pub use value::{FromValue, Value};

use crate::ContextError;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

static REPARENT: Mutex<()> = parking_lot::const_mutex(());

/// Shared, mutable carrier of values, deadline, cancellation and metadata.
///
/// `Clone` is a deep copy of the local values and metadata; the parent,
/// deadline and cancellation token are shared with the copy.
pub struct Context {
    values: RwLock<HashMap<Key, Value>>,
    lineage: RwLock<Lineage>,
    metadata: DashMap<String, String>,
}

#[derive(Clone, Default)]
struct Lineage {
    parent: Option<Arc<Context>>,
    deadline: Option<Instant>,
    cancellation: Cancellation,
    pool: Option<Arc<BufferPool>>,
}

/// Keeps `on_done` listeners registered; unregisters them on drop.
#[derive(Debug)]
#[must_use = "dropping the guard unregisters the listener"]
pub struct DoneGuard {
    _guards: Vec<ListenerGuard>,
}

impl Context {
    /// Create an empty root context: no parent, no deadline, not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            lineage: RwLock::new(Lineage::default()),
            metadata: DashMap::new(),
        }
    }

    /// Alias for [`Context::new`], for call sites that want to read as
    /// "a fresh root".
    #[must_use]
    pub fn background() -> Self {
        Self::new()
    }

    /// Create an empty context whose parent is `parent`.
    #[must_use]
    pub fn child_of(parent: Arc<Context>) -> Self {
        let ctx = Self::new();
        ctx.with_parent(parent);
        ctx
    }

    // ───────────────────────────────────────────────────────────────────────
    // Lineage
    // ───────────────────────────────────────────────────────────────────────

    /// Set the fallback context for value lookup, deadline and cancellation.
    ///
    /// A parent that is this context, or has it as an ancestor, would close
    /// a cycle and is ignored.
    pub fn with_parent(&self, parent: Arc<Context>) -> &Self {
        // Serializes check-then-set so two contexts cannot adopt each other
        // concurrently.
        let _guard = REPARENT.lock();
        if parent.has_ancestor_or_self(self) {
            tracing::warn!("ignoring parent that would make the context its own ancestor");
            return self;
        }
        self.lineage.write().parent = Some(parent);
        self
    }

    fn has_ancestor_or_self(&self, target: &Context) -> bool {
        if std::ptr::eq(self, target) {
            return true;
        }
        let mut node = self.parent();
        while let Some(current) = node {
            if std::ptr::eq(Arc::as_ptr(&current), target) {
                return true;
            }
            node = current.parent();
        }
        false
    }

    /// Returns the parent, if any.
    pub fn parent(&self) -> Option<Arc<Context>> {
        self.lineage.read().parent.clone()
    }

    /// Derive a fresh cancellation token from the current one.
    ///
    /// After this call, [`Context::cancel`] no longer affects contexts that
    /// shared the previous token, while cancelling the previous token still
    /// cancels this context.
    pub fn with_cancel(&self) -> &Self {
        let mut lineage = self.lineage.write();
        lineage.cancellation = lineage.cancellation.child();
        drop(lineage);
        self
    }

    /// Bound the lifetime to `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> &Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.with_cancel(),
        }
    }

    /// Bound the lifetime to an absolute instant. Implies [`Context::with_cancel`].
    pub fn with_deadline(&self, deadline: Instant) -> &Self {
        let mut lineage = self.lineage.write();
        lineage.cancellation = lineage.cancellation.child();
        lineage.deadline = Some(deadline);
        drop(lineage);
        self
    }

    /// The effective deadline: the earliest of this context's and its
    /// ancestors'.
    pub fn deadline(&self) -> Option<Instant> {
        let (own, parent) = {
            let lineage = self.lineage.read();
            (lineage.deadline, lineage.parent.clone())
        };
        let inherited = parent.and_then(|p| p.deadline());
        match (own, inherited) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire this context's cancellation token.
    pub fn cancel(&self) {
        let token = self.lineage.read().cancellation.clone();
        token.cancel();
    }

    /// This context's own cancellation token (ancestors not included).
    pub fn cancellation(&self) -> Cancellation {
        self.lineage.read().cancellation.clone()
    }

    /// Why this context is done, or `None` while it is live.
    pub fn err(&self) -> Option<ContextError> {
        let (token, deadline, parent) = {
            let lineage = self.lineage.read();
            (
                lineage.cancellation.clone(),
                lineage.deadline,
                lineage.parent.clone(),
            )
        };
        if let Some(reason) = token.reason() {
            return Some(reason.into());
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            token.fire(CancelReason::DeadlineExceeded);
            return Some(
                token
                    .reason()
                    .unwrap_or(CancelReason::DeadlineExceeded)
                    .into(),
            );
        }
        parent.and_then(|p| p.err())
    }

    /// Returns `true` once cancelled, past the deadline, or an ancestor is.
    pub fn is_expired(&self) -> bool {
        self.err().is_some()
    }

    /// Register a callback run when this context or any current ancestor is
    /// cancelled.
    ///
    /// Deadlines are not timers: a deadline only fires listeners once some
    /// reader observes it. Blocking code should also wait with a timeout of
    /// [`Context::deadline`].
    pub fn on_done(&self, listener: Listener) -> DoneGuard {
        let mut guards = Vec::new();
        let mut next = Some(self.lineage_snapshot());
        while let Some((token, parent)) = next {
            guards.push(token.on_cancel(Arc::clone(&listener)));
            next = parent.map(|p| p.lineage_snapshot());
        }
        DoneGuard { _guards: guards }
    }

    /// Block until the context is done or `timeout` elapses.
    ///
    /// Returns `true` if the context is done.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let limit = Instant::now().checked_add(timeout);
        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let remote = Arc::clone(&signal);
        let _guard = self.on_done(Arc::new(move || {
            *remote.0.lock() = true;
            remote.1.notify_all();
        }));

        loop {
            if self.is_expired() {
                return true;
            }
            if limit.is_some_and(|l| Instant::now() >= l) {
                return false;
            }
            let wake = match (limit, self.deadline()) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            let mut fired = signal.0.lock();
            if !*fired {
                match wake {
                    Some(at) => {
                        let _ = signal.1.wait_until(&mut fired, at);
                    }
                    None => signal.1.wait(&mut fired),
                }
            }
        }
    }

    /// Returns `true` if this context's token or any ancestor's has fired.
    ///
    /// Unlike [`Context::err`] this never fires a token, so it is safe to call
    /// while holding a lock that an `on_done` listener also takes.
    pub(crate) fn is_signalled(&self) -> bool {
        let mut next = Some(self.lineage_snapshot());
        while let Some((token, parent)) = next {
            if token.is_cancelled() {
                return true;
            }
            next = parent.map(|p| p.lineage_snapshot());
        }
        false
    }

    fn lineage_snapshot(&self) -> (Cancellation, Option<Arc<Context>>) {
        let lineage = self.lineage.read();
        (lineage.cancellation.clone(), lineage.parent.clone())
    }

    // ───────────────────────────────────────────────────────────────────────
    // Values
    // ───────────────────────────────────────────────────────────────────────

    /// Attach a buffer pool used for byte values written after this call.
    pub fn with_buffer_pool(&self, pool: Arc<BufferPool>) -> &Self {
        self.lineage.write().pool = Some(pool);
        self
    }

    /// Store a value, overwriting any previous one under the same key.
    ///
    /// Invalid keys are logged and skipped.
    pub fn with_value(&self, key: impl Into<Key>, value: impl Into<Value>) -> &Self {
        if let Err(e) = self.try_with_value(key, value) {
            tracing::warn!(error = %e, "context value rejected");
        }
        self
    }

    /// Store a value, reporting invalid keys.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::InvalidKey`] for the nil key.
    pub fn try_with_value(
        &self,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<&Self, ContextError> {
        let key = key.into();
        key.validate()?;
        let value = match value.into() {
            Value::Bytes(bytes) => match self.lineage.read().pool.as_ref() {
                Some(pool) => Value::Bytes(pool.copy_from(&bytes)),
                None => Value::Bytes(bytes),
            },
            other => other,
        };
        self.values.write().insert(key, value);
        Ok(self)
    }

    /// Look a value up locally, then in the parent chain.
    pub fn value(&self, key: impl Into<Key>) -> Option<Value> {
        self.lookup(&key.into())
    }

    fn lookup(&self, key: &Key) -> Option<Value> {
        if let Some(v) = self.values.read().get(key) {
            return Some(v.clone());
        }
        let parent = self.lineage.read().parent.clone();
        parent.and_then(|p| p.lookup(key))
    }

    /// Look a value up and panic if it is missing.
    ///
    /// # Panics
    ///
    /// Panics when neither this context nor any ancestor holds `key`.
    pub fn must_value(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        match self.lookup(&key) {
            Some(v) => v,
            None => panic!("context has no value for key {key:?}"),
        }
    }

    /// Typed read with coercion. Returns `T::default()` when the key is
    /// missing or the value cannot be coerced.
    pub fn get<T: FromValue + Default>(&self, key: impl Into<Key>) -> T {
        self.try_get(key).unwrap_or_default()
    }

    /// Typed read with coercion.
    pub fn try_get<T: FromValue>(&self, key: impl Into<Key>) -> Option<T> {
        self.value(key).and_then(|v| T::from_value(&v))
    }

    /// Returns `true` if the key resolves locally or through a parent.
    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.value(key).is_some()
    }

    /// Visit local entries under the read lock until `f` returns `false`.
    ///
    /// `f` must not write to this context.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&Key, &Value) -> bool,
    {
        let values = self.values.read();
        for (k, v) in values.iter() {
            if !f(k, v) {
                break;
            }
        }
    }

    /// Remove a local entry. The parent is never touched.
    pub fn remove(&self, key: impl Into<Key>) -> Option<Value> {
        self.values.write().remove(&key.into())
    }

    /// Number of local entries.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns `true` when there are no local entries.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Run `f` over the local value map under the read lock.
    pub(crate) fn with_local_values<R>(&self, f: impl FnOnce(&HashMap<Key, Value>) -> R) -> R {
        f(&self.values.read())
    }

    // ───────────────────────────────────────────────────────────────────────
    // Metadata
    // ───────────────────────────────────────────────────────────────────────

    /// Set a metadata entry.
    pub fn with_metadata(&self, key: impl Into<String>, value: impl Into<String>) -> &Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Read a metadata entry.
    pub fn metadata(&self, key: &str) -> Option<String> {
        self.metadata.get(key).map(|v| v.value().clone())
    }

    /// Set many metadata entries.
    pub fn set_metadata_batch<I, K, V>(&self, entries: I) -> &Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in entries {
            self.metadata.insert(k.into(), v.into());
        }
        self
    }

    /// Snapshot of all metadata entries.
    pub fn all_metadata(&self) -> HashMap<String, String> {
        self.metadata
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Remove a metadata entry.
    pub fn remove_metadata(&self, key: &str) -> Option<String> {
        self.metadata.remove(key).map(|(_, v)| v)
    }
}

/// Build a context whose parent is the first input's parent and whose values
/// are the union of every input's local values, last write wins.
///
/// ```
/// use ruleq::{merge_contexts, Context};
///
/// let a = Context::new();
/// a.with_value("k", "a").with_value("only_a", 1i64);
/// let b = Context::new();
/// b.with_value("k", "b");
///
/// let merged = merge_contexts(&[&a, &b]);
/// assert_eq!(merged.get::<String>("k"), "b");
/// assert_eq!(merged.get::<i64>("only_a"), 1);
/// ```
pub fn merge_contexts(contexts: &[&Context]) -> Context {
    let merged = Context::new();
    if let Some(parent) = contexts.first().and_then(|c| c.parent()) {
        merged.with_parent(parent);
    }
    for ctx in contexts {
        ctx.range(|k, v| {
            merged.values.write().insert(k.clone(), v.clone());
            true
        });
    }
    merged
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Context {
    fn clone(&self) -> Self {
        let metadata = DashMap::with_capacity(self.metadata.len());
        for entry in &self.metadata {
            metadata.insert(entry.key().clone(), entry.value().clone());
        }
        Self {
            values: RwLock::new(self.values.read().clone()),
            lineage: RwLock::new(self.lineage.read().clone()),
            metadata,
        }
    }
}

impl<K: Into<Key>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let ctx = Context::new();
        for (k, v) in iter {
            ctx.with_value(k, v);
        }
        ctx
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lineage = self.lineage.read();
        f.debug_struct("Context")
            .field("values", &*self.values.read())
            .field("metadata_len", &self.metadata.len())
            .field("has_parent", &lineage.parent.is_some())
            .field("deadline", &lineage.deadline)
            .field("cancellation", &lineage.cancellation)
            .finish()
    }
}
