//! ruleq-test: helpers for testing code built on ruleq
//!
//! Provides a string-map context builder, a middleware that records what the
//! matcher saw, and (with the `fixtures` feature) the YAML conformance runner.
//!
//! # Example
//!
//! ```
//! use ruleq_test::prelude::*;
//!
//! let ctx = TestContext::new()
//!     .with("name", "alice")
//!     .with("role", "admin")
//!     .build();
//!
//! assert_eq!(ctx.get::<String>("role"), "admin");
//! ```

use parking_lot::Mutex;
use ruleq::prelude::*;
use ruleq::Next;
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "fixtures")]
pub mod fixture;

/// Builder for a [`Context`] holding string values and metadata.
///
/// Keys are kept sorted so the same builder always produces the same
/// fingerprint.
#[derive(Debug, Clone, Default)]
pub struct TestContext {
    values: BTreeMap<String, String>,
    metadata: BTreeMap<String, String>,
}

impl TestContext {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string value (builder pattern).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Add a metadata entry (builder pattern).
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Build a fresh [`Context`].
    #[must_use]
    pub fn build(&self) -> Context {
        let ctx = Context::new();
        for (k, v) in &self.values {
            ctx.with_value(k.as_str(), v.as_str());
        }
        ctx.set_metadata_batch(self.metadata.clone());
        ctx
    }
}

/// Middleware that records the fingerprint of every context it sees and
/// whether the chain produced a result.
#[derive(Debug, Clone, Default)]
pub struct RecordingMiddleware {
    calls: Arc<Mutex<Vec<(String, bool)>>>,
}

impl RecordingMiddleware {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(fingerprint, matched)` pairs in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl<T> Middleware<T> for RecordingMiddleware {
    fn handle(&self, ctx: &Context, next: Next<'_, T>) -> Option<T> {
        let result = next(ctx);
        self.calls
            .lock()
            .push((ruleq::fingerprint(ctx), result.is_some()));
        result
    }
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{RecordingMiddleware, TestContext};
    pub use ruleq::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let builder = TestContext::new().with("foo", "bar").with("baz", "qux");

        assert_eq!(builder.get("foo"), Some("bar"));
        assert_eq!(builder.get("missing"), None);

        let ctx = builder.build();
        assert_eq!(ctx.get::<String>("baz"), "qux");
        assert!(!ctx.contains("missing"));
    }

    #[test]
    fn test_metadata_lands_on_context() {
        let ctx = TestContext::new().with_metadata("trace", "abc").build();
        assert_eq!(ctx.metadata("trace").as_deref(), Some("abc"));
    }

    #[test]
    fn test_recording_middleware() {
        let recorder = RecordingMiddleware::new();
        let matcher: Matcher<&str> = Matcher::new();
        matcher
            .add_rule(ChainRule::new("allowed").when_value("role", StringMatcher::exact("admin")))
            .use_middleware(recorder.clone());

        let admin = TestContext::new().with("role", "admin").build();
        let guest = TestContext::new().with("role", "guest").build();

        assert_eq!(matcher.find(&admin), Some("allowed"));
        assert_eq!(matcher.find(&guest), None);

        let calls = recorder.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1);
        assert!(!calls[1].1);
        assert_ne!(calls[0].0, calls[1].0);
    }
}
