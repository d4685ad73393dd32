//! Middleware wrapped around the rule walk.
//!
//! The chain is a right fold over the registered list with the rule walk as
//! the innermost step, so the first middleware registered runs outermost. A
//! middleware may short-circuit by not calling `next`, or hand `next` a
//! different context.
//!
//! ```
//! use ruleq::{ChainRule, Context, Matcher};
//!
//! let matcher: Matcher<&str> = Matcher::new();
//! matcher.add_rule(ChainRule::new("admin").when(|ctx| ctx.get::<String>("role") == "admin"));
//!
//! // Force every evaluation to run as an admin.
//! matcher.use_fn(|ctx, next| {
//!     let elevated = ctx.clone();
//!     elevated.with_value("role", "admin");
//!     next(&elevated)
//! });
//!
//! assert_eq!(matcher.find(&Context::new()), Some("admin"));
//! ```

use crate::Context;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// The rest of the chain, ending in the rule walk.
pub type Next<'a, T> = &'a dyn Fn(&Context) -> Option<T>;

/// Cross-cutting behavior around rule evaluation.
pub trait Middleware<T>: Send + Sync {
    /// Handle one evaluation. Call `next` to continue the chain.
    fn handle(&self, ctx: &Context, next: Next<'_, T>) -> Option<T>;
}

impl<T, M: Middleware<T> + ?Sized> Middleware<T> for Arc<M> {
    fn handle(&self, ctx: &Context, next: Next<'_, T>) -> Option<T> {
        (**self).handle(ctx, next)
    }
}

impl<T, M: Middleware<T> + ?Sized> Middleware<T> for Box<M> {
    fn handle(&self, ctx: &Context, next: Next<'_, T>) -> Option<T> {
        (**self).handle(ctx, next)
    }
}

/// Run `chain` around `inner`. The first element is outermost.
pub(crate) fn run_chain<T>(
    chain: &[Arc<dyn Middleware<T>>],
    ctx: &Context,
    inner: Next<'_, T>,
) -> Option<T> {
    match chain.split_first() {
        None => inner(ctx),
        Some((first, rest)) => first.handle(ctx, &|ctx: &Context| run_chain(rest, ctx, inner)),
    }
}

/// Adapts a closure into a [`Middleware`].
pub struct FnMiddleware<F>(pub F);

impl<T, F> Middleware<T> for FnMiddleware<F>
where
    F: Fn(&Context, Next<'_, T>) -> Option<T> + Send + Sync,
{
    fn handle(&self, ctx: &Context, next: Next<'_, T>) -> Option<T> {
        (self.0)(ctx, next)
    }
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnMiddleware")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Built-ins
// ═══════════════════════════════════════════════════════════════════════════════

/// Logs each evaluation's outcome and elapsed time at `debug`.
#[derive(Debug, Clone, Default)]
pub struct TracingMiddleware {
    name: Option<String>,
}

impl TracingMiddleware {
    /// Create an unnamed tracing middleware.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Label log lines with a matcher name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

impl<T> Middleware<T> for TracingMiddleware {
    fn handle(&self, ctx: &Context, next: Next<'_, T>) -> Option<T> {
        let start = Instant::now();
        let result = next(ctx);
        tracing::debug!(
            matcher = self.name.as_deref().unwrap_or("matcher"),
            matched = result.is_some(),
            values = ctx.len(),
            elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
            "rule evaluation"
        );
        result
    }
}

/// Stamps a metadata entry on the context before evaluation.
#[derive(Debug, Clone)]
pub struct MetadataTag {
    key: String,
    value: String,
}

impl MetadataTag {
    /// Create a tag that writes `key=value` into the context's metadata.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl<T> Middleware<T> for MetadataTag {
    fn handle(&self, ctx: &Context, next: Next<'_, T>) -> Option<T> {
        ctx.with_metadata(self.key.as_str(), self.value.as_str());
        next(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware<u8> for Record {
        fn handle(&self, ctx: &Context, next: Next<'_, u8>) -> Option<u8> {
            self.log.lock().push(format!("enter {}", self.name));
            let out = next(ctx);
            self.log.lock().push(format!("exit {}", self.name));
            out
        }
    }

    #[test]
    fn test_first_registered_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Middleware<u8>>> = vec![
            Arc::new(Record { name: "a", log: Arc::clone(&log) }),
            Arc::new(Record { name: "b", log: Arc::clone(&log) }),
        ];
        let inner_log = Arc::clone(&log);
        let inner = move |_: &Context| {
            inner_log.lock().push("walk".into());
            Some(1)
        };
        assert_eq!(run_chain(&chain, &Context::new(), &inner), Some(1));
        assert_eq!(
            *log.lock(),
            vec!["enter a", "enter b", "walk", "exit b", "exit a"]
        );
    }

    #[test]
    fn test_short_circuit() {
        let chain: Vec<Arc<dyn Middleware<u8>>> =
            vec![Arc::new(FnMiddleware(|_: &Context, _: Next<'_, u8>| Some(9)))];
        let inner = |_: &Context| -> Option<u8> { panic!("inner must not run") };
        assert_eq!(run_chain(&chain, &Context::new(), &inner), Some(9));
    }

    #[test]
    fn test_empty_chain_runs_inner() {
        let inner = |ctx: &Context| Some(u8::try_from(ctx.len()).unwrap_or(0));
        assert_eq!(run_chain::<u8>(&[], &Context::new(), &inner), Some(0));
    }

    #[test]
    fn test_metadata_tag() {
        let chain: Vec<Arc<dyn Middleware<u8>>> = vec![Arc::new(MetadataTag::new("source", "test"))];
        let ctx = Context::new();
        let inner = |ctx: &Context| ctx.metadata("source").map(|_| 1);
        assert_eq!(run_chain(&chain, &ctx, &inner), Some(1));
        assert_eq!(ctx.metadata("source").as_deref(), Some("test"));
    }

    #[test]
    fn test_tracing_middleware_is_transparent() {
        let chain: Vec<Arc<dyn Middleware<u8>>> = vec![Arc::new(TracingMiddleware::named("t"))];
        assert_eq!(run_chain(&chain, &Context::new(), &|_: &Context| Some(3)), Some(3));
        assert_eq!(run_chain(&chain, &Context::new(), &|_: &Context| None), None);
    }
}
