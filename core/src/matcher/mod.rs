//! Matcher: priority-ordered rule evaluation over a [`Context`]
//!
//! A [`Matcher<T>`] holds a list of [`Rule<T>`]s and returns the result of the
//! highest-priority enabled rule whose predicate holds. Around that walk it
//! layers a [`Middleware`] chain, an optional fingerprint-keyed result cache,
//! and atomic statistics.
//!
//! # INV: Highest priority wins
//!
//! Rules are evaluated in descending priority. Equal priorities keep their
//! insertion order (stable sort). The first enabled rule that matches ends
//! the walk.
//!
//! # Snapshot publication
//!
//! The rule list lives in an immutable snapshot published through
//! [`ArcSwap`]. Every call loads the snapshot once; writers copy, modify and
//! swap under a writer lock. A snapshot records whether it is sorted, so the
//! lazy sort is double-checked against the snapshot itself: the first
//! evaluation after a mutation sorts and publishes, later ones reuse it.
//!
//! Any rule mutation retires the cache's current generation, so `find` after
//! `add_rule` always sees the new rule, even when a walk over the old rules
//! finishes afterwards.

mod cache;
mod condition;
mod fingerprint;
mod middleware;
mod rule;
mod stats;
mod string_match;
mod trace;

pub use cache::CacheConfig;
pub use condition::{
    BoolMatcher, Condition, EqualsMatcher, PresentMatcher, StringMatcher, ValueMatcher,
};
pub use fingerprint::fingerprint;
pub use middleware::{FnMiddleware, MetadataTag, Middleware, Next, TracingMiddleware};
pub use rule::{generate_id, ChainRule, FnRule, Predicate, Rule};
pub use stats::MatcherStats;
pub use string_match::StringMatchSpec;
pub use trace::{MatchTrace, RuleTrace};

use crate::Context;
use arc_swap::{ArcSwap, ArcSwapOption};
use cache::ResultCache;
use middleware::run_chain;
use parking_lot::Mutex;
use stats::MatchStats;
use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

struct RuleSet<T> {
    rules: Vec<Arc<dyn Rule<T>>>,
    sorted: bool,
}

impl<T> RuleSet<T> {
    fn empty() -> Self {
        Self {
            rules: Vec::new(),
            sorted: true,
        }
    }
}

/// Concurrent, cache-backed rule evaluator.
///
/// All methods take `&self`; share a matcher across threads with `Arc`.
///
/// # Type Parameters
///
/// - `T`: The result payload (must be `Clone + Send + Sync + 'static`)
///
/// # Example
///
/// ```
/// use ruleq::{ChainRule, Context, Matcher};
/// use std::time::Duration;
///
/// let matcher: Matcher<String> = Matcher::new();
/// matcher
///     .add_rule(ChainRule::new("low".to_string()).priority(10))
///     .add_rule(ChainRule::new("high".to_string()).priority(100))
///     .enable_cache(Duration::from_secs(60));
///
/// let ctx = Context::new();
/// assert_eq!(matcher.find(&ctx).as_deref(), Some("high"));
/// assert_eq!(matcher.find_all(&ctx), vec!["high", "low"]);
/// assert_eq!(matcher.stats().cache_misses, 1);
/// ```
pub struct Matcher<T: Clone + Send + Sync + 'static> {
    rules: ArcSwap<RuleSet<T>>,
    writer: Mutex<()>,
    middleware: ArcSwap<Vec<Arc<dyn Middleware<T>>>>,
    cache: ArcSwapOption<ResultCache<T>>,
    stats: MatchStats,
}

impl<T: Clone + Send + Sync + 'static> Matcher<T> {
    /// Create an empty matcher: no rules, no middleware, cache disabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: ArcSwap::from_pointee(RuleSet::empty()),
            writer: Mutex::new(()),
            middleware: ArcSwap::from_pointee(Vec::new()),
            cache: ArcSwapOption::empty(),
            stats: MatchStats::default(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Rules
    // ═══════════════════════════════════════════════════════════════════════

    /// Add a rule. Visible to every evaluation that starts after this returns.
    pub fn add_rule(&self, rule: impl Rule<T> + 'static) -> &Self {
        self.add_rules(std::iter::once(rule))
    }

    /// Add several rules in one publication.
    pub fn add_rules<I, R>(&self, rules: I) -> &Self
    where
        I: IntoIterator<Item = R>,
        R: Rule<T> + 'static,
    {
        self.mutate(|current| {
            current.extend(
                rules
                    .into_iter()
                    .map(|r| Arc::new(r) as Arc<dyn Rule<T>>),
            );
        });
        self
    }

    /// Remove every rule with the given ID.
    pub fn remove_rule(&self, id: &str) -> &Self {
        self.mutate(|current| {
            let before = current.len();
            current.retain(|r| r.id() != id);
            if current.len() == before {
                tracing::debug!(id, "remove_rule: no rule with this id");
            }
        });
        self
    }

    /// Remove all rules.
    pub fn clear_rules(&self) -> &Self {
        self.mutate(Vec::clear);
        self
    }

    fn mutate(&self, f: impl FnOnce(&mut Vec<Arc<dyn Rule<T>>>)) {
        {
            let _writer = self.writer.lock();
            let mut rules = self.rules.load().rules.clone();
            f(&mut rules);
            self.rules.store(Arc::new(RuleSet {
                rules,
                sorted: false,
            }));
        }
        if let Some(cache) = self.cache.load().as_ref() {
            cache.invalidate();
        }
    }

    /// The current snapshot, sorted by descending priority.
    fn sorted_rules(&self) -> Arc<RuleSet<T>> {
        let current = self.rules.load_full();
        if current.sorted {
            return current;
        }
        let _writer = self.writer.lock();
        let current = self.rules.load_full();
        if current.sorted {
            return current;
        }
        let mut rules = current.rules.clone();
        rules.sort_by_key(|r| Reverse(r.priority()));
        let sorted = Arc::new(RuleSet {
            rules,
            sorted: true,
        });
        self.rules.store(Arc::clone(&sorted));
        tracing::trace!(rules = sorted.rules.len(), "published sorted rule set");
        sorted
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.load().rules.len()
    }

    /// Returns `true` if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.load().rules.is_empty()
    }

    /// Returns `true` if the published rule list is already in evaluation
    /// order.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.rules.load().sorted
    }

    /// Rule IDs in evaluation order.
    #[must_use]
    pub fn rule_ids(&self) -> Vec<String> {
        self.sorted_rules()
            .rules
            .iter()
            .map(|r| r.id().to_string())
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Middleware & cache
    // ═══════════════════════════════════════════════════════════════════════

    /// Append a middleware. The first one registered runs outermost.
    pub fn use_middleware(&self, middleware: impl Middleware<T> + 'static) -> &Self {
        let _writer = self.writer.lock();
        let mut chain = Vec::clone(&self.middleware.load());
        chain.push(Arc::new(middleware));
        self.middleware.store(Arc::new(chain));
        self
    }

    /// Append a closure middleware.
    pub fn use_fn<F>(&self, f: F) -> &Self
    where
        F: Fn(&Context, Next<'_, T>) -> Option<T> + Send + Sync + 'static,
    {
        self.use_middleware(FnMiddleware(f))
    }

    /// Number of registered middleware.
    #[must_use]
    pub fn middleware_len(&self) -> usize {
        self.middleware.load().len()
    }

    /// Enable (or reset) the result cache with the given TTL.
    pub fn enable_cache(&self, ttl: Duration) -> &Self {
        self.with_cache_config(CacheConfig::new(ttl))
    }

    /// Enable (or reset) the result cache.
    pub fn with_cache_config(&self, config: CacheConfig) -> &Self {
        self.cache.store(Some(Arc::new(ResultCache::new(config))));
        tracing::debug!(ttl_ms = config.ttl.as_millis(), "matcher cache enabled");
        self
    }

    /// Disable and drop the result cache.
    pub fn disable_cache(&self) -> &Self {
        self.cache.store(None);
        self
    }

    /// The active cache configuration, if caching is enabled.
    #[must_use]
    pub fn cache_config(&self) -> Option<CacheConfig> {
        self.cache.load().as_ref().map(|c| c.config())
    }

    /// Number of cached fingerprints, including expired ones not yet read.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.load().as_ref().map_or(0, |c| c.len())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Stats
    // ═══════════════════════════════════════════════════════════════════════

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> MatcherStats {
        self.stats.snapshot()
    }

    /// Zero every counter.
    pub fn reset_stats(&self) -> &Self {
        self.stats.reset();
        self
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Evaluation
    // ═══════════════════════════════════════════════════════════════════════

    /// Return the result of the highest-priority enabled rule that matches.
    ///
    /// Returns `None` for an expired context without evaluating anything.
    /// With the cache enabled, structurally equal contexts (same local
    /// values) share a cached outcome until it expires.
    pub fn find(&self, ctx: &Context) -> Option<T> {
        self.stats.record_call();
        if ctx.is_expired() {
            self.stats.record_outcome(false);
            return None;
        }

        let cache = self.cache.load_full();
        // Read before the walk loads the rules: a walk over a rule set that
        // is replaced meanwhile carries a retired generation.
        let generation = cache.as_ref().map_or(0, |c| c.generation());
        let key = cache.as_ref().map(|_| fingerprint(ctx));
        if let (Some(cache), Some(key)) = (&cache, &key) {
            if let Some(hit) = cache.get(key) {
                self.stats.record_hit();
                self.stats.record_outcome(hit.is_some());
                return hit;
            }
            self.stats.record_miss();
        }

        let chain = self.middleware.load();
        let result = run_chain(chain.as_slice(), ctx, &|ctx: &Context| self.walk(ctx));

        if let (Some(cache), Some(key)) = (cache, key) {
            cache.insert(key, result.clone(), generation);
        }
        self.stats.record_outcome(result.is_some());
        result
    }

    fn walk(&self, ctx: &Context) -> Option<T> {
        let set = self.sorted_rules();
        for rule in set.rules.iter().filter(|r| r.enabled()) {
            let matched = rule.matches(ctx);
            tracing::trace!(id = rule.id(), priority = rule.priority(), matched, "rule");
            if matched {
                return Some(rule.result());
            }
        }
        None
    }

    /// Return every enabled match in priority order.
    ///
    /// Never reads or writes the cache and skips middleware.
    pub fn find_all(&self, ctx: &Context) -> Vec<T> {
        self.stats.record_call();
        if ctx.is_expired() {
            self.stats.record_outcome(false);
            return Vec::new();
        }

        let set = self.sorted_rules();
        let results: Vec<T> = set
            .rules
            .iter()
            .filter(|r| r.enabled() && r.matches(ctx))
            .map(|r| r.result())
            .collect();
        self.stats.record_outcome(!results.is_empty());
        results
    }

    /// Evaluate every rule without short-circuit and report what each did.
    ///
    /// No cache, no middleware, no stats.
    pub fn explain(&self, ctx: &Context) -> MatchTrace<T> {
        if ctx.is_expired() {
            return MatchTrace {
                result: None,
                steps: Vec::new(),
                expired: true,
            };
        }

        let set = self.sorted_rules();
        let mut result = None;
        let steps = set
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                let enabled = rule.enabled();
                let matched = enabled && rule.matches(ctx);
                if matched && result.is_none() {
                    result = Some(rule.result());
                }
                RuleTrace {
                    index,
                    id: rule.id().to_string(),
                    priority: rule.priority(),
                    enabled,
                    matched,
                }
            })
            .collect();

        MatchTrace {
            result,
            steps,
            expired: false,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Matcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for Matcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("rules", &self.len())
            .field("sorted", &self.is_sorted())
            .field("middleware", &self.middleware_len())
            .field("cache", &self.cache_config())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn always(result: &'static str, priority: i64) -> ChainRule<&'static str> {
        ChainRule::new(result).id(result).priority(priority)
    }

    fn role_is(role: &'static str) -> impl Fn(&Context) -> bool + Send + Sync + 'static {
        move |ctx| ctx.get::<String>("role") == role
    }

    #[test]
    fn test_empty_matcher() {
        let m: Matcher<u8> = Matcher::new();
        let ctx = Context::new();
        assert_eq!(m.find(&ctx), None);
        assert!(m.find_all(&ctx).is_empty());
        assert!(m.is_empty());
    }

    #[test]
    fn test_priority_wins() {
        let m = Matcher::new();
        m.add_rule(always("low", 10))
            .add_rule(always("high", 100))
            .add_rule(always("mid", 50));
        assert_eq!(m.find(&Context::new()), Some("high"));
        assert_eq!(m.find_all(&Context::new()), vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_equal_priority_keeps_insertion_order() {
        let m = Matcher::new();
        m.add_rule(always("first", 5)).add_rule(always("second", 5));
        assert_eq!(m.find(&Context::new()), Some("first"));
        assert_eq!(m.rule_ids(), vec!["first", "second"]);
    }

    #[test]
    fn test_lazy_sort() {
        let m = Matcher::new();
        assert!(m.is_sorted());
        m.add_rule(always("a", 1)).add_rule(always("b", 2));
        assert!(!m.is_sorted());
        m.find(&Context::new());
        assert!(m.is_sorted());
        m.find(&Context::new());
        assert!(m.is_sorted());
        m.add_rule(always("c", 3));
        assert!(!m.is_sorted());
        assert_eq!(m.find(&Context::new()), Some("c"));
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let m = Matcher::new();
        m.add_rule(always("off", 100).enabled(false))
            .add_rule(always("on", 1));
        assert_eq!(m.find(&Context::new()), Some("on"));
        assert_eq!(m.find_all(&Context::new()), vec!["on"]);
    }

    #[test]
    fn test_predicate_and() {
        let m = Matcher::new();
        m.add_rule(
            ChainRule::new("eng-admin")
                .when(role_is("admin"))
                .when(|ctx| ctx.get::<String>("dept") == "eng"),
        );
        let ctx = Context::new();
        ctx.with_value("role", "admin").with_value("dept", "eng");
        assert_eq!(m.find(&ctx), Some("eng-admin"));
        ctx.with_value("dept", "sales");
        assert_eq!(m.find(&ctx), None);
    }

    #[test]
    fn test_remove_and_clear() {
        let m = Matcher::new();
        m.add_rule(always("a", 2)).add_rule(always("b", 1));
        m.remove_rule("a");
        assert_eq!(m.find(&Context::new()), Some("b"));
        m.remove_rule("missing");
        assert_eq!(m.len(), 1);
        m.clear_rules();
        assert!(m.is_empty());
        assert_eq!(m.find(&Context::new()), None);
    }

    #[test]
    fn test_expired_context_is_failure() {
        let m = Matcher::new();
        m.add_rule(always("x", 1));
        let ctx = Context::new();
        ctx.with_cancel();
        ctx.cancel();
        assert_eq!(m.find(&ctx), None);
        assert!(m.find_all(&ctx).is_empty());
        assert!(m.explain(&ctx).expired);
        let stats = m.stats();
        assert_eq!(stats.total_matches, 2);
        assert_eq!(stats.failed_matches, 2);
    }

    #[test]
    fn test_cache_hit() {
        let m = Matcher::new();
        m.add_rule(ChainRule::new("admin-result").when(role_is("admin")))
            .enable_cache(Duration::from_secs(60));

        let first = Context::new();
        first.with_value("role", "admin");
        assert_eq!(m.find(&first), Some("admin-result"));
        let stats = m.stats();
        assert_eq!((stats.cache_misses, stats.cache_hits), (1, 0));

        let second = Context::new();
        second.with_value("role", "admin");
        assert_eq!(m.find(&second), Some("admin-result"));
        let stats = m.stats();
        assert_eq!((stats.cache_misses, stats.cache_hits), (1, 1));
        assert_eq!(stats.success_matches, 2);
    }

    #[test]
    fn test_cache_stores_misses_too() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let m = Matcher::new();
        m.add_rule(ChainRule::new(1u8).when(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        }))
        .enable_cache(Duration::from_secs(60));

        let ctx = Context::new();
        assert_eq!(m.find(&ctx), None);
        assert_eq!(m.find(&ctx), None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(m.stats().failed_matches, 2);
    }

    #[test]
    fn test_cache_expires() {
        let m = Matcher::new();
        m.add_rule(always("x", 1))
            .enable_cache(Duration::from_millis(10));
        let ctx = Context::new();
        m.find(&ctx);
        thread::sleep(Duration::from_millis(20));
        m.find(&ctx);
        let stats = m.stats();
        assert_eq!((stats.cache_misses, stats.cache_hits), (2, 0));
    }

    #[test]
    fn test_add_rule_invalidates_cache() {
        let m = Matcher::new();
        m.add_rule(always("old", 1))
            .enable_cache(Duration::from_secs(60));
        let ctx = Context::new();
        assert_eq!(m.find(&ctx), Some("old"));
        assert_eq!(m.cache_len(), 1);
        m.add_rule(always("new", 2));
        assert_eq!(m.cache_len(), 0);
        assert_eq!(m.find(&ctx), Some("new"));
    }

    #[test]
    fn test_walk_racing_add_rule_does_not_poison_cache() {
        let started = Arc::new(Barrier::new(2));
        let resume = Arc::new(Barrier::new(2));
        let armed = Arc::new(AtomicBool::new(true));

        let m = Arc::new(Matcher::new());
        {
            let (started, resume, armed) =
                (Arc::clone(&started), Arc::clone(&resume), Arc::clone(&armed));
            m.add_rule(always("old", 1).when(move |_| {
                if armed.swap(false, Ordering::SeqCst) {
                    started.wait();
                    resume.wait();
                }
                true
            }));
        }
        m.enable_cache(Duration::from_secs(60));

        let slow = {
            let m = Arc::clone(&m);
            thread::spawn(move || m.find(&Context::new()))
        };
        started.wait();
        m.add_rule(always("new", 100));
        resume.wait();

        // The walk began before the new rule existed.
        assert_eq!(slow.join().unwrap(), Some("old"));
        assert_eq!(m.find(&Context::new()), Some("new"));
        assert_eq!(m.stats().cache_hits, 0);
        assert_eq!(m.find(&Context::new()), Some("new"));
        assert_eq!(m.stats().cache_hits, 1);
    }

    #[test]
    fn test_cache_keeps_string_and_integer_apart() {
        let m = Matcher::new();
        m.add_rule(ChainRule::new("hit").when_value("level", StringMatcher::exact("3")))
            .enable_cache(Duration::from_secs(60));

        let text = Context::new();
        text.with_value("level", "3");
        assert_eq!(m.find(&text), Some("hit"));

        let number = Context::new();
        number.with_value("level", 3i64);
        assert_eq!(m.find(&number), None);
        assert_eq!(m.stats().cache_hits, 0);
    }

    #[test]
    fn test_cache_keeps_embedded_separators_apart() {
        let m = Matcher::new();
        m.add_rule(
            ChainRule::new("b-set")
                .when_value("a", StringMatcher::exact("1"))
                .when_value("b", StringMatcher::exact("2")),
        )
        .enable_cache(Duration::from_secs(60));

        let split = Context::new();
        split.with_value("a", "1").with_value("b", "2");
        assert_eq!(m.find(&split), Some("b-set"));

        let packed = Context::new();
        packed.with_value("a", "1;b=2");
        assert_eq!(m.find(&packed), None);
        assert_eq!(m.cache_len(), 2);
    }

    #[test]
    fn test_find_all_ignores_cache() {
        let m = Matcher::new();
        m.add_rule(always("x", 1))
            .enable_cache(Duration::from_secs(60));
        m.find_all(&Context::new());
        assert_eq!(m.cache_len(), 0);
        let stats = m.stats();
        assert_eq!((stats.cache_misses, stats.cache_hits), (0, 0));
    }

    #[test]
    fn test_disable_cache() {
        let m = Matcher::new();
        m.add_rule(always("x", 1)).enable_cache(Duration::from_secs(60));
        assert!(m.cache_config().is_some());
        m.disable_cache();
        assert!(m.cache_config().is_none());
        m.find(&Context::new());
        assert_eq!(m.stats().cache_misses, 0);
    }

    #[test]
    fn test_middleware_short_circuit_and_rewrite() {
        let m = Matcher::new();
        m.add_rule(ChainRule::new("admin").when(role_is("admin")));
        m.use_fn(|ctx, next| {
            if ctx.contains("blocked") {
                return None;
            }
            next(ctx)
        });
        m.use_fn(|ctx, next| {
            let rewritten = ctx.clone();
            rewritten.with_value("role", "admin");
            next(&rewritten)
        });
        assert_eq!(m.middleware_len(), 2);

        let ctx = Context::new();
        assert_eq!(m.find(&ctx), Some("admin"));
        assert!(ctx.value("role").is_none());

        ctx.with_value("blocked", true);
        assert_eq!(m.find(&ctx), None);
    }

    #[test]
    fn test_metadata_tag_middleware() {
        let m = Matcher::new();
        m.add_rule(always("x", 1))
            .use_middleware(MetadataTag::new("matched_by", "ruleq"));
        let ctx = Context::new();
        m.find(&ctx);
        assert_eq!(ctx.metadata("matched_by").as_deref(), Some("ruleq"));
    }

    #[test]
    fn test_explain_walks_everything() {
        let m = Matcher::new();
        m.add_rule(always("a", 3))
            .add_rule(always("b", 2).enabled(false))
            .add_rule(ChainRule::new("c").id("c").priority(1).when(|_| false));
        let trace = m.explain(&Context::new());
        assert_eq!(trace.result, Some("a"));
        assert_eq!(trace.steps.len(), 3);
        assert!(!trace.steps[1].enabled && !trace.steps[1].matched);
        assert!(!trace.steps[2].matched);
        assert_eq!(m.stats(), MatcherStats::default());
    }

    #[test]
    fn test_reset_stats() {
        let m: Matcher<u8> = Matcher::new();
        m.find(&Context::new());
        m.reset_stats();
        assert_eq!(m.stats(), MatcherStats::default());
    }

    #[test]
    fn test_concurrent_find_and_add() {
        let m = Arc::new(Matcher::new());
        m.add_rule(always("base", 0));
        let writer = {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for i in 1..=100 {
                    m.add_rule(ChainRule::new("later").priority(i));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for _ in 0..200 {
                        assert!(m.find(&Context::new()).is_some());
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(m.len(), 101);
        assert_eq!(m.stats().total_matches, 800);
    }
}
