//! `Rule`: a predicate over a [`Context`] paired with a result payload
//!
//! Rules are immutable once handed to a [`Matcher`](crate::Matcher). Two
//! implementations ship with the crate:
//!
//! - [`ChainRule`]: builder that ANDs any number of predicates and
//!   [`Condition`]s
//! - [`FnRule`]: a single closure
//!
//! IDs are advisory: the matcher does not enforce uniqueness, and
//! [`Matcher::remove_rule`](crate::Matcher::remove_rule) removes every rule
//! carrying the given ID.

use super::condition::{Condition, ValueMatcher};
use crate::{Context, Key};
use std::fmt;
use std::sync::Arc;

/// A prioritized predicate that yields a result when it matches.
///
/// Higher priorities are evaluated first. A panicking [`matches`](Rule::matches)
/// propagates out of the matcher unchanged.
pub trait Rule<T>: Send + Sync {
    /// Stable identifier.
    fn id(&self) -> &str;

    /// Evaluation priority; larger values win.
    fn priority(&self) -> i64;

    /// Disabled rules are skipped without evaluating the predicate.
    fn enabled(&self) -> bool {
        true
    }

    /// Evaluate the predicate.
    fn matches(&self, ctx: &Context) -> bool;

    /// The payload returned when this rule wins.
    fn result(&self) -> T;
}

impl<T, R: Rule<T> + ?Sized> Rule<T> for Box<R> {
    fn id(&self) -> &str {
        (**self).id()
    }
    fn priority(&self) -> i64 {
        (**self).priority()
    }
    fn enabled(&self) -> bool {
        (**self).enabled()
    }
    fn matches(&self, ctx: &Context) -> bool {
        (**self).matches(ctx)
    }
    fn result(&self) -> T {
        (**self).result()
    }
}

impl<T, R: Rule<T> + ?Sized> Rule<T> for Arc<R> {
    fn id(&self) -> &str {
        (**self).id()
    }
    fn priority(&self) -> i64 {
        (**self).priority()
    }
    fn enabled(&self) -> bool {
        (**self).enabled()
    }
    fn matches(&self, ctx: &Context) -> bool {
        (**self).matches(ctx)
    }
    fn result(&self) -> T {
        (**self).result()
    }
}

/// Boxed predicate accepted by [`ChainRule::when`].
pub type Predicate = Box<dyn Fn(&Context) -> bool + Send + Sync>;

/// Generate a default rule ID. UUID v7 strings sort by creation time.
#[must_use]
pub fn generate_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// ChainRule
// ═══════════════════════════════════════════════════════════════════════════════

/// Rule builder whose predicates are ANDed.
///
/// A rule with no predicates always matches.
///
/// ```
/// use ruleq::{ChainRule, Context, Rule, StringMatcher};
///
/// let rule = ChainRule::new("eng-admin")
///     .priority(100)
///     .when_value("role", StringMatcher::exact("admin"))
///     .when(|ctx| ctx.get::<String>("dept") == "eng");
///
/// let ctx = Context::new();
/// ctx.with_value("role", "admin").with_value("dept", "eng");
/// assert!(rule.matches(&ctx));
///
/// ctx.with_value("dept", "sales");
/// assert!(!rule.matches(&ctx));
/// ```
pub struct ChainRule<T> {
    id: String,
    priority: i64,
    enabled: bool,
    result: T,
    predicates: Vec<Predicate>,
}

impl<T> ChainRule<T> {
    /// Start a rule that yields `result`. Priority 0, enabled, generated ID.
    pub fn new(result: T) -> Self {
        Self {
            id: generate_id(),
            priority: 0,
            enabled: true,
            result,
            predicates: Vec::new(),
        }
    }

    /// AND a predicate onto the rule.
    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// AND a value condition onto the rule. A missing key fails the rule.
    #[must_use]
    pub fn when_value(self, key: impl Into<Key>, matcher: impl ValueMatcher + 'static) -> Self {
        self.when_condition(Condition::new(key, matcher))
    }

    /// AND a prebuilt [`Condition`] onto the rule.
    #[must_use]
    pub fn when_condition(self, condition: Condition) -> Self {
        self.when(move |ctx| condition.evaluate(ctx))
    }

    /// Set the priority.
    #[must_use]
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Replace the generated ID.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Enable or disable the rule.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Number of ANDed predicates.
    #[must_use]
    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }
}

impl<T: Clone + Send + Sync> Rule<T> for ChainRule<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i64 {
        self.priority
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn matches(&self, ctx: &Context) -> bool {
        self.predicates.iter().all(|p| p(ctx))
    }

    fn result(&self) -> T {
        self.result.clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for ChainRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainRule")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("result", &self.result)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FnRule
// ═══════════════════════════════════════════════════════════════════════════════

/// A rule backed by a single closure.
pub struct FnRule<T, F> {
    id: String,
    priority: i64,
    result: T,
    predicate: F,
}

impl<T, F> FnRule<T, F>
where
    F: Fn(&Context) -> bool + Send + Sync,
{
    /// Create a rule.
    pub fn new(id: impl Into<String>, priority: i64, result: T, predicate: F) -> Self {
        Self {
            id: id.into(),
            priority,
            result,
            predicate,
        }
    }
}

impl<T, F> Rule<T> for FnRule<T, F>
where
    T: Clone + Send + Sync,
    F: Fn(&Context) -> bool + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i64 {
        self.priority
    }

    fn matches(&self, ctx: &Context) -> bool {
        (self.predicate)(ctx)
    }

    fn result(&self) -> T {
        self.result.clone()
    }
}

impl<T: fmt::Debug, F> fmt::Debug for FnRule<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRule")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}
