//! Evaluation trace types for debugging rule order and predicates.
//!
//! [`Matcher::explain`](crate::Matcher::explain) walks every rule in
//! evaluation order without short-circuiting and records what each one did.
//!
//! # INV: `result` == `find()` result
//!
//! For a live context, `result` always equals what
//! [`Matcher::find`](crate::Matcher::find) would return without middleware.
//!
//! ```
//! use ruleq::{ChainRule, Context, Matcher};
//!
//! let matcher: Matcher<&str> = Matcher::new();
//! matcher.add_rule(ChainRule::new("a").id("a").priority(1).when(|_| true));
//! matcher.add_rule(ChainRule::new("b").id("b").priority(2).when(|_| false));
//!
//! let trace = matcher.explain(&Context::new());
//! assert_eq!(trace.result, Some("a"));
//! assert_eq!(trace.steps[0].id, "b");
//! assert_eq!(trace.winner(), Some("a"));
//! ```

use std::fmt;

/// Full trace of one evaluation.
pub struct MatchTrace<T> {
    /// The first matching result, as `find()` would return it.
    pub result: Option<T>,
    /// One step per rule, in evaluation order.
    pub steps: Vec<RuleTrace>,
    /// Set when the context was already done; no rule was evaluated.
    pub expired: bool,
}

impl<T> MatchTrace<T> {
    /// ID of the rule that produced `result`.
    #[must_use]
    pub fn winner(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.enabled && s.matched)
            .map(|s| s.id.as_str())
    }

    /// IDs of every enabled rule that matched, in priority order.
    #[must_use]
    pub fn matched_ids(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.enabled && s.matched)
            .map(|s| s.id.as_str())
            .collect()
    }
}

impl<T: fmt::Debug> fmt::Debug for MatchTrace<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchTrace")
            .field("result", &self.result)
            .field("steps", &self.steps)
            .field("expired", &self.expired)
            .finish()
    }
}

/// One rule's evaluation in a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTrace {
    /// Position in evaluation order (0-based).
    pub index: usize,
    /// Rule ID.
    pub id: String,
    /// Rule priority.
    pub priority: i64,
    /// Whether the rule was enabled. Disabled rules are never evaluated.
    pub enabled: bool,
    /// Whether the predicate held. Always `false` for disabled rules.
    pub matched: bool,
}

impl fmt::Display for RuleTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match (self.enabled, self.matched) {
            (false, _) => "disabled",
            (true, true) => "matched",
            (true, false) => "no match",
        };
        write!(
            f,
            "[{}] {} (priority {}): {state}",
            self.index, self.id, self.priority
        )
    }
}
