//! `ValueMatcher`: context-agnostic checks over a single [`Value`]
//!
//! A [`Condition`] pairs a context key with a [`ValueMatcher`]. The matcher
//! never sees the context, only the value the key resolves to, so the same
//! matcher instance can be reused across rules.
//!
//! # INV: missing → false
//!
//! When the key resolves to nothing, the condition is `false` without
//! consulting the matcher.
//!
//! # Available Matchers
//!
//! - [`StringMatcher`]: exact, prefix, suffix, contains or regex, with
//!   optional ASCII case folding
//! - [`BoolMatcher`]: boolean equality
//! - [`EqualsMatcher`]: equality against any [`Value`]
//! - [`PresentMatcher`]: the key exists

use crate::{Context, Key, Value};
use std::fmt::{self, Debug};

/// Matches against a single context [`Value`].
///
/// # Example
///
/// ```
/// use ruleq::{StringMatcher, Value, ValueMatcher};
///
/// let matcher = StringMatcher::exact("admin");
/// assert!(matcher.matches(&Value::from("admin")));
/// assert!(!matcher.matches(&Value::from(1i64)));
/// ```
pub trait ValueMatcher: Send + Sync + Debug {
    /// Check if the given value matches.
    ///
    /// Returns `false` if the value type is incompatible with this matcher.
    fn matches(&self, value: &Value) -> bool;

    /// Returns the value types this matcher supports. Default is `["string"]`.
    fn supported_types(&self) -> &[&'static str] {
        &["string"]
    }
}

impl ValueMatcher for Box<dyn ValueMatcher> {
    fn matches(&self, value: &Value) -> bool {
        (**self).matches(value)
    }

    fn supported_types(&self) -> &[&'static str] {
        (**self).supported_types()
    }
}

/// A context key paired with a [`ValueMatcher`].
pub struct Condition {
    key: Key,
    matcher: Box<dyn ValueMatcher>,
}

impl Condition {
    /// Create a condition on `key`.
    pub fn new(key: impl Into<Key>, matcher: impl ValueMatcher + 'static) -> Self {
        Self {
            key: key.into(),
            matcher: Box::new(matcher),
        }
    }

    /// Create a condition from an already boxed matcher.
    pub fn boxed(key: impl Into<Key>, matcher: Box<dyn ValueMatcher>) -> Self {
        Self {
            key: key.into(),
            matcher,
        }
    }

    /// The key this condition reads.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Evaluate against a context. Missing keys evaluate to `false`.
    pub fn evaluate(&self, ctx: &Context) -> bool {
        ctx.value(&self.key)
            .is_some_and(|value| self.matcher.matches(&value))
    }
}

impl Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("key", &self.key)
            .field("matcher", &self.matcher)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// String Matchers
// ═══════════════════════════════════════════════════════════════════════════════

/// String comparison against a fixed needle or a regex.
///
/// Literal operations are case-sensitive unless [`ignore_case`] is applied,
/// which folds ASCII letters only. The needle is lowercased once at
/// construction, so matching never allocates.
///
/// [`ignore_case`]: StringMatcher::ignore_case
///
/// ```
/// use ruleq::{StringMatcher, Value, ValueMatcher};
///
/// let m = StringMatcher::prefix("/API/").ignore_case();
/// assert!(m.matches(&Value::from("/api/users")));
///
/// let m = StringMatcher::regex(r"^user-\d+$").unwrap();
/// assert!(m.matches(&Value::from("user-123")));
/// ```
#[derive(Debug, Clone)]
pub struct StringMatcher {
    op: StringOp,
    fold_case: bool,
}

#[derive(Debug, Clone)]
enum StringOp {
    Equals(String),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    Pattern(regex::Regex),
}

impl StringMatcher {
    fn case_sensitive(op: StringOp) -> Self {
        Self {
            op,
            fold_case: false,
        }
    }

    /// The input equals `value`.
    #[must_use]
    pub fn exact(value: impl Into<String>) -> Self {
        Self::case_sensitive(StringOp::Equals(value.into()))
    }

    /// The input starts with `value`.
    #[must_use]
    pub fn prefix(value: impl Into<String>) -> Self {
        Self::case_sensitive(StringOp::StartsWith(value.into()))
    }

    /// The input ends with `value`.
    #[must_use]
    pub fn suffix(value: impl Into<String>) -> Self {
        Self::case_sensitive(StringOp::EndsWith(value.into()))
    }

    /// The input contains `value`.
    #[must_use]
    pub fn contains(value: impl Into<String>) -> Self {
        Self::case_sensitive(StringOp::Contains(value.into()))
    }

    /// The input matches `pattern` (RE2 semantics, linear time).
    ///
    /// # Errors
    ///
    /// Returns `Err` if the pattern is invalid.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        regex::Regex::new(pattern).map(|re| Self::case_sensitive(StringOp::Pattern(re)))
    }

    /// Like [`regex`](Self::regex), with case-insensitive matching.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the pattern is invalid.
    pub fn regex_ignore_case(pattern: &str) -> Result<Self, regex::Error> {
        regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(|re| Self {
                op: StringOp::Pattern(re),
                fold_case: true,
            })
    }

    /// Fold ASCII case for literal operations.
    ///
    /// A regex keeps the case sensitivity it was compiled with; use
    /// [`regex_ignore_case`](Self::regex_ignore_case) for that.
    #[must_use]
    pub fn ignore_case(mut self) -> Self {
        match &mut self.op {
            StringOp::Equals(needle)
            | StringOp::StartsWith(needle)
            | StringOp::EndsWith(needle)
            | StringOp::Contains(needle) => {
                needle.make_ascii_lowercase();
                self.fold_case = true;
            }
            StringOp::Pattern(_) => {}
        }
        self
    }

    /// Whether matching folds ASCII case.
    #[must_use]
    pub fn is_case_insensitive(&self) -> bool {
        self.fold_case
    }

    fn matches_str(&self, input: &str) -> bool {
        let fold = self.fold_case;
        let eq = |a: &[u8], b: &[u8]| {
            if fold {
                a.eq_ignore_ascii_case(b)
            } else {
                a == b
            }
        };
        let input_bytes = input.as_bytes();
        match &self.op {
            StringOp::Equals(needle) => eq(input_bytes, needle.as_bytes()),
            StringOp::StartsWith(needle) => input_bytes
                .get(..needle.len())
                .is_some_and(|head| eq(head, needle.as_bytes())),
            StringOp::EndsWith(needle) => input_bytes
                .len()
                .checked_sub(needle.len())
                .is_some_and(|start| eq(&input_bytes[start..], needle.as_bytes())),
            StringOp::Contains(needle) if !fold => input.contains(needle.as_str()),
            StringOp::Contains(needle) => {
                needle.is_empty()
                    || input_bytes
                        .windows(needle.len())
                        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
            }
            StringOp::Pattern(re) => re.is_match(input),
        }
    }
}

impl ValueMatcher for StringMatcher {
    fn matches(&self, value: &Value) -> bool {
        value.as_str().is_some_and(|input| self.matches_str(input))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Typed Matchers
// ═══════════════════════════════════════════════════════════════════════════════

/// Boolean equality.
#[derive(Debug, Clone)]
pub struct BoolMatcher {
    expected: bool,
}

impl BoolMatcher {
    /// Create a new boolean matcher.
    #[must_use]
    pub fn new(expected: bool) -> Self {
        Self { expected }
    }
}

impl ValueMatcher for BoolMatcher {
    fn matches(&self, value: &Value) -> bool {
        value.as_bool().is_some_and(|b| b == self.expected)
    }

    fn supported_types(&self) -> &[&'static str] {
        &["bool"]
    }
}

/// Equality against an arbitrary [`Value`].
///
/// `Int` and `Uint` compare numerically, so `3i64` equals `3u64`.
#[derive(Debug, Clone)]
pub struct EqualsMatcher {
    expected: Value,
}

impl EqualsMatcher {
    /// Create a new equality matcher.
    pub fn new(expected: impl Into<Value>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl ValueMatcher for EqualsMatcher {
    fn matches(&self, value: &Value) -> bool {
        match (&self.expected, value) {
            (Value::Int(a), Value::Uint(b)) | (Value::Uint(b), Value::Int(a)) => {
                u64::try_from(*a).is_ok_and(|a| a == *b)
            }
            (expected, actual) => expected == actual,
        }
    }

    fn supported_types(&self) -> &[&'static str] {
        &[
            "string", "int", "uint", "float", "bool", "bytes", "duration", "time", "custom",
        ]
    }
}

/// Matches any value: the key only has to exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresentMatcher;

impl ValueMatcher for PresentMatcher {
    fn matches(&self, _value: &Value) -> bool {
        true
    }

    fn supported_types(&self) -> &[&'static str] {
        &[
            "string", "int", "uint", "float", "bool", "bytes", "duration", "time", "custom",
        ]
    }
}
