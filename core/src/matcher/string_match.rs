//! `StringMatchSpec`: declared intent for a string condition
//!
//! A [`StringMatchSpec`] is what a rule author wrote ("prefix `eng`"). It
//! compiles to a runtime [`ValueMatcher`] via
//! [`to_value_matcher()`](StringMatchSpec::to_value_matcher), or directly to a
//! keyed [`Condition`].

use super::condition::{Condition, StringMatcher, ValueMatcher};
use crate::{ConfigError, Key};
use std::fmt;

/// A string match specification from user configuration.
///
/// # Example
///
/// ```
/// use ruleq::{StringMatchSpec, Value, ValueMatcher};
///
/// let spec = StringMatchSpec::Prefix("eng".into());
/// let matcher = spec.to_value_matcher().unwrap();
/// assert!(matcher.matches(&Value::from("engineering")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "json",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum StringMatchSpec {
    /// Exact string equality.
    Exact(String),
    /// String starts with prefix.
    Prefix(String),
    /// String ends with suffix.
    Suffix(String),
    /// String contains substring.
    Contains(String),
    /// Regular expression match (`regex` crate syntax, linear time).
    Regex(String),
}

impl StringMatchSpec {
    /// Compile into a runtime [`ValueMatcher`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if the regex is invalid.
    pub fn to_value_matcher(&self) -> Result<Box<dyn ValueMatcher>, ConfigError> {
        Ok(Box::new(self.to_string_matcher(false)?))
    }

    /// Compile into a [`StringMatcher`], folding ASCII case when
    /// `ignore_case` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if the regex is invalid.
    pub fn to_string_matcher(&self, ignore_case: bool) -> Result<StringMatcher, ConfigError> {
        let literal = match self {
            Self::Exact(v) => StringMatcher::exact(v.as_str()),
            Self::Prefix(v) => StringMatcher::prefix(v.as_str()),
            Self::Suffix(v) => StringMatcher::suffix(v.as_str()),
            Self::Contains(v) => StringMatcher::contains(v.as_str()),
            Self::Regex(v) => {
                let compiled = if ignore_case {
                    StringMatcher::regex_ignore_case(v)
                } else {
                    StringMatcher::regex(v)
                };
                return compiled.map_err(|e| ConfigError::InvalidPattern {
                    pattern: v.clone(),
                    detail: e.to_string(),
                });
            }
        };
        Ok(if ignore_case {
            literal.ignore_case()
        } else {
            literal
        })
    }

    /// Compile into a [`Condition`] on `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if the regex is invalid.
    pub fn to_condition(&self, key: impl Into<Key>) -> Result<Condition, ConfigError> {
        Ok(Condition::new(key, self.to_string_matcher(false)?))
    }
}

impl fmt::Display for StringMatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "exact \"{v}\""),
            Self::Prefix(v) => write!(f, "prefix \"{v}\""),
            Self::Suffix(v) => write!(f, "suffix \"{v}\""),
            Self::Contains(v) => write!(f, "contains \"{v}\""),
            Self::Regex(v) => write!(f, "regex \"{v}\""),
        }
    }
}
