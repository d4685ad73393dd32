//! Rule files: serde types that compile into a [`Matcher`].
//!
//! A rule file lists rules with their priority, result and ANDed conditions:
//!
//! ```yaml
//! cache_ttl_ms: 60000
//! rules:
//!   - id: admins
//!     priority: 100
//!     result: admin
//!     when:
//!       - key: role
//!         exact: admin
//!       - key: dept
//!         prefix: eng
//! ```
//!
//! | Config type | Runtime type |
//! |-------------|--------------|
//! | [`RuleSetConfig`] | [`Matcher`] |
//! | [`RuleConfig`] | [`ChainRule`] |
//! | [`ConditionConfig`] | [`Condition`] |
//!
//! Every condition names exactly one operator. Loading validates the whole
//! file (patterns, operators, ids) before anything is built.

use crate::matcher::{
    BoolMatcher, ChainRule, Condition, EqualsMatcher, Matcher, PresentMatcher, StringMatchSpec,
};
use crate::{ConfigError, Value};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// A whole rule file.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"), deny_unknown_fields)]
pub struct RuleSetConfig<T> {
    /// Enables the result cache with this TTL when set.
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,

    /// Rules in file order.
    #[serde(default)]
    pub rules: Vec<RuleConfig<T>>,
}

/// One rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"), deny_unknown_fields)]
pub struct RuleConfig<T> {
    /// Rule id. Generated when omitted.
    #[serde(default)]
    pub id: Option<String>,

    /// Higher runs first.
    #[serde(default)]
    pub priority: i64,

    /// Disabled rules never match.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// What the rule yields.
    pub result: T,

    /// ANDed conditions. Empty matches every context.
    #[serde(default)]
    pub when: Vec<ConditionConfig>,
}

fn default_enabled() -> bool {
    true
}

/// One condition on a context key.
///
/// Exactly one of the operator fields must be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionConfig {
    /// The context key to read.
    pub key: String,

    /// String equality.
    #[serde(default)]
    pub exact: Option<String>,

    /// String prefix.
    #[serde(default)]
    pub prefix: Option<String>,

    /// String suffix.
    #[serde(default)]
    pub suffix: Option<String>,

    /// Substring.
    #[serde(default)]
    pub contains: Option<String>,

    /// Regular expression.
    #[serde(default)]
    pub regex: Option<String>,

    /// Case-insensitive string comparison for the string operators.
    #[serde(default)]
    pub ignore_case: bool,

    /// Equality with a scalar literal.
    #[serde(default)]
    pub equals: Option<Literal>,

    /// `true`: the key must exist. `false`: the key must be absent.
    #[serde(default)]
    pub present: Option<bool>,
}

/// A scalar in a rule file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    /// `true` / `false`.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Anything quoted.
    Str(String),
}

impl From<Literal> for Value {
    fn from(lit: Literal) -> Self {
        match lit {
            Literal::Bool(b) => Value::Bool(b),
            Literal::Int(i) => Value::Int(i),
            Literal::Float(f) => Value::Float(f),
            Literal::Str(s) => Value::Str(s),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════════════════════════

impl<T> RuleSetConfig<T>
where
    T: for<'de> Deserialize<'de>,
{
    /// Parse a YAML rule file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] when the document is malformed.
    pub fn from_yaml(src: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(src).map_err(|e| ConfigError::Parse {
            detail: e.to_string(),
        })
    }

    /// Parse a JSON rule file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] when the document is malformed.
    pub fn from_json(src: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(src).map_err(|e| ConfigError::Parse {
            detail: e.to_string(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Compilation
// ═══════════════════════════════════════════════════════════════════════════════

impl<T> RuleSetConfig<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// The configured cache TTL, if any.
    #[must_use]
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_ms.map(Duration::from_millis)
    }

    /// Compile every rule, checking ids for duplicates.
    ///
    /// # Errors
    ///
    /// The first invalid condition or repeated id.
    pub fn into_rules(self) -> Result<Vec<ChainRule<T>>, ConfigError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in self.rules {
            if let Some(id) = &rule.id {
                if !seen.insert(id.clone()) {
                    return Err(ConfigError::DuplicateId { id: id.clone() });
                }
            }
            rules.push(rule.compile()?);
        }
        Ok(rules)
    }

    /// Compile into a ready [`Matcher`]. The cache is enabled when
    /// `cache_ttl_ms` is set.
    ///
    /// # Errors
    ///
    /// See [`into_rules`](Self::into_rules).
    pub fn into_matcher(self) -> Result<Matcher<T>, ConfigError> {
        let ttl = self.cache_ttl();
        let rules = self.into_rules()?;
        let matcher = Matcher::new();
        matcher.add_rules(rules);
        if let Some(ttl) = ttl {
            matcher.enable_cache(ttl);
        }
        tracing::debug!(rules = matcher.len(), cache = ttl.is_some(), "rule set loaded");
        Ok(matcher)
    }
}

impl<T> RuleConfig<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Compile into a [`ChainRule`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidCondition`] or [`ConfigError::InvalidPattern`].
    pub fn compile(self) -> Result<ChainRule<T>, ConfigError> {
        let mut rule = ChainRule::new(self.result)
            .priority(self.priority)
            .enabled(self.enabled);
        if let Some(id) = self.id {
            rule = rule.id(id);
        }
        let label = rule_label(&rule);
        for cond in &self.when {
            rule = match cond.compile(&label)? {
                Compiled::Condition(c) => rule.when_condition(c),
                Compiled::Absent(key) => rule.when(move |ctx| ctx.value(&key).is_none()),
            };
        }
        Ok(rule)
    }
}

fn rule_label<T: Clone + Send + Sync>(rule: &ChainRule<T>) -> String {
    crate::Rule::id(rule).to_owned()
}

enum Compiled {
    Condition(Condition),
    Absent(crate::Key),
}

impl ConditionConfig {
    fn operator_names(&self) -> Vec<&'static str> {
        [
            ("exact", self.exact.is_some()),
            ("prefix", self.prefix.is_some()),
            ("suffix", self.suffix.is_some()),
            ("contains", self.contains.is_some()),
            ("regex", self.regex.is_some()),
            ("equals", self.equals.is_some()),
            ("present", self.present.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }

    fn compile(&self, rule: &str) -> Result<Compiled, ConfigError> {
        let invalid = |detail: String| ConfigError::InvalidCondition {
            rule: rule.to_owned(),
            key: self.key.clone(),
            detail,
        };

        if self.key.is_empty() {
            return Err(invalid("has an empty key".into()));
        }
        let ops = self.operator_names();
        match ops.len() {
            0 => return Err(invalid("names no operator".into())),
            1 => {}
            _ => return Err(invalid(format!("names several operators: {}", ops.join(", ")))),
        }

        let key = self.key.as_str();
        if let Some(present) = self.present {
            return Ok(if present {
                Compiled::Condition(Condition::new(key, PresentMatcher))
            } else {
                Compiled::Absent(key.into())
            });
        }
        if let Some(lit) = &self.equals {
            return Ok(Compiled::Condition(match lit {
                Literal::Bool(b) => Condition::new(key, BoolMatcher::new(*b)),
                other => Condition::new(key, EqualsMatcher::new(Value::from(other.clone()))),
            }));
        }

        let spec = self.string_spec().ok_or_else(|| invalid("names no operator".into()))?;
        let matcher = spec.to_string_matcher(self.ignore_case)?;
        Ok(Compiled::Condition(Condition::new(key, matcher)))
    }

    fn string_spec(&self) -> Option<StringMatchSpec> {
        let c = self;
        c.exact
            .clone()
            .map(StringMatchSpec::Exact)
            .or_else(|| c.prefix.clone().map(StringMatchSpec::Prefix))
            .or_else(|| c.suffix.clone().map(StringMatchSpec::Suffix))
            .or_else(|| c.contains.clone().map(StringMatchSpec::Contains))
            .or_else(|| c.regex.clone().map(StringMatchSpec::Regex))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;

    const RULES: &str = r"
cache_ttl_ms: 500
rules:
  - id: default
    result: guest
  - id: admins
    priority: 100
    result: admin
    when:
      - key: role
        exact: admin
      - key: dept
        prefix: eng
  - id: staff
    priority: 50
    result: staff
    when:
      - key: email
        regex: '@corp\.example$'
  - id: off
    priority: 1000
    enabled: false
    result: never
";

    fn ctx(pairs: &[(&str, &str)]) -> Context {
        let ctx = Context::new();
        for (k, v) in pairs {
            ctx.with_value(*k, *v);
        }
        ctx
    }

    #[test]
    fn test_yaml_into_matcher() {
        let config: RuleSetConfig<String> = RuleSetConfig::from_yaml(RULES).unwrap();
        assert_eq!(config.rules.len(), 4);
        assert!(config.rules[0].enabled);
        let matcher = config.into_matcher().unwrap();
        assert_eq!(matcher.rule_ids(), vec!["off", "admins", "staff", "default"]);
        assert!(matcher.cache_config().is_some());

        let admin = ctx(&[("role", "admin"), ("dept", "engineering")]);
        assert_eq!(matcher.find(&admin).as_deref(), Some("admin"));

        let staff = ctx(&[("email", "ann@corp.example")]);
        assert_eq!(matcher.find(&staff).as_deref(), Some("staff"));
        assert_eq!(matcher.find_all(&staff), vec!["staff", "guest"]);

        assert_eq!(matcher.find(&Context::new()).as_deref(), Some("guest"));
    }

    #[test]
    fn test_json_equals_and_present() {
        let src = r#"{
            "rules": [
                {"id": "l3", "result": 3, "when": [{"key": "level", "equals": 3}]},
                {"id": "vip", "priority": 5, "result": 9, "when": [{"key": "vip", "equals": true}]},
                {"id": "anon", "priority": -1, "result": 0, "when": [{"key": "token", "present": false}]}
            ]
        }"#;
        let matcher = RuleSetConfig::<i64>::from_json(src)
            .unwrap()
            .into_matcher()
            .unwrap();
        assert!(matcher.cache_config().is_none());

        let c = Context::new();
        c.with_value("level", 3i64).with_value("token", "t");
        assert_eq!(matcher.find(&c), Some(3));

        c.with_value("vip", true);
        assert_eq!(matcher.find(&c), Some(9));

        assert_eq!(matcher.find(&Context::new()), Some(0));
    }

    #[test]
    fn test_ignore_case() {
        let src = r"
rules:
  - result: hit
    when:
      - key: region
        exact: EU-West
        ignore_case: true
";
        let matcher = RuleSetConfig::<String>::from_yaml(src)
            .unwrap()
            .into_matcher()
            .unwrap();
        assert_eq!(matcher.find(&ctx(&[("region", "eu-west")])).as_deref(), Some("hit"));
    }

    #[test]
    fn test_invalid_regex() {
        let src = r"
rules:
  - id: bad
    result: x
    when:
      - key: path
        regex: '(unclosed'
";
        let err = RuleSetConfig::<String>::from_yaml(src)
            .unwrap()
            .into_matcher()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn test_operator_count() {
        let none = r"
rules:
  - id: r
    result: x
    when:
      - key: k
";
        let err = RuleSetConfig::<String>::from_yaml(none)
            .unwrap()
            .into_rules()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCondition { ref rule, .. } if rule == "r"));

        let two = r"
rules:
  - id: r
    result: x
    when:
      - key: k
        exact: a
        prefix: b
";
        let err = RuleSetConfig::<String>::from_yaml(two)
            .unwrap()
            .into_rules()
            .unwrap_err();
        assert!(err.to_string().contains("exact, prefix"));
    }

    #[test]
    fn test_duplicate_id() {
        let src = r"
rules:
  - id: same
    result: a
  - id: same
    result: b
";
        let err = RuleSetConfig::<String>::from_yaml(src)
            .unwrap()
            .into_matcher()
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateId { id: "same".into() });
    }

    #[test]
    fn test_parse_error() {
        let err = RuleSetConfig::<String>::from_yaml("rules: [ {").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let err = RuleSetConfig::<String>::from_yaml("rules:\n  - result: a\n    colour: red\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
