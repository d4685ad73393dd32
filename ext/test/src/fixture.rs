//! Conformance fixture runner
//!
//! Loads YAML fixtures and runs them against the ruleq matcher. A fixture is a
//! rule file plus cases; each case builds a [`Context`] and states what
//! `find` and `find_all` must return.
//!
//! ```yaml
//! name: priority wins
//! description: higher priority is tried first
//! rules:
//!   rules:
//!     - { id: low, priority: 1, result: low }
//!     - { id: high, priority: 9, result: high }
//! cases:
//!   - name: both match
//!     context: {}
//!     first: high
//!     all: [high, low]
//! ```

use ruleq::prelude::*;
use ruleq::{ConfigError, Literal, RuleSetConfig};
use serde::Deserialize;
use std::collections::BTreeMap;

/// A complete test fixture.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub rules: RuleSetConfig<String>,
    /// When set, loading `rules` must fail with a message containing this.
    #[serde(default)]
    pub load_error: Option<String>,
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

/// One evaluation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub context: BTreeMap<String, Literal>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Expected `find` result.
    #[serde(default)]
    pub first: Option<String>,
    /// Expected `find_all` results, checked when present.
    #[serde(default)]
    pub all: Option<Vec<String>>,
}

impl TestCase {
    /// Build a fresh context from this case's values and metadata.
    #[must_use]
    pub fn build_context(&self) -> Context {
        let ctx = Context::new();
        for (k, v) in &self.context {
            ctx.with_value(k.as_str(), Value::from(v.clone()));
        }
        ctx.set_metadata_batch(self.metadata.clone());
        ctx
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runner
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of running a single test case.
#[derive(Debug)]
pub struct CaseResult {
    pub case_name: String,
    pub passed: bool,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub expected_all: Option<Vec<String>>,
    pub actual_all: Vec<String>,
}

impl Fixture {
    /// Parse a fixture from YAML.
    ///
    /// # Errors
    ///
    /// The YAML error when the document does not describe a fixture.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parse multiple fixtures from a YAML file with `---` separators.
    ///
    /// # Errors
    ///
    /// The first document that fails to parse.
    pub fn from_yaml_multi(yaml: &str) -> Result<Vec<Self>, serde_yaml::Error> {
        let mut fixtures = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(yaml) {
            fixtures.push(Self::deserialize(doc)?);
        }
        Ok(fixtures)
    }

    /// Compile the fixture's rules.
    ///
    /// # Errors
    ///
    /// The loader's error for invalid rules.
    pub fn matcher(&self) -> Result<Matcher<String>, ConfigError> {
        self.rules.clone().into_matcher()
    }

    /// Run all test cases and return results.
    ///
    /// # Errors
    ///
    /// The loader's error for invalid rules.
    pub fn run(&self) -> Result<Vec<CaseResult>, ConfigError> {
        let matcher = self.matcher()?;
        Ok(self
            .cases
            .iter()
            .map(|case| {
                let ctx = case.build_context();
                let actual = matcher.find(&ctx);
                let actual_all = matcher.find_all(&ctx);
                let first_ok = actual == case.first;
                let all_ok = case.all.as_ref().map_or(true, |all| *all == actual_all);
                // The trace must agree with the fast path.
                let trace_ok = matcher.explain(&ctx).result == actual;
                CaseResult {
                    case_name: case.name.clone(),
                    passed: first_ok && all_ok && trace_ok,
                    expected: case.first.clone(),
                    actual,
                    expected_all: case.all.clone(),
                    actual_all,
                }
            })
            .collect())
    }

    /// Run the fixture and panic on the first failure.
    pub fn run_and_assert(&self) {
        if let Some(want) = &self.load_error {
            match self.matcher() {
                Ok(_) => panic!("Fixture '{}': expected load error containing {want:?}", self.name),
                Err(e) => assert!(
                    e.to_string().contains(want.as_str()),
                    "Fixture '{}': error {e} does not contain {want:?}",
                    self.name
                ),
            }
            return;
        }

        let results = self
            .run()
            .unwrap_or_else(|e| panic!("Fixture '{}' failed to load: {e}", self.name));
        for result in results {
            assert!(
                result.passed,
                "Fixture '{}' case '{}' failed: expected {:?} / {:?}, got {:?} / {:?}",
                self.name,
                result.case_name,
                result.expected,
                result.expected_all,
                result.actual,
                result.actual_all
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r"
name: inline
description: smoke test for the runner
rules:
  rules:
    - id: admins
      priority: 10
      result: admin
      when:
        - key: role
          exact: admin
    - id: fallback
      result: other
cases:
  - name: admin
    context: { role: admin }
    first: admin
    all: [admin, other]
  - name: guest
    context: { role: guest }
    first: other
";

    #[test]
    fn test_inline_fixture_passes() {
        let fixture = Fixture::from_yaml(FIXTURE).unwrap();
        assert_eq!(fixture.cases.len(), 2);
        fixture.run_and_assert();
    }

    #[test]
    fn test_wrong_expectation_is_reported() {
        let mut fixture = Fixture::from_yaml(FIXTURE).unwrap();
        fixture.cases[1].first = Some("admin".into());
        let results = fixture.run().unwrap();
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert_eq!(results[1].actual.as_deref(), Some("other"));
    }

    #[test]
    fn test_multi_document() {
        let yaml = format!("{FIXTURE}---\n{FIXTURE}");
        assert_eq!(Fixture::from_yaml_multi(&yaml).unwrap().len(), 2);
    }
}
