//! Conformance tests that run YAML fixtures against ruleq
//!
//! Run with: cargo test -p ruleq-test --test conformance --features ruleq-test/fixtures

#![cfg(feature = "fixtures")]

use ruleq_test::fixture::Fixture;
use std::fs;
use std::path::{Path, PathBuf};

/// The `fixtures/` directory at the workspace root.
fn fixtures_dir() -> PathBuf {
    // ext/test -> ext -> workspace root
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .expect("workspace root")
        .join("fixtures")
}

/// Load and run all fixtures in a directory. Returns how many ran.
fn run_fixtures_in_dir(dir: &Path) -> usize {
    assert!(dir.exists(), "Fixtures directory does not exist: {}", dir.display());

    let mut paths: Vec<_> = fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("dir entry").path())
        .filter(|p| p.extension().is_some_and(|e| e == "yaml" || e == "yml"))
        .collect();
    paths.sort();

    let mut count = 0;
    for path in paths {
        println!("Running fixture file: {}", path.display());
        let yaml = fs::read_to_string(&path).expect("read yaml");
        let fixtures = Fixture::from_yaml_multi(&yaml)
            .unwrap_or_else(|e| panic!("Failed to parse {}: {e}", path.display()));

        for fixture in fixtures {
            println!("  Running: {}", fixture.name);
            fixture.run_and_assert();
            count += 1;
        }
    }
    count
}

#[test]
fn test_priority() {
    assert!(run_fixtures_in_dir(&fixtures_dir().join("01_priority")) >= 5);
}

#[test]
fn test_conditions() {
    assert!(run_fixtures_in_dir(&fixtures_dir().join("02_conditions")) >= 7);
}

#[test]
fn test_semantics() {
    assert!(run_fixtures_in_dir(&fixtures_dir().join("03_semantics")) >= 4);
}

#[test]
fn test_loading_errors() {
    assert_eq!(run_fixtures_in_dir(&fixtures_dir().join("04_loading")), 4);
}
