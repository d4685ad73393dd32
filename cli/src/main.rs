//! ruleq CLI: evaluate and validate rule files.
//!
//! Subcommands:
//! - `eval <rules> [--all] [--trace] [key=value...]`: evaluate rules against a context
//! - `check <rules>`: validate that a rule file loads
//!
//! Rule files are YAML, or JSON when the extension is `.json`. Results may be
//! any scalar or structure; strings print bare, everything else as JSON.

use std::process;

use ruleq::{Context, Matcher, RuleSetConfig, Value};
use tracing_subscriber::EnvFilter;

type RuleResult = serde_json::Value;

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "eval" => cmd_eval(&args[2..]),
        "check" => cmd_check(&args[2..]),
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("error: unknown command \"{other}\"");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

/// Logs go to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ═══════════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_eval(args: &[String]) -> Result<(), String> {
    let opts = EvalArgs::parse(args)?;
    let matcher = load_matcher(&opts.path)?;
    let ctx = build_context(&opts.pairs);

    if opts.trace {
        let trace = matcher.explain(&ctx);
        for step in &trace.steps {
            println!("{step}");
        }
        println!();
    }

    if opts.all {
        let results = matcher.find_all(&ctx);
        if results.is_empty() {
            println!("(no match)");
        }
        for r in &results {
            println!("{}", render(r));
        }
    } else {
        match matcher.find(&ctx) {
            Some(r) => println!("{}", render(&r)),
            None => println!("(no match)"),
        }
    }

    Ok(())
}

fn cmd_check(args: &[String]) -> Result<(), String> {
    let [path] = args else {
        return Err("check requires exactly one rule file path".into());
    };

    let matcher = load_matcher(path)?;
    println!("Rules valid ({} rules)", matcher.len());
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════════════════════════

fn load_config(path: &str) -> Result<RuleSetConfig<RuleResult>, String> {
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("failed to read \"{path}\": {e}"))?;

    let is_json = std::path::Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let parsed = if is_json {
        RuleSetConfig::from_json(&content)
    } else {
        // Default to YAML (handles .yaml and .yml)
        RuleSetConfig::from_yaml(&content)
    };
    parsed.map_err(|e| e.to_string())
}

fn load_matcher(path: &str) -> Result<Matcher<RuleResult>, String> {
    let matcher = load_config(path)?
        .into_matcher()
        .map_err(|e| format!("rules invalid: {e}"))?;
    tracing::debug!(path, rules = matcher.len(), "rules loaded");
    Ok(matcher)
}

fn build_context(pairs: &[(String, String)]) -> Context {
    let ctx = Context::new();
    for (k, v) in pairs {
        ctx.with_value(k.as_str(), parse_value(v));
    }
    ctx
}

/// Integers and booleans are typed; everything else stays a string.
fn parse_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int(i);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::from(raw),
    }
}

fn render(result: &RuleResult) -> String {
    match result {
        RuleResult::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Argument parsing
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, PartialEq)]
struct EvalArgs {
    path: String,
    all: bool,
    trace: bool,
    pairs: Vec<(String, String)>,
}

impl EvalArgs {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut out = Self::default();
        let mut path = None;

        for arg in args {
            match arg.as_str() {
                "--all" => out.all = true,
                "--trace" => out.trace = true,
                flag if flag.starts_with("--") => {
                    return Err(format!("unknown flag \"{flag}\""));
                }
                pair if path.is_some() => {
                    let (key, value) = pair.split_once('=').ok_or_else(|| {
                        format!("invalid context pair \"{pair}\", expected key=value")
                    })?;
                    if key.is_empty() {
                        return Err(format!("invalid context pair \"{pair}\", empty key"));
                    }
                    out.pairs.push((key.to_owned(), value.to_owned()));
                }
                first => path = Some(first.to_owned()),
            }
        }

        out.path = path.ok_or("eval requires a rule file path")?;
        Ok(out)
    }
}

fn print_usage() {
    eprintln!(
        "Usage: ruleq <command> [options]

Commands:
  eval <rules> [--all] [--trace] [key=value...]   Evaluate rules against a context
  check <rules>                                   Validate a rule file
  help                                            Show this help

Environment:
  RUST_LOG   log filter for stderr output (default: warn)"
    );
}
