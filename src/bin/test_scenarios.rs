//! Scenario test runner CLI
//!
//! Usage:
//!   cargo run --bin test-scenarios                           # Run all scenarios
//!   cargo run --bin test-scenarios -- recording/             # Run one category
//!   cargo run --bin test-scenarios -- playback/replay_stored # Run one scenario
//!   cargo run --bin test-scenarios -- --list                 # Describe scenarios
//!   cargo run --bin test-scenarios -- --verbose              # Expected/actual on failure

use std::env;
use std::path::{Path, PathBuf};
use std::time::Instant;

use navsim::testing::{SCENARIOS_DIR, TestResult, parser::parse_test_file, runner::run_test};

#[derive(Default)]
struct Tally {
    passed: usize,
    failed: usize,
    errors: usize,
}

fn main() {
    let mut verbose = false;
    let mut list_only = false;
    let mut filter: Option<String> = None;

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--verbose" | "-v" => verbose = true,
            "--list" => list_only = true,
            a if !a.starts_with('-') => filter = Some(arg),
            _ => {}
        }
    }

    let base = Path::new(SCENARIOS_DIR);
    if !base.is_dir() {
        eprintln!("No scenarios directory at {}", SCENARIOS_DIR);
        std::process::exit(1);
    }

    let scenarios = discover(base, filter.as_deref());
    if scenarios.is_empty() {
        eprintln!(
            "No scenario files found{}",
            filter.map(|f| format!(" matching '{}'", f)).unwrap_or_default()
        );
        std::process::exit(1);
    }

    if list_only {
        for path in &scenarios {
            let rel = path.strip_prefix(base).unwrap_or(path).display();
            match parse_test_file(path) {
                Ok(def) => println!(
                    "{:<44} {}",
                    rel,
                    def.description.as_deref().unwrap_or(&def.name)
                ),
                Err(e) => println!("{:<44} (unparseable: {})", rel, e),
            }
        }
        return;
    }

    println!("Scenarios");
    println!("=========\n");

    let mut tally = Tally::default();
    let mut category = String::new();
    let started = Instant::now();

    for path in &scenarios {
        let rel = path.strip_prefix(base).unwrap_or(path);
        let parent = rel
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        if parent != category && !parent.is_empty() {
            println!("{}/", parent);
            category = parent;
        }
        let name = rel
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let result = match parse_test_file(path) {
            Ok(def) => run_test(&def),
            Err(message) => TestResult::Error { message },
        };
        match &result {
            TestResult::Pass { .. } => tally.passed += 1,
            TestResult::Fail { .. } => tally.failed += 1,
            TestResult::Error { .. } => tally.errors += 1,
        }
        report(&name, &result, verbose);
    }

    println!(
        "\n{} passed, {} failed, {} errors in {:.1}s",
        tally.passed,
        tally.failed,
        tally.errors,
        started.elapsed().as_secs_f32()
    );
    if tally.failed + tally.errors > 0 {
        std::process::exit(1);
    }
}

fn discover(base: &Path, filter: Option<&str>) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut dirs = vec![base.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for path in entries.flatten().map(|e| e.path()) {
            if path.is_dir() {
                dirs.push(path);
            } else if path.extension().is_some_and(|e| e == "toml") {
                let rel = path.strip_prefix(base).unwrap_or(&path).to_string_lossy().to_string();
                if filter.is_none_or(|f| rel.contains(f)) {
                    found.push(path);
                }
            }
        }
    }
    found.sort();
    found
}

fn report(name: &str, result: &TestResult, verbose: bool) {
    let dots = ".".repeat(40 - name.len().min(39));
    match result {
        TestResult::Pass { frames } => println!("  {} {} PASS ({} frames)", name, dots, frames),
        TestResult::Fail { error } => {
            println!("  {} {} FAIL", name, dots);
            if verbose {
                println!("    {}", error);
            } else {
                println!("    {}", error.message);
            }
        }
        TestResult::Error { message } => {
            println!("  {} {} ERROR", name, dots);
            println!("    {}", message);
        }
    }
}
