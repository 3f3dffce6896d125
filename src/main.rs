//! Self-check runner for `XArray`.
//!
//! Runs the named checks from `xarray::selftest` against one shared array and
//! exits non-zero if any assertion fails.
//!
//! Run with:
//! ```bash
//! cargo run --release
//! # Only checks whose name contains one of the arguments
//! cargo run --release -- find tag
//! ```

use std::env;
use std::process::ExitCode;
use std::time::Instant;

use xarray::selftest::{self, SUITE};

fn main() -> ExitCode {
    let filters: Vec<String> = env::args().skip(1).collect();

    if filters.iter().any(|f| f == "--list") {
        for test in SUITE {
            println!("{}", test.name);
        }
        return ExitCode::SUCCESS;
    }

    let start = Instant::now();
    let report = if filters.is_empty() {
        selftest::run_all()
    } else {
        selftest::run_matching(|name| filters.iter().any(|f| name.contains(f.as_str())))
    };
    let elapsed = start.elapsed();

    for failure in &report.failures {
        eprintln!("BUG in {} at {}", failure.check, failure.location);
    }
    println!("{report} ({elapsed:.2?})");

    if report.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
