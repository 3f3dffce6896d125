//! Shared setup for the integration tests: one `tracing` subscriber per
//! test binary, writing to the console and to an NDJSON file.
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn grows_to_full_height() {
//!     common::init_tracing();
//!     // ...
//! }
//! ```
//!
//! Environment:
//! - `RUST_LOG` picks the events, e.g. `xarray=debug,xarray::cursor::store=trace`.
//!   Defaults to `info`.
//! - `XARRAY_LOG_DIR` moves the log file out of `logs/`.
//! - `XARRAY_LOG_CONSOLE=0` keeps the console quiet.
//!
//! The library itself only emits events when built with `--features tracing`.
//!
//! ```bash
//! # Growth and shrink events from the last run
//! jq 'select(.fields.message | test("grown|shrunk"))' logs/xarray.jsonl
//!
//! # Refused allocations
//! jq 'select(.level == "WARN")' logs/xarray.jsonl
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, Once};

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const LOG_FILE: &str = "xarray.jsonl";

static INIT: Once = Once::new();

/// Install the subscriber. Later calls do nothing.
pub fn init_tracing() {
    INIT.call_once(install);
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn log_dir() -> PathBuf {
    env::var_os("XARRAY_LOG_DIR").map_or_else(|| PathBuf::from("logs"), PathBuf::from)
}

/// Appends, since nextest runs each test in its own process.
fn open_log() -> Option<File> {
    let dir = log_dir();
    fs::create_dir_all(&dir).ok()?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))
        .ok()
}

fn install() {
    let console = !env::var("XARRAY_LOG_CONSOLE").is_ok_and(|v| v == "0");

    let console_layer = console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_names(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .compact()
            .with_filter(filter())
    });

    let file_layer = open_log().map(|file| {
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .with_filter(filter())
    });

    // Another harness may already have installed one.
    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::debug!(index = 4096_usize, shift = 6_u32, "after init");
    }
}
