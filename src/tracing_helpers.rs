//! Logging macros for the array internals.
//!
//! With the `tracing` feature each macro forwards to the matching `tracing`
//! event macro. Without it the arguments are discarded at expansion time, so
//! the default build carries no logging code at all.
//!
//! ```bash
//! # Growth, shrink and node deletion on the store path
//! RUST_LOG=xarray::cursor::store=trace cargo test --features tracing multi_store
//!
//! # Allocation backoff and self-check failures only
//! RUST_LOG=xarray=warn cargo run --features tracing
//! ```
//!
//! Spans go on whole operations with
//! `#[cfg_attr(feature = "tracing", tracing::instrument(...))]`, as on
//! [`XArray::destroy`](crate::XArray::destroy).

#![allow(unused_macros, unused_imports)]

/// Per-step events on the store path: growth, shrink, node deletion.
#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => { tracing::trace!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

/// Whole-array events such as teardown.
#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

/// Recoverable trouble, e.g. a refused node allocation.
#[cfg(feature = "tracing")]
macro_rules! warn_log {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn_log {
    ($($arg:tt)*) => {};
}

/// Broken invariants reported by the self-checks.
#[cfg(feature = "tracing")]
macro_rules! error_log {
    ($($arg:tt)*) => { tracing::error!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! error_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use error_log;
pub(crate) use trace_log;
pub(crate) use warn_log;
