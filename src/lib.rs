//! # `XArray`
//!
//! A sparse array of word-sized entries indexed by `usize`, stored as a
//! radix tree with a fan-out of 64.
//!
//! - Entries are inline integers (up to [`MAX_VALUE`]) or caller-owned
//!   pointers with the two low address bits clear.
//! - Every entry can carry three independent tags. Interior nodes summarise
//!   them, so tagged searches skip untagged subtrees.
//! - With the `multi-index` feature (on by default) one entry can cover an
//!   aligned `2^order` range of indices.
//!
//! ## Thread Safety
//!
//! Readers never block. They walk the tree under a `seize` guard; nodes that
//! a writer unlinks are retired and freed only after every reader that may
//! hold them has finished. A reader that lands in a node being removed sees a
//! retry marker and restarts from the head.
//!
//! Writers serialise on a single lock. [`XArray`]'s methods take it
//! internally; [`XaLock`] holds it across several operations.
//!
//! ```rust
//! use xarray::{AllocMode, Entry, Filter, XArray};
//!
//! let xa: XArray<u64> = XArray::new();
//! {
//!     let mut lock = xa.lock();
//!     lock.store(1, Entry::Value(10), AllocMode::Blocking).unwrap();
//!     lock.store(1 << 20, Entry::Value(20), AllocMode::Blocking).unwrap();
//! }
//!
//! let mut index = 2;
//! assert_eq!(xa.find(&mut index, usize::MAX, Filter::Present), Some(Entry::Value(20)));
//! assert_eq!(index, 1 << 20);
//! ```
//!
//! ## Allocation
//!
//! Nodes come from a [`NodeAllocator`]. Stores ask for nodes without blocking
//! while the lock is held; on failure the lock is released, the nodes the
//! attempt needed are allocated in [`AllocMode::Blocking`] mode and the store
//! is retried. A failed store never leaves the tree half-modified.
//!
//! ## Design
//!
//! | Module | Role |
//! |--------|------|
//! | [`entry`] | Word encoding of slot contents |
//! | [`node`] | 64-slot tree node with counts and tag bitmaps |
//! | [`cursor`] | Walk, step, search and the locked store engine |
//! | [`array`] | The array, its lock and iterators |

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Hot-path accessors are forced inline, as in the node and cursor code.
#![allow(clippy::inline_always)]

pub mod alloc;
pub mod array;
pub mod cursor;
pub mod entry;
pub mod error;
pub mod node;
pub mod ordering;
pub mod selftest;
pub mod tag;

mod tracing_helpers;

#[cfg(all(test, loom))]
mod loom_tests;

// Re-export main types for convenience
pub use alloc::{AllocMode, FaultInjectingAllocator, GlobalNodeAllocator, NodeAllocator};
pub use array::{Iter, XArray, XaLock};
pub use cursor::{Cursor, CursorState};
pub use entry::{Entry, MAX_VALUE, RawEntry};
pub use error::XaError;
pub use node::{CHUNK_MASK, CHUNK_SHIFT, CHUNK_SIZE, XaNode};
pub use tag::{Filter, MAX_TAGS, Tag};
