//! Standard memory orderings for concurrent slot access.
//!
//! These constants keep ordering usage consistent across the cursor and
//! tree code and make the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading slots, the head and parent links during lock-free
/// traversal. Pairs with the writer's Release publishes.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for publishing a slot, the head or a parent link under the lock.
/// Pairs with the reader's Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for read-modify-write on tag bitmaps and tree flags.
pub const RMW_ORD: Ordering = Ordering::AcqRel;

/// Ordering for node bookkeeping (`count`, `nr_values`, `offset`).
/// Safe because only lock holders read or write it.
pub const RELAXED: Ordering = Ordering::Relaxed;
