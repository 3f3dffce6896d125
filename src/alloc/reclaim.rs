//! Reclaim helpers for seize-based memory reclamation.
//!
//! This module provides:
//! - The single-node reclaimer passed to `guard.defer_retire()`
//! - Subtree traversal for immediate teardown when no reader can exist

// This module is private, so pub(crate) is effectively the same as pub.
#![allow(clippy::redundant_pub_crate)]

use std::ptr::NonNull;

use seize::Collector;

use crate::node::{CHUNK_SIZE, XaNode};

/// Reclaim a boxed node (seize callback).
///
/// # Safety
///
/// - `ptr` must point to a valid `XaNode` leaked from a `Box`.
/// - Must only be called after seize determines no reader remains.
pub(crate) unsafe fn reclaim_node(ptr: *mut XaNode, _collector: &Collector) {
    // SAFETY: Caller guarantees ptr is valid and came from a Box.
    unsafe { drop(Box::from_raw(ptr)) };
}

/// Free every node of the subtree rooted at `top`.
///
/// Depth-first; only interior nodes (`shift > 0`) can hold node references,
/// so leaves are dropped without scanning.
///
/// # Safety
///
/// - Every node of the subtree was leaked from a `Box`.
/// - No other thread can reach any node of the subtree.
pub(crate) unsafe fn reclaim_subtree(top: NonNull<XaNode>) {
    let mut stack: Vec<NonNull<XaNode>> = Vec::with_capacity(16);
    stack.push(top);

    while let Some(node) = stack.pop() {
        // SAFETY: Caller guarantees exclusive access to the live subtree.
        let n: &XaNode = unsafe { node.as_ref() };

        if n.shift() > 0 {
            for offset in (0u8..).take(CHUNK_SIZE) {
                if let Some(child) = n.get(offset).to_node() {
                    stack.push(child);
                }
            }
        }

        // SAFETY: Children were collected above; the node came from a Box.
        unsafe { drop(Box::from_raw(node.as_ptr())) };
    }
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::RawEntry;

    #[test]
    fn reclaim_single_node() {
        let ptr = Box::into_raw(Box::new(XaNode::new()));

        // SAFETY: ptr was just created from Box::into_raw.
        unsafe { reclaim_node(ptr, &Collector::new()) };
    }

    #[test]
    fn reclaim_two_level_subtree() {
        let mut top = Box::new(XaNode::new());
        top.init(6, 0, std::ptr::null_mut());
        let top = NonNull::from(Box::leak(top));

        for offset in [0u8, 7, 63] {
            let mut leaf = Box::new(XaNode::new());
            leaf.init(0, offset, top.as_ptr());
            let leaf = NonNull::from(Box::leak(leaf));
            // SAFETY: top is alive until reclaimed below.
            unsafe { top.as_ref() }.set(offset, RawEntry::from_node(leaf));
        }

        // SAFETY: The subtree is private to this test.
        unsafe { reclaim_subtree(top) };
    }
}
