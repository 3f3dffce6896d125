//! Node allocation abstraction for [`XArray`](crate::XArray).
//!
//! The store path allocates nodes while holding the tree lock, so it asks for
//! them with [`AllocMode::NonBlocking`]. When that fails the cursor reports
//! [`XaError::NoMemory`](crate::XaError::NoMemory) and the caller backs off,
//! allocating with whatever mode it is allowed to use outside the lock
//! (see [`Cursor::nomem`](crate::Cursor::nomem)).
//!
//! Unlinked nodes are never freed in place: they are retired through the
//! tree's `seize` collector so lock-free readers that still hold them stay
//! valid until their guards drop.

pub(crate) mod reclaim;

use std::alloc::{Layout, alloc_zeroed};
use std::fmt as StdFmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize};

use seize::{Guard, LocalGuard};

use crate::node::XaNode;
use crate::ordering::RELAXED;

/// Whether an allocation may sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AllocMode {
    /// The caller may block; allocation failure means real exhaustion.
    #[default]
    Blocking,

    /// The caller must not block (e.g. it holds the tree lock).
    NonBlocking,
}

impl AllocMode {
    /// Check if this mode allows sleeping.
    #[must_use]
    #[inline(always)]
    pub const fn may_block(self) -> bool {
        matches!(self, Self::Blocking)
    }
}

/// Trait for allocating and retiring tree nodes.
///
/// Nodes are handed out as `Box<XaNode>` from the global allocator, so the
/// default retire and teardown paths can return them with `Box::from_raw`.
/// Implementations only decide whether an allocation succeeds.
pub trait NodeAllocator: Send + Sync {
    /// Allocate an empty node, or `None` if memory is not available in this mode.
    fn alloc_node(&self, mode: AllocMode) -> Option<Box<XaNode>>;

    /// Schedule an unlinked node for reclamation once no reader can see it.
    ///
    /// # Safety
    ///
    /// - `node` came from [`alloc_node`](Self::alloc_node) and was leaked with `Box::leak`.
    /// - `node` is no longer reachable from the head.
    /// - `node` is retired at most once.
    unsafe fn retire_node(&self, node: NonNull<XaNode>, guard: &LocalGuard<'_>) {
        // SAFETY: Caller guarantees the node is unlinked and retired once.
        unsafe { guard.defer_retire(node.as_ptr(), reclaim::reclaim_node) };
    }

    /// Free a detached subtree immediately.
    ///
    /// # Safety
    ///
    /// - No reader or writer can reach any node of the subtree.
    unsafe fn teardown(&self, top: NonNull<XaNode>) {
        // SAFETY: Caller guarantees exclusive access.
        unsafe { reclaim::reclaim_subtree(top) };
    }
}

// ============================================================================
//  GlobalNodeAllocator
// ============================================================================

/// Default allocator: zeroed allocations from the global allocator.
///
/// Allocation failure is reported as `None` instead of aborting, in both modes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalNodeAllocator;

impl NodeAllocator for GlobalNodeAllocator {
    fn alloc_node(&self, _mode: AllocMode) -> Option<Box<XaNode>> {
        let layout: Layout = Layout::new::<XaNode>();

        // SAFETY: `XaNode` is not zero-sized.
        let raw: *mut XaNode = unsafe { alloc_zeroed(layout) }.cast();
        let ptr: NonNull<XaNode> = NonNull::new(raw)?;

        // SAFETY: The memory was allocated by the global allocator with the
        // layout of `XaNode`, and all-zero bytes are a valid empty node
        // (zero atomics and null pointers).
        Some(unsafe { Box::from_raw(ptr.as_ptr()) })
    }
}

// ============================================================================
//  FaultInjectingAllocator
// ============================================================================

/// Allocator that refuses allocations on demand.
///
/// By default it refuses every [`AllocMode::NonBlocking`] request and serves
/// blocking ones, which forces every store that needs a node through the
/// `NoMemory` backoff path. [`set_fail_all`](Self::set_fail_all) makes it
/// refuse everything.
pub struct FaultInjectingAllocator<A: NodeAllocator = GlobalNodeAllocator> {
    inner: A,
    fail_nonblocking: AtomicBool,
    fail_all: AtomicBool,
    allocated: AtomicUsize,
    refused: AtomicUsize,
}

impl FaultInjectingAllocator {
    /// Refuse non-blocking requests, serve blocking ones.
    #[must_use]
    pub const fn new() -> Self {
        Self::wrap(GlobalNodeAllocator)
    }
}

impl Default for FaultInjectingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: NodeAllocator> FaultInjectingAllocator<A> {
    /// Wrap another allocator.
    #[must_use]
    pub const fn wrap(inner: A) -> Self {
        Self {
            inner,
            fail_nonblocking: AtomicBool::new(true),
            fail_all: AtomicBool::new(false),
            allocated: AtomicUsize::new(0),
            refused: AtomicUsize::new(0),
        }
    }

    /// Toggle refusal of non-blocking requests.
    pub fn set_fail_nonblocking(&self, fail: bool) {
        self.fail_nonblocking.store(fail, RELAXED);
    }

    /// Toggle refusal of every request.
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, RELAXED);
    }

    /// Number of nodes handed out so far.
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.allocated.load(RELAXED)
    }

    /// Number of requests refused so far.
    #[must_use]
    pub fn refusals(&self) -> usize {
        self.refused.load(RELAXED)
    }
}

impl<A: NodeAllocator> NodeAllocator for FaultInjectingAllocator<A> {
    fn alloc_node(&self, mode: AllocMode) -> Option<Box<XaNode>> {
        let refuse: bool = self.fail_all.load(RELAXED)
            || (!mode.may_block() && self.fail_nonblocking.load(RELAXED));
        if refuse {
            self.refused.fetch_add(1, RELAXED);
            return None;
        }
        let node = self.inner.alloc_node(mode)?;
        self.allocated.fetch_add(1, RELAXED);
        Some(node)
    }
}

impl<A: NodeAllocator> StdFmt::Debug for FaultInjectingAllocator<A> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("FaultInjectingAllocator")
            .field("fail_nonblocking", &self.fail_nonblocking.load(RELAXED))
            .field("fail_all", &self.fail_all.load(RELAXED))
            .field("allocated", &self.allocations())
            .field("refused", &self.refusals())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_allocator_returns_empty_nodes() {
        let node = GlobalNodeAllocator.alloc_node(AllocMode::NonBlocking);
        let node = node.as_deref().map(|n| (n.count(), n.shift(), n.get(0).is_null()));
        assert_eq!(node, Some((0, 0, true)));
    }

    #[test]
    fn fault_injection_respects_mode() {
        let alloc = FaultInjectingAllocator::new();
        assert!(alloc.alloc_node(AllocMode::NonBlocking).is_none());
        assert!(alloc.alloc_node(AllocMode::Blocking).is_some());
        alloc.set_fail_all(true);
        assert!(alloc.alloc_node(AllocMode::Blocking).is_none());
        alloc.set_fail_all(false);
        alloc.set_fail_nonblocking(false);
        assert!(alloc.alloc_node(AllocMode::NonBlocking).is_some());
        assert_eq!(alloc.allocations(), 2);
        assert_eq!(alloc.refusals(), 2);
    }
}
