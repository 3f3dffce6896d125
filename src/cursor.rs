//! Cursor: a resumable position in an [`XArray`].
//!
//! A cursor records the index it is working on, the node and slot offset it
//! last reached, and (for multi-index stores) the order of the entry it will
//! write. Read operations run lock-free under the cursor's own reclamation
//! guard and absorb retry markers by restarting the walk. Write operations
//! take the tree's [`XaLock`] as proof of exclusion.
//!
//! # State machine
//!
//! ```text
//! Restart --walk--> Head | Node(n) | Bounds
//! Node(n) --step--> Node(m) | Bounds
//! any --store failure--> Error(e) --nomem--> Restart
//! ```
//!
//! `Restart` and `Error` are frozen: stepping from them does not move the
//! index. The read half of the engine lives in [`walk`], the locked
//! mutation half in [`store`].

mod store;
mod walk;

use std::fmt as StdFmt;
use std::ptr::NonNull;
use std::sync::atomic::AtomicPtr;

use seize::{Guard, LocalGuard};

use crate::alloc::{AllocMode, GlobalNodeAllocator, NodeAllocator};
use crate::array::{XArray, XaLock};
use crate::entry::{Entry, RawEntry};
use crate::error::XaError;
use crate::node::{CHUNK_MASK, CHUNK_SHIFT, XaNode};
use crate::ordering::READ_ORD;
use crate::tag::Tag;
use crate::tracing_helpers::{debug_log, warn_log};

// ============================================================================
//  Position
// ============================================================================

/// Where the cursor currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// The next operation walks from the head.
    Restart,

    /// The index lies outside the tree's current coverage.
    Bounds,

    /// The last operation failed.
    Error(XaError),

    /// At the head slot itself (empty tree or bare entry at index 0).
    Head,

    /// At `offset` within this node.
    Node(NonNull<XaNode>),
}

impl Position {
    #[inline(always)]
    const fn is_valid(self) -> bool {
        matches!(self, Self::Head | Self::Node(_))
    }

    /// Stepping from here re-walks instead of moving the index.
    #[inline(always)]
    const fn is_frozen(self) -> bool {
        matches!(self, Self::Restart | Self::Error(_))
    }

    #[inline(always)]
    const fn node(self) -> Option<NonNull<XaNode>> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }
}

/// Public view of a cursor's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorState {
    /// Not positioned; the next operation walks from the head.
    Restart,

    /// The index is outside the tree's current coverage.
    Bounds,

    /// Positioned at the head slot.
    Head,

    /// Positioned inside a node.
    Node,

    /// The last operation failed with this error.
    Error(XaError),
}

/// Dereference a node reached through a cursor.
///
/// # Safety
///
/// `node` was loaded from the tree while the caller's reclamation guard was
/// active, and that guard is still active.
#[inline(always)]
unsafe fn node_ref<'n>(node: NonNull<XaNode>) -> &'n XaNode {
    // SAFETY: Retired nodes are not reclaimed while a guard that could have
    // observed them is active.
    unsafe { node.as_ref() }
}

// ============================================================================
//  Cursor
// ============================================================================

/// A resumable position in an [`XArray`].
///
/// Holds a reclamation guard for its whole lifetime, so nodes it has visited
/// stay readable even if a writer unlinks them.
pub struct Cursor<'a, T, A: NodeAllocator = GlobalNodeAllocator> {
    xa: &'a XArray<T, A>,
    guard: LocalGuard<'a>,

    /// Index being operated on.
    index: usize,

    /// Shift of the slot the entry occupies (multiple of `CHUNK_SHIFT`).
    shift: u32,

    /// Extra slots (siblings) the entry occupies at that level.
    sibs: u8,

    /// Set when the requested order exceeds the index width.
    oversized: bool,

    /// Slot within the current node.
    offset: u8,

    pos: Position,

    /// Nodes allocated by [`nomem`](Self::nomem) for the next attempt.
    spare: Vec<Box<XaNode>>,

    /// Nodes the failed attempt needed in total.
    wanted: usize,

    /// Nodes the current store attempt has consumed so far.
    used: usize,
}

impl<'a, T, A: NodeAllocator> Cursor<'a, T, A> {
    /// Cursor for a single index.
    #[must_use]
    pub fn new(xa: &'a XArray<T, A>, index: usize) -> Self {
        Self {
            xa,
            guard: xa.collector().enter(),
            index,
            shift: 0,
            sibs: 0,
            oversized: false,
            offset: 0,
            pos: Position::Restart,
            spare: Vec::new(),
            wanted: 0,
            used: 0,
        }
    }

    /// Cursor for a `2^order` aligned range containing `index`.
    #[cfg(feature = "multi-index")]
    #[must_use]
    pub fn with_order(xa: &'a XArray<T, A>, index: usize, order: u32) -> Self {
        let mut xas = Self::new(xa, index);
        xas.set_order(index, order);
        xas
    }

    // ========================================================================
    //  Positioning
    // ========================================================================

    /// Move to `index` and forget the position. The order is kept.
    pub fn set(&mut self, index: usize) {
        self.index = index;
        self.pos = Position::Restart;
    }

    /// Target the `2^order` aligned range containing `index`.
    ///
    /// Orders of `usize::BITS` or more cover the whole index space; storing a
    /// non-empty entry with such an order fails with
    /// [`XaError::OutOfBounds`].
    #[cfg(feature = "multi-index")]
    pub fn set_order(&mut self, index: usize, order: u32) {
        self.oversized = order >= usize::BITS;
        let order = order.min(usize::BITS);
        self.index = if self.oversized { 0 } else { (index >> order) << order };
        self.shift = order - order % CHUNK_SHIFT;
        self.sibs = (1u8 << (order % CHUNK_SHIFT)) - 1;
        self.pos = Position::Restart;
    }

    /// Forget the position so the next operation walks from the head.
    #[inline]
    pub fn reset(&mut self) {
        self.pos = Position::Restart;
    }

    /// The index the cursor is at.
    #[must_use]
    #[inline(always)]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Current position class.
    #[must_use]
    pub const fn state(&self) -> CursorState {
        match self.pos {
            Position::Restart => CursorState::Restart,
            Position::Bounds => CursorState::Bounds,
            Position::Head => CursorState::Head,
            Position::Node(_) => CursorState::Node,
            Position::Error(err) => CursorState::Error(err),
        }
    }

    /// The error recorded by the last operation, if any.
    #[must_use]
    pub const fn error(&self) -> Option<XaError> {
        match self.pos {
            Position::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Record `err`; the cursor stays frozen until reset or `nomem`.
    pub fn set_error(&mut self, err: XaError) {
        self.pos = Position::Error(err);
    }

    /// `Ok(value)` unless the cursor holds an error.
    ///
    /// # Errors
    ///
    /// The recorded error, if any.
    pub fn result<R>(&self, value: R) -> Result<R, XaError> {
        match self.pos {
            Position::Error(err) => Err(err),
            _ => Ok(value),
        }
    }

    #[inline(always)]
    fn set_bounds(&mut self) -> RawEntry {
        self.pos = Position::Bounds;
        RawEntry::NULL
    }

    /// Reset and report `true` if `entry` is the retry marker.
    #[inline(always)]
    fn retry(&mut self, entry: RawEntry) -> bool {
        if entry.is_retry() {
            self.reset();
            return true;
        }
        false
    }

    /// Node the cursor is positioned in.
    pub(crate) const fn node_ptr(&self) -> Option<NonNull<XaNode>> {
        self.pos.node()
    }

    // ========================================================================
    //  Protected loads
    // ========================================================================

    #[inline(always)]
    fn protect(&self, cell: &AtomicPtr<()>) -> RawEntry {
        RawEntry::from_raw(self.guard.protect(cell, READ_ORD))
    }

    #[inline(always)]
    fn load_head(&self) -> RawEntry {
        self.protect(self.xa.head_cell())
    }

    #[inline(always)]
    fn load_slot(&self, node: &XaNode, offset: u8) -> RawEntry {
        self.protect(node.slot(offset))
    }

    #[inline(always)]
    fn load_parent(&self, node: &XaNode) -> Option<NonNull<XaNode>> {
        NonNull::new(self.guard.protect(node.parent_link(), READ_ORD))
    }

    /// Canonical entry for `entry` read from `node`: siblings resolve to the
    /// slot they point at. The index is not moved.
    #[inline(always)]
    fn resolve(&self, node: &XaNode, entry: RawEntry) -> RawEntry {
        if entry.is_sibling() {
            return self.load_slot(node, entry.to_sibling());
        }
        entry
    }

    /// Highest index the tree could cover, as a walk from the head sees it.
    fn max_index_of(&self, entry: RawEntry) -> usize {
        entry.to_node().map_or(0, |node| {
            // SAFETY: Loaded under our guard.
            XaNode::max_index_for(unsafe { node_ref(node) }.shift())
        })
    }

    // ========================================================================
    //  Walking
    // ========================================================================

    /// Position at the head, or report `Bounds` when the tree cannot contain
    /// the index. Valid positions reload their current slot instead.
    pub(crate) fn start(&mut self) -> RawEntry {
        if self.pos.is_valid() {
            return self.reload_raw();
        }
        if matches!(self.pos, Position::Error(_)) {
            return RawEntry::NULL;
        }

        let head = self.load_head();
        match head.to_node() {
            None if self.index != 0 => return self.set_bounds(),
            // SAFETY: Loaded under our guard.
            Some(node) if (self.index >> unsafe { node_ref(node) }.shift()) > CHUNK_MASK => {
                return self.set_bounds();
            }
            _ => {}
        }
        self.pos = Position::Head;
        head
    }

    /// Step into `node` at the slot covering the index.
    ///
    /// A sibling redirects to its canonical slot and moves the index to the
    /// start of the entry's span.
    pub(crate) fn descend(&mut self, node: NonNull<XaNode>) -> RawEntry {
        // SAFETY: Loaded under our guard.
        let n = unsafe { node_ref(node) };
        let mut offset = n.offset_of(self.index);
        let mut entry = self.load_slot(n, offset);
        self.pos = Position::Node(node);
        if entry.is_sibling() {
            offset = entry.to_sibling();
            entry = self.load_slot(n, offset);
            self.move_index(n.shift(), offset);
        }
        self.offset = offset;
        entry
    }

    /// Point the index at the first index covered by slot `offset` of a node
    /// with `shift`. Bits below that slot are cleared.
    #[inline(always)]
    fn move_index(&mut self, shift: u32, offset: u8) {
        self.index &= (!CHUNK_MASK) << shift;
        self.index = self.index.wrapping_add(usize::from(offset) << shift);
    }

    /// Move the index to the first index covered by the slot the walk
    /// stopped on. An entry in an interior node spans the whole slot.
    #[inline(always)]
    pub(crate) fn align_to_slot(&mut self, entry: RawEntry) {
        if entry.is_null() || entry.is_internal() {
            return;
        }
        if let Position::Node(node) = self.pos {
            // SAFETY: Reached under our guard.
            let shift = unsafe { node_ref(node) }.shift();
            if shift > 0 {
                self.move_index(shift, self.offset);
            }
        }
    }

    /// Walk to the entry for the index without interpreting retry markers.
    ///
    /// Stops early at a node whose shift is below the cursor's order, so an
    /// order cursor can land on a node reference.
    pub(crate) fn load_raw(&mut self) -> RawEntry {
        let mut entry = self.start();
        while let Some(node) = entry.to_node() {
            // SAFETY: Loaded under our guard.
            let shift = unsafe { node_ref(node) }.shift();
            if self.shift > shift {
                break;
            }
            entry = self.descend(node);
            if shift == 0 {
                break;
            }
        }
        entry
    }

    /// Re-read the current slot without walking.
    pub(crate) fn reload_raw(&self) -> RawEntry {
        match self.pos {
            Position::Node(node) => {
                // SAFETY: Reached under our guard.
                let n = unsafe { node_ref(node) };
                let entry = self.load_slot(n, self.offset);
                self.resolve(n, entry)
            }
            Position::Head => self.load_head(),
            _ => RawEntry::NULL,
        }
    }

    // ========================================================================
    //  Public reads
    // ========================================================================

    /// Entry at the cursor's index.
    ///
    /// Lands on the canonical slot of a multi-index entry, moving the index
    /// to the start of its span.
    pub fn load(&mut self) -> Option<Entry<T>> {
        loop {
            let entry = self.load_raw();
            if self.retry(entry) {
                continue;
            }
            self.align_to_slot(entry);
            return entry.decode();
        }
    }

    /// Re-read the current slot; walks again if the slot was retired.
    pub fn reload(&mut self) -> Option<Entry<T>> {
        let entry = self.reload_raw();
        if self.retry(entry) {
            return self.load();
        }
        entry.decode()
    }

    /// Check `tag` on the current position.
    #[must_use]
    pub fn get_tag(&self, tag: Tag) -> bool {
        match self.pos {
            Position::Head => self.xa.is_tagged(tag),
            // SAFETY: Reached under our guard.
            Position::Node(node) => unsafe { node_ref(node) }.tag_test(self.offset, tag),
            _ => false,
        }
    }

    // ========================================================================
    //  Allocation backoff
    // ========================================================================

    /// Refill the cursor after a [`XaError::NoMemory`] failure.
    ///
    /// Allocates every node the failed store needed with `mode`, outside any
    /// lock the caller chooses to drop. Returns `true` when the caller should
    /// retry the operation; the cursor is then reset. Returns `false` (and
    /// releases spare nodes) when the last operation did not fail for lack of
    /// memory, or when the allocation failed again.
    pub fn nomem(&mut self, mode: AllocMode) -> bool {
        if self.pos != Position::Error(XaError::NoMemory) {
            self.spare.clear();
            self.wanted = 0;
            return false;
        }

        let wanted = self.wanted.max(1);
        while self.spare.len() < wanted {
            let Some(node) = self.xa.allocator().alloc_node(mode) else {
                warn_log!(wanted, have = self.spare.len(), ?mode, "node allocation refused");
                return false;
            };
            self.spare.push(node);
        }

        debug_log!(spare = self.spare.len(), ?mode, "spare nodes ready, retrying store");
        self.pos = Position::Restart;
        true
    }

    /// Panics unless `lock` guards this cursor's tree.
    #[inline(always)]
    fn assert_locked(&self, lock: &XaLock<'_, T, A>) {
        assert!(
            std::ptr::eq(self.xa, lock.array()),
            "XaLock belongs to a different XArray"
        );
    }
}

impl<T, A: NodeAllocator> StdFmt::Debug for Cursor<'_, T, A> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Cursor")
            .field("index", &self.index)
            .field("shift", &self.shift)
            .field("sibs", &self.sibs)
            .field("offset", &self.offset)
            .field("state", &self.state())
            .field("spare", &self.spare.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "Fail fast in tests")]

    use super::*;
    use crate::entry::Entry;

    type Xa = XArray<u64>;

    fn value(v: usize) -> Option<Entry<u64>> {
        Some(Entry::Value(v))
    }

    #[test]
    fn empty_tree_positions() {
        let xa = Xa::new();
        let mut xas = Cursor::new(&xa, 0);
        assert_eq!(xas.load(), None);
        assert_eq!(xas.state(), CursorState::Head);

        xas.set(1);
        assert_eq!(xas.load(), None);
        assert_eq!(xas.state(), CursorState::Bounds);
    }

    #[test]
    fn bare_head_and_node_positions() {
        let xa = Xa::new();
        xa.store(0, value(0)).unwrap();
        let mut xas = Cursor::new(&xa, 0);
        assert_eq!(xas.load(), value(0));
        assert_eq!(xas.state(), CursorState::Head);

        xa.store(70, value(70)).unwrap();
        xas.set(70);
        assert_eq!(xas.load(), value(70));
        assert_eq!(xas.state(), CursorState::Node);
        assert!(xas.node_ptr().is_some());

        xas.set(64 * 64);
        assert_eq!(xas.load(), None);
        assert_eq!(xas.state(), CursorState::Bounds);
    }

    #[cfg(feature = "multi-index")]
    #[test]
    fn load_inside_span_moves_to_the_start() {
        let xa = Xa::new();
        xa.store_order(12, 2, value(12)).unwrap();
        let mut xas = Cursor::new(&xa, 14);
        assert_eq!(xas.load(), value(12));
        assert_eq!(xas.index(), 12);
    }

    #[cfg(feature = "multi-index")]
    #[test]
    fn load_inside_wide_entry_moves_to_the_start() {
        let xa = Xa::new();
        xa.store_order(4096, 12, value(7)).unwrap();
        xa.store(9000, value(9)).unwrap();
        let mut xas = Cursor::new(&xa, 5000);
        assert_eq!(xas.load(), value(7));
        assert_eq!(xas.index(), 4096);
        xas.set(9000);
        assert_eq!(xas.load(), value(9));
        assert_eq!(xas.index(), 9000);
    }

    #[cfg(feature = "multi-index")]
    #[test]
    fn set_order_aligns_the_index() {
        let xa = Xa::new();
        let mut xas = Cursor::with_order(&xa, 77, 3);
        assert_eq!(xas.index(), 72);
        assert_eq!((xas.shift, xas.sibs), (0, 7));

        xas.set_order(5000, 8);
        assert_eq!(xas.index(), 4864);
        assert_eq!((xas.shift, xas.sibs), (6, 3));

        xas.set_order(5000, usize::BITS);
        assert_eq!(xas.index(), 0);
        assert!(xas.oversized);
    }

    #[test]
    fn nomem_without_error_is_a_no_op() {
        let xa = Xa::new();
        let mut xas = Cursor::new(&xa, 3);
        assert!(!xas.nomem(AllocMode::Blocking));
        assert_eq!(xas.state(), CursorState::Restart);
    }

    #[test]
    fn errors_freeze_the_cursor() {
        let xa = Xa::new();
        xa.store(5, value(5)).unwrap();
        let mut xas = Cursor::new(&xa, 5);
        xas.set_error(XaError::AlreadyExists);
        assert_eq!(xas.load(), None);
        assert_eq!(xas.next(), None);
        assert_eq!(xas.index(), 5);
        assert_eq!(xas.result(()), Err(XaError::AlreadyExists));
        xas.reset();
        assert_eq!(xas.load(), value(5));
    }
}
