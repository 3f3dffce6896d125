//! Locked mutation: store, growth, shrinking, node deletion and tags.
//!
//! # Allocation
//!
//! Nodes are taken from the cursor's spare pool first and otherwise
//! requested with [`AllocMode::NonBlocking`]. All nodes a step needs (new top
//! levels, or a missing chain below an empty slot) are reserved before any
//! of them is published, and a chain is linked privately and published with
//! a single slot store. When a reservation fails after the tree already grew
//! for this attempt, the growth is shrunk away again, so a failed store
//! leaves the tree's contents unchanged. The cursor then records how many
//! nodes the whole attempt needs for [`Cursor::nomem`].

use std::ptr::NonNull;

use crate::alloc::{AllocMode, NodeAllocator};
use crate::array::XaLock;
use crate::entry::{Entry, RawEntry};
use crate::error::XaError;
use crate::node::{CHUNK_MASK, CHUNK_SHIFT, CHUNK_SIZE, XaNode};
use crate::ordering::READ_ORD;
use crate::tag::{self, Tag};
use crate::tracing_helpers::{debug_log, trace_log};

use super::{Cursor, Position, node_ref};

impl<T, A: NodeAllocator> Cursor<'_, T, A> {
    // ========================================================================
    //  Public locked operations
    // ========================================================================

    /// Store `entry` over the cursor's index (or its whole range for an
    /// order cursor) and return the entry it replaced.
    ///
    /// `None` erases. On failure the cursor holds the error (see
    /// [`error`](Self::error)) and the tree is unchanged.
    ///
    /// # Panics
    ///
    /// If `lock` guards a different array.
    pub fn store(&mut self, lock: &XaLock<'_, T, A>, entry: Option<Entry<T>>) -> Option<Entry<T>> {
        self.assert_locked(lock);
        match RawEntry::encode(entry) {
            Ok(raw) => self.store_raw(raw).decode(),
            Err(err) => {
                self.set_error(err);
                None
            }
        }
    }

    /// Set `tag` on the entry the cursor is positioned at.
    ///
    /// # Panics
    ///
    /// If `lock` guards a different array.
    pub fn set_tag(&mut self, lock: &XaLock<'_, T, A>, tag: Tag) {
        self.assert_locked(lock);
        self.set_tag_locked(tag);
    }

    /// Clear `tag` on the entry the cursor is positioned at.
    ///
    /// # Panics
    ///
    /// If `lock` guards a different array.
    pub fn clear_tag(&mut self, lock: &XaLock<'_, T, A>, tag: Tag) {
        self.assert_locked(lock);
        self.clear_tag_locked(tag);
    }

    /// Next entry that a store through this order cursor would overwrite.
    ///
    /// Call repeatedly until `None`; the cursor is then positioned for the
    /// store.
    ///
    /// # Panics
    ///
    /// If `lock` guards a different array.
    pub fn find_conflict(&mut self, lock: &XaLock<'_, T, A>) -> Option<Entry<T>> {
        self.assert_locked(lock);
        self.find_conflict_raw().decode()
    }

    // ========================================================================
    //  Store
    // ========================================================================

    /// The store engine. Caller holds the tree lock.
    pub(crate) fn store_raw(&mut self, entry: RawEntry) -> RawEntry {
        if !entry.is_null() && self.oversized {
            self.set_error(XaError::OutOfBounds);
            return RawEntry::NULL;
        }

        let mut first = if entry.is_null() {
            self.load_raw()
        } else {
            self.create()
        };
        if !self.pos.is_valid() {
            return first;
        }

        let node = self.pos.node();
        // SAFETY: Reached under the lock and our guard.
        let n: Option<&XaNode> = node.map(|node| unsafe { node_ref(node) });
        let sibs = match n {
            Some(n) if self.shift < n.shift() => 0,
            _ => self.sibs,
        };
        if first == entry && sibs == 0 {
            return first;
        }

        let canonical = self.offset;
        let max = canonical + sibs;
        if let Some(n) = n {
            n.squash_tags(canonical, sibs);
        }
        if entry.is_null() {
            self.init_tags();
        }

        let value = entry.is_value();
        let mut entry = entry;
        let mut next = first;
        let mut offset = canonical;
        let mut count: i32 = 0;
        let mut values: i32 = 0;

        loop {
            // Tags were cleared above, before the slot goes empty.
            match n {
                Some(n) => n.set(offset, entry),
                None => self.xa.set_head(entry),
            }
            if let Some(child) = next.to_node() {
                if n.is_none_or(|n| n.shift() != 0) {
                    self.free_nodes(child);
                }
            }
            let Some(n) = n else {
                break;
            };

            count += i32::from(next.is_null()) - i32::from(entry.is_null());
            values += i32::from(!first.is_value()) - i32::from(!value);
            if entry.is_null() {
                if usize::from(offset) == CHUNK_MASK {
                    break;
                }
            } else {
                if offset == max {
                    break;
                }
                if !entry.is_sibling() {
                    entry = RawEntry::sibling(canonical);
                }
            }

            offset += 1;
            next = n.get(offset);
            if !next.is_sibling() {
                if entry.is_null() && offset > max {
                    break;
                }
                first = next;
            }
        }

        self.update_node(node, count, values);
        first
    }

    /// Apply count deltas to `node` and delete it if it became empty.
    fn update_node(&mut self, node: Option<NonNull<XaNode>>, count: i32, values: i32) {
        let Some(node) = node else {
            return;
        };
        if count == 0 && values == 0 {
            return;
        }
        // SAFETY: Reached under the lock.
        unsafe { node_ref(node) }.update_counts(count, values);
        if count < 0 {
            self.delete_node();
        }
    }

    // ========================================================================
    //  Growth
    // ========================================================================

    /// Highest index the pending store touches, plus one when the range ends
    /// on a level boundary so the top grows one level past it.
    fn max_index(&self) -> usize {
        let mut max = self.index;
        if self.shift != 0 || self.sibs != 0 {
            let mask = (usize::from(self.sibs) + 1)
                .wrapping_shl(self.shift)
                .wrapping_sub(1);
            max |= mask;
            if mask == max {
                max = max.wrapping_add(1);
            }
        }
        max
    }

    /// Take `needed` nodes from the spare pool or the allocator.
    ///
    /// On failure nothing is consumed, the cursor records `NoMemory` and
    /// remembers how many nodes the whole attempt needs.
    fn reserve(&mut self, needed: usize) -> Option<Vec<Box<XaNode>>> {
        let mut nodes: Vec<Box<XaNode>> = Vec::with_capacity(needed);
        while nodes.len() < needed {
            let node = match self.spare.pop() {
                Some(node) => node,
                None => match self.xa.allocator().alloc_node(AllocMode::NonBlocking) {
                    Some(node) => node,
                    None => {
                        self.spare.append(&mut nodes);
                        self.wanted = self.used + needed;
                        self.set_error(XaError::NoMemory);
                        trace_log!(needed, wanted = self.wanted, "no node available under lock");
                        return None;
                    }
                },
            };
            nodes.push(node);
        }
        self.used += needed;
        Some(nodes)
    }

    /// Position for writing a non-empty entry, growing the tree and creating
    /// missing nodes as needed. Returns the entry currently in the slot.
    fn create(&mut self) -> RawEntry {
        let order = self.shift;
        self.used = 0;
        let mut grown = false;

        let (mut shift, mut entry) = match self.pos {
            Position::Error(_) => return RawEntry::NULL,
            Position::Node(node) => {
                // SAFETY: Reached under the lock.
                let n = unsafe { node_ref(node) };
                (n.shift(), n.get(self.offset))
            }
            Position::Restart | Position::Bounds | Position::Head => {
                self.pos = Position::Head;
                let Some((shift, did_grow)) = self.expand(self.xa.head()) else {
                    return RawEntry::NULL;
                };
                grown = did_grow;
                (shift, self.xa.head())
            }
        };

        while shift > order {
            shift -= CHUNK_SHIFT;
            if entry.is_null() {
                let levels = ((shift - order) / CHUNK_SHIFT) as usize + 1;
                let Some(nodes) = self.reserve(levels) else {
                    if grown {
                        self.undo_growth();
                    }
                    return RawEntry::NULL;
                };
                self.link_chain(nodes, shift);
                return RawEntry::NULL;
            }
            let Some(node) = entry.to_node() else {
                break;
            };
            entry = self.descend(node);
        }

        entry
    }

    /// Add levels on top until the head covers the pending range.
    ///
    /// Returns the shift one level above the (possibly new) top and whether
    /// levels were added. An empty tree grows nothing here: the caller's
    /// descent creates the whole chain.
    fn expand(&mut self, head: RawEntry) -> Option<(u32, bool)> {
        let max = self.max_index();
        if head.is_null() {
            if max == 0 {
                return Some((0, false));
            }
            let mut shift = 0;
            while (max >> shift) >= CHUNK_SIZE {
                shift += CHUNK_SHIFT;
            }
            return Some((shift + CHUNK_SHIFT, false));
        }

        let old_top = head.to_node();
        // SAFETY: Reached under the lock.
        let mut shift = old_top.map_or(0, |node| unsafe { node_ref(node) }.shift() + CHUNK_SHIFT);

        let mut levels: usize = 0;
        let mut covered = self.max_index_of(head);
        let mut probe = shift;
        while max > covered {
            covered = XaNode::max_index_for(probe);
            probe += CHUNK_SHIFT;
            levels += 1;
        }
        if levels == 0 {
            if let Some(node) = old_top {
                self.pos = Position::Node(node);
            }
            return Some((shift, false));
        }

        let nodes = self.reserve(levels)?;
        let tree_tags = self.xa.tree_tags();
        let mut child = head;
        let mut top = None;
        for mut node in nodes {
            node.init(shift, 0, std::ptr::null_mut());
            node.seed_slot0_tags(tree_tags);
            node.set(0, child);
            node.set_counts(1, u8::from(child.is_value()));
            let ptr = NonNull::from(Box::leak(node));
            if let Some(below) = child.to_node() {
                // SAFETY: Either the old top (locked) or a node created in
                // this loop; both stay allocated.
                let below = unsafe { node_ref(below) };
                below.set_offset(0);
                below.set_parent(ptr.as_ptr());
            }
            child = RawEntry::from_node(ptr);
            top = Some(ptr);
            shift += CHUNK_SHIFT;
        }

        self.xa.set_head(child);
        if let Some(top) = top {
            self.pos = Position::Node(top);
        }
        debug_log!(levels, shift, "tree grown");
        Some((shift, true))
    }

    /// Link a private chain of nodes below the current position and publish
    /// it with one store. The first node gets `top_shift`, each following
    /// one sits `CHUNK_SHIFT` lower. Leaves the cursor at the bottom node.
    fn link_chain(&mut self, nodes: Vec<Box<XaNode>>, top_shift: u32) {
        let parent = self.pos.node();
        let mut link_offset = if parent.is_some() { self.offset } else { 0 };
        let mut link_parent = parent.map_or(std::ptr::null_mut(), NonNull::as_ptr);
        let mut shift = top_shift;
        let mut top: Option<NonNull<XaNode>> = None;
        let mut bottom: Option<NonNull<XaNode>> = None;

        for mut node in nodes {
            node.init(shift, link_offset, link_parent);
            let ptr = NonNull::from(Box::leak(node));
            match bottom {
                Some(above) => {
                    // SAFETY: `above` is still private to this thread.
                    let above = unsafe { node_ref(above) };
                    above.set(link_offset, RawEntry::from_node(ptr));
                    above.set_counts(1, 0);
                }
                None => top = Some(ptr),
            }
            // SAFETY: Just leaked; private.
            link_offset = unsafe { node_ref(ptr) }.offset_of(self.index);
            link_parent = ptr.as_ptr();
            bottom = Some(ptr);
            shift = shift.saturating_sub(CHUNK_SHIFT);
        }

        let (Some(top), Some(bottom)) = (top, bottom) else {
            return;
        };
        let entry = RawEntry::from_node(top);
        match parent {
            Some(parent) => {
                // SAFETY: Reached under the lock.
                let parent = unsafe { node_ref(parent) };
                parent.update_counts(1, 0);
                parent.set(self.offset, entry);
            }
            None => self.xa.set_head(entry),
        }
        trace_log!(top_shift, index = self.index, "node chain published");
        self.pos = Position::Node(bottom);
        self.offset = link_offset;
    }

    /// Shrink away levels this attempt added on top. Keeps the recorded
    /// error.
    fn undo_growth(&mut self) {
        let err = self.pos;
        if let Some(top) = self.xa.head().to_node() {
            self.shrink(top);
        }
        self.pos = err;
        debug_log!("growth undone after failed allocation");
    }

    // ========================================================================
    //  Removal
    // ========================================================================

    #[inline(always)]
    fn retire(&self, node: NonNull<XaNode>) {
        debug_assert!(!self.is_linked(node), "node retired while still reachable");
        // SAFETY: Callers unlink `node` under the lock before retiring it, and
        // every removal path retires a node exactly once.
        unsafe { self.xa.allocator().retire_node(node, &self.guard) };
    }

    /// Whether `node` can be reached from the head by following the slot its
    /// parent chain names.
    pub(crate) fn is_linked(&self, node: NonNull<XaNode>) -> bool {
        let mut node = node;
        loop {
            // SAFETY: Reached under the lock and our guard.
            let n = unsafe { node_ref(node) };
            let link = RawEntry::from_node(node);
            let Some(parent) = NonNull::new(n.parent_link().load(READ_ORD)) else {
                return self.xa.head() == link;
            };
            // SAFETY: As above.
            if unsafe { node_ref(parent) }.get(n.offset()) != link {
                return false;
            }
            node = parent;
        }
    }

    /// Free empty nodes from the current one upwards, then collapse the top.
    fn delete_node(&mut self) {
        let Position::Node(mut node) = self.pos else {
            return;
        };
        loop {
            // SAFETY: Reached under the lock.
            let n = unsafe { node_ref(node) };
            if n.count() != 0 {
                break;
            }
            let parent = NonNull::new(n.parent_link().load(READ_ORD));
            self.offset = n.offset();
            trace_log!(shift = n.shift(), offset = self.offset, "empty node deleted");

            // Unlink before retiring: a reader that starts after the retire
            // must not be able to reach the node.
            let Some(parent) = parent else {
                self.xa.set_head(RawEntry::NULL);
                self.retire(node);
                self.pos = Position::Bounds;
                return;
            };
            // SAFETY: Parents of reachable nodes are reachable.
            let p = unsafe { node_ref(parent) };
            p.set(self.offset, RawEntry::NULL);
            self.retire(node);
            p.update_counts(-1, 0);
            self.pos = Position::Node(parent);
            node = parent;
        }

        // SAFETY: Reached under the lock.
        if unsafe { node_ref(node) }.parent_link().load(READ_ORD).is_null() {
            self.shrink(node);
        }
    }

    /// Collapse the top while it has a single entry in slot 0 that can live
    /// one level higher.
    fn shrink(&mut self, top: NonNull<XaNode>) {
        let mut node = top;
        loop {
            // SAFETY: `node` is the current top, reached under the lock.
            let n = unsafe { node_ref(node) };
            if n.count() != 1 {
                break;
            }
            let entry = n.get(0);
            if entry.is_null() {
                break;
            }
            let child = entry.to_node();
            if child.is_none() && n.shift() != 0 {
                break;
            }

            self.pos = Position::Bounds;
            self.xa.set_head(entry);
            n.set_counts(0, 0);
            if child.is_none() {
                n.set(0, RawEntry::RETRY);
            }
            self.retire(node);
            debug_log!(shift = n.shift(), "tree shrunk");

            let Some(child) = child else {
                break;
            };
            // SAFETY: The child is now the top.
            unsafe { node_ref(child) }.set_parent(std::ptr::null_mut());
            node = child;
        }
    }

    /// Retire a detached subtree, leaving retry markers in every non-empty
    /// slot so readers still inside it restart.
    fn free_nodes(&self, top: NonNull<XaNode>) {
        let mut node = top;
        let mut offset: u8 = 0;
        loop {
            // SAFETY: The subtree was reachable until just now; our guard
            // keeps it allocated.
            let n = unsafe { node_ref(node) };
            let entry = n.get(offset);
            if n.shift() > 0 {
                if let Some(child) = entry.to_node() {
                    node = child;
                    offset = 0;
                    continue;
                }
            }
            if !entry.is_null() {
                n.set(offset, RawEntry::RETRY);
            }
            offset += 1;

            while usize::from(offset) == CHUNK_SIZE {
                // SAFETY: As above.
                let n = unsafe { node_ref(node) };
                let parent = n.parent_link().load(READ_ORD);
                offset = n.offset() + 1;
                n.set_counts(0, 0);
                self.retire(node);
                if node == top {
                    trace_log!(shift = n.shift(), "subtree retired");
                    return;
                }
                let Some(parent) = NonNull::new(parent) else {
                    return;
                };
                node = parent;
            }
        }
    }

    /// Detach and retire the whole tree, clearing every tag.
    pub(crate) fn destroy_tree(&mut self) {
        let head = self.xa.head();
        self.xa.set_head(RawEntry::NULL);
        self.pos = Position::Head;
        self.init_tags();
        if let Some(top) = head.to_node() {
            self.free_nodes(top);
        }
        self.pos = Position::Restart;
    }

    // ========================================================================
    //  Tags
    // ========================================================================

    pub(crate) fn set_tag_locked(&self, tag: Tag) {
        match self.pos {
            Position::Node(node) => {
                // SAFETY: Reached under the lock.
                if unsafe { tag::propagate_set(node, self.offset, tag) } {
                    self.xa.set_tree_tag(tag);
                }
            }
            Position::Head => self.xa.set_tree_tag(tag),
            _ => {}
        }
    }

    pub(crate) fn clear_tag_locked(&self, tag: Tag) {
        match self.pos {
            Position::Node(node) => {
                // SAFETY: Reached under the lock.
                if unsafe { tag::propagate_clear(node, self.offset, tag) } {
                    self.xa.clear_tree_tag(tag);
                }
            }
            Position::Head => self.xa.clear_tree_tag(tag),
            _ => {}
        }
    }

    /// Clear every tag class at the current position.
    fn init_tags(&self) {
        for tag in Tag::ALL {
            self.clear_tag_locked(tag);
        }
    }

    // ========================================================================
    //  Conflicts
    // ========================================================================

    pub(crate) fn find_conflict_raw(&mut self) -> RawEntry {
        match self.pos {
            Position::Error(_) | Position::Head => return RawEntry::NULL,
            Position::Restart | Position::Bounds => {
                let mut curr = self.start();
                if curr.is_null() {
                    return RawEntry::NULL;
                }
                while let Some(node) = curr.to_node() {
                    curr = self.descend(node);
                }
                if !curr.is_null() {
                    return curr;
                }
            }
            Position::Node(_) => {}
        }

        let Position::Node(mut node) = self.pos else {
            return RawEntry::NULL;
        };
        // SAFETY: Reached under the lock.
        if unsafe { node_ref(node) }.shift() > self.shift {
            return RawEntry::NULL;
        }

        loop {
            // SAFETY: Reached under the lock.
            let n = unsafe { node_ref(node) };
            if n.shift() == self.shift {
                if (self.offset & self.sibs) == self.sibs {
                    break;
                }
            } else if usize::from(self.offset) == CHUNK_MASK {
                self.offset = n.offset();
                match NonNull::new(n.parent_link().load(READ_ORD)) {
                    Some(parent) => {
                        node = parent;
                        self.pos = Position::Node(parent);
                    }
                    None => {
                        self.pos = Position::Head;
                        break;
                    }
                }
                continue;
            }

            self.offset += 1;
            let mut curr = n.get(self.offset);
            if curr.is_sibling() {
                continue;
            }
            while let Some(child) = curr.to_node() {
                node = child;
                self.pos = Position::Node(child);
                self.offset = 0;
                // SAFETY: Reached under the lock.
                curr = unsafe { node_ref(child) }.get(0);
            }
            if !curr.is_null() {
                return curr;
            }
        }

        self.offset = self.offset.wrapping_sub(self.sibs);
        RawEntry::NULL
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "Fail fast in tests")]

    use crate::alloc::{AllocMode, FaultInjectingAllocator};
    use crate::array::XArray;
    use crate::cursor::{Cursor, CursorState};
    use crate::entry::{Entry, RawEntry};
    use crate::error::XaError;
    use crate::tag::Tag;

    fn value(v: usize) -> Option<Entry<u64>> {
        Some(Entry::Value(v))
    }

    #[test]
    fn deleted_nodes_are_unlinked_before_retiring() {
        let xa: XArray<u64> = XArray::new();
        xa.store(5, value(5)).unwrap();
        xa.store(1 << 12, value(12)).unwrap();
        xa.store(1 << 24, value(24)).unwrap();

        let lock = xa.lock();
        let mut xas = Cursor::new(&xa, 1 << 12);
        assert_eq!(xas.load(), value(12));
        let leaf = xas.node_ptr().unwrap();
        assert!(xas.is_linked(leaf));

        // Empties the leaf and its parent; our guard keeps both allocated.
        assert_eq!(xas.store(&lock, None), value(12));
        assert!(!xas.is_linked(leaf));
        assert_eq!(xa.load(1 << 12), None);

        // Deleting the last nodes empties the head.
        xas.set(1 << 24);
        assert_eq!(xas.load(), value(24));
        let far = xas.node_ptr().unwrap();
        assert_eq!(xas.store(&lock, None), value(24));
        assert!(!xas.is_linked(far));
        xas.set(5);
        assert_eq!(xas.store(&lock, None), value(5));
        assert_eq!(xa.head(), RawEntry::NULL);
    }

    #[test]
    fn store_grows_and_erase_shrinks() {
        let xa: XArray<u64> = XArray::new();
        let lock = xa.lock();
        let mut xas = Cursor::new(&xa, 0);
        assert_eq!(xas.store(&lock, value(0)), None);
        assert_eq!(xa.head(), RawEntry::from_value(0).unwrap());

        xas.set(1 << 20);
        assert_eq!(xas.store(&lock, value(1)), None);
        assert!(xa.head().is_node());

        xas.set(1 << 20);
        assert_eq!(xas.store(&lock, None), value(1));
        assert_eq!(xa.head(), RawEntry::from_value(0).unwrap());
        assert_eq!(xas.state(), CursorState::Bounds);
    }

    #[test]
    fn growth_carries_tree_tags_into_slot_zero() {
        let xa: XArray<u64> = XArray::new();
        xa.store(0, value(0)).unwrap();
        xa.set_tag(0, Tag::T1);
        xa.store(100, value(100)).unwrap();
        assert!(xa.get_tag(0, Tag::T1));
        assert!(!xa.get_tag(100, Tag::T1));
        assert!(xa.is_tagged(Tag::T1));
        xa.erase(100);
        assert!(xa.get_tag(0, Tag::T1));
        xa.erase(0);
        assert!(!xa.is_tagged(Tag::T1));
    }

    #[test]
    fn failed_growth_leaves_the_tree_unchanged() {
        let xa: XArray<u64, FaultInjectingAllocator> =
            XArray::with_allocator(FaultInjectingAllocator::new());
        xa.store(0, value(0)).unwrap();
        let before = xa.head();

        let mut lock = xa.lock();
        assert_eq!(
            lock.store(1 << 30, value(1), AllocMode::NonBlocking),
            Err(XaError::NoMemory)
        );
        drop(lock);
        assert_eq!(xa.head(), before);
        assert_eq!(xa.load(0), value(0));
        assert_eq!(xa.load(1 << 30), None);

        let mut lock = xa.lock();
        assert_eq!(lock.store(1 << 30, value(1), AllocMode::Blocking), Ok(None));
        drop(lock);
        assert_eq!(xa.load(1 << 30), value(1));
    }

    #[test]
    fn nomem_refills_what_the_attempt_needed() {
        let xa: XArray<u64, FaultInjectingAllocator> =
            XArray::with_allocator(FaultInjectingAllocator::new());
        xa.store(0, value(0)).unwrap();
        xa.store(1, value(1)).unwrap();

        let mut xas = Cursor::new(&xa, usize::MAX);
        let mut attempts = 0;
        loop {
            let lock = xa.lock();
            assert_eq!(xas.store(&lock, value(9)), None);
            drop(lock);
            attempts += 1;
            if attempts == 1 {
                assert_eq!(xas.error(), Some(XaError::NoMemory));
            }
            if !xas.nomem(AllocMode::Blocking) {
                break;
            }
        }

        // Growth first, then the chain below the new top.
        assert_eq!(attempts, 3);
        assert_eq!(xas.error(), None);
        assert!(xas.spare.is_empty());
        assert_eq!(xa.load(usize::MAX), value(9));
        assert_eq!(xa.load(1), value(1));
    }

    #[cfg(feature = "multi-index")]
    #[test]
    fn conflicts_cover_the_whole_range() {
        let xa: XArray<u64> = XArray::new();
        for index in [63, 64, 66, 68] {
            xa.store(index, value(index)).unwrap();
        }
        let lock = xa.lock();
        let mut xas = Cursor::with_order(&xa, 64, 2);
        let mut seen = Vec::new();
        while let Some(entry) = xas.find_conflict(&lock) {
            seen.push(entry.as_value().unwrap());
        }
        assert_eq!(seen, vec![64, 66]);
        xas.store(&lock, value(64));
        assert_eq!(xas.error(), None);
        drop(lock);
        assert_eq!(xa.load(67), value(64));
        assert_eq!(xa.load(68), value(68));
        assert_eq!(xa.load(63), value(63));
    }

    #[cfg(feature = "multi-index")]
    #[test]
    fn multi_store_squashes_tags() {
        let xa: XArray<u64> = XArray::new();
        xa.store(5, value(5)).unwrap();
        xa.set_tag(5, Tag::T0);
        xa.store_order(4, 2, value(4)).unwrap();
        for index in 4..8 {
            assert!(xa.get_tag(index, Tag::T0));
        }
        assert!(!xa.get_tag(8, Tag::T0));
        xa.erase(6);
        assert!(!xa.is_tagged(Tag::T0));
        assert!(xa.is_empty());
    }

    #[cfg(feature = "multi-index")]
    #[test]
    fn oversized_order_rejects_entries() {
        let xa: XArray<u64> = XArray::new();
        assert_eq!(
            xa.store_order(0, usize::BITS, value(1)),
            Err(XaError::OutOfBounds)
        );
        xa.store(77, value(77)).unwrap();
        xa.store_order(0, usize::BITS, None).unwrap();
        assert!(xa.is_empty());
        assert_eq!(xa.load(77), None);
    }
}
