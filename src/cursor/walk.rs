//! Lock-free traversal: stepping, searching and tagged searching.
//!
//! Every public method here absorbs retry markers by resetting the cursor
//! and walking again from the head, so callers only ever see caller entries
//! or `None`.

use std::ptr::NonNull;

use crate::alloc::NodeAllocator;
use crate::entry::{Entry, RawEntry};
use crate::node::{CHUNK_MASK, CHUNK_SIZE, XaNode};
use crate::tag::{Filter, Tag};

use super::{Cursor, Position, node_ref};

/// `CHUNK_SIZE` as a slot offset: one past the last slot.
#[expect(clippy::cast_possible_truncation, reason = "CHUNK_SIZE is 64")]
const END: u8 = CHUNK_SIZE as u8;

impl<T, A: NodeAllocator> Cursor<'_, T, A> {
    // ========================================================================
    //  Stepping
    // ========================================================================

    /// Move to `index + 1` and return its entry.
    ///
    /// From a frozen cursor this loads the current index instead. Stepping
    /// past `usize::MAX` wraps to 0.
    pub fn next(&mut self) -> Option<Entry<T>> {
        loop {
            let entry = self.next_raw();
            if self.retry(entry) {
                continue;
            }
            return entry.decode();
        }
    }

    /// Move to `index - 1` and return its entry.
    ///
    /// From a frozen cursor this loads the current index instead. Stepping
    /// below 0 wraps to `usize::MAX`.
    pub fn prev(&mut self) -> Option<Entry<T>> {
        loop {
            let entry = self.prev_raw();
            if self.retry(entry) {
                continue;
            }
            return entry.decode();
        }
    }

    fn next_raw(&mut self) -> RawEntry {
        if let Position::Node(node) = self.pos {
            // SAFETY: Reached under our guard.
            let n = unsafe { node_ref(node) };
            if n.shift() == 0 && usize::from(self.offset) != CHUNK_MASK {
                self.index = self.index.wrapping_add(1);
                self.offset += 1;
                let entry = self.load_slot(n, self.offset);
                return self.resolve(n, entry);
            }
        }
        self.next_slow()
    }

    fn next_slow(&mut self) -> RawEntry {
        if !self.pos.is_frozen() {
            self.index = self.index.wrapping_add(1);
        }
        let mut node = match self.pos {
            Position::Node(node) => node,
            Position::Head => return self.set_bounds(),
            _ => return self.load_raw(),
        };

        // SAFETY: Reached under our guard.
        let n = unsafe { node_ref(node) };
        if self.offset != n.offset_of(self.index) {
            self.offset += 1;
        }

        while self.offset == END {
            // SAFETY: Reached under our guard.
            let n = unsafe { node_ref(node) };
            self.offset = n.offset() + 1;
            let Some(parent) = self.load_parent(n) else {
                return self.set_bounds();
            };
            node = parent;
            self.pos = Position::Node(node);
        }

        self.walk_down(node)
    }

    fn prev_raw(&mut self) -> RawEntry {
        if let Position::Node(node) = self.pos {
            // SAFETY: Reached under our guard.
            let n = unsafe { node_ref(node) };
            if n.shift() == 0 && self.offset != 0 {
                self.index = self.index.wrapping_sub(1);
                self.offset -= 1;
                let entry = self.load_slot(n, self.offset);
                return self.resolve(n, entry);
            }
        }
        self.prev_slow()
    }

    fn prev_slow(&mut self) -> RawEntry {
        if !self.pos.is_frozen() {
            self.index = self.index.wrapping_sub(1);
        }
        let mut node = match self.pos {
            Position::Node(node) => node,
            Position::Head => return self.set_bounds(),
            _ => return self.load_raw(),
        };

        // SAFETY: Reached under our guard.
        let n = unsafe { node_ref(node) };
        if self.offset != n.offset_of(self.index) {
            self.offset = self.offset.wrapping_sub(1);
        }

        while self.offset == u8::MAX {
            // SAFETY: Reached under our guard.
            let n = unsafe { node_ref(node) };
            self.offset = n.offset().wrapping_sub(1);
            let Some(parent) = self.load_parent(n) else {
                return self.set_bounds();
            };
            node = parent;
            self.pos = Position::Node(node);
        }

        self.walk_down(node)
    }

    /// From `(node, offset)`, follow node references down to the entry for
    /// the index.
    fn walk_down(&mut self, mut node: NonNull<XaNode>) -> RawEntry {
        loop {
            // SAFETY: Reached under our guard.
            let n = unsafe { node_ref(node) };
            let entry = self.load_slot(n, self.offset);
            let Some(child) = entry.to_node() else {
                return self.resolve(n, entry);
            };
            node = child;
            self.pos = Position::Node(node);
            // SAFETY: Loaded under our guard.
            self.offset = unsafe { node_ref(node) }.offset_of(self.index);
        }
    }

    // ========================================================================
    //  Searching
    // ========================================================================

    /// First present entry at or after the cursor's index, up to `max`.
    ///
    /// On success the index is the entry's first index. On `None` the
    /// cursor is left out of bounds or past `max`.
    pub fn find(&mut self, max: usize) -> Option<Entry<T>> {
        loop {
            let entry = self.find_raw(max);
            if self.retry(entry) {
                continue;
            }
            return entry.decode();
        }
    }

    /// Next present entry after the current one, up to `max`.
    ///
    /// Scans the current leaf directly when it can, falling back to
    /// [`find`](Self::find).
    pub fn next_entry(&mut self, max: usize) -> Option<Entry<T>> {
        loop {
            let entry = self.next_entry_raw(max);
            if self.retry(entry) {
                continue;
            }
            return entry.decode();
        }
    }

    /// First entry tagged with `tag` at or after the cursor's index, up to
    /// `max`.
    pub fn find_tagged(&mut self, max: usize, tag: Tag) -> Option<Entry<T>> {
        loop {
            let entry = self.find_tagged_raw(max, tag);
            if self.retry(entry) {
                continue;
            }
            // A tag bit can outlive its entry for a moment under a
            // concurrent erase; keep searching past it.
            if entry.is_null() && self.pos.node().is_some() && self.index <= max {
                continue;
            }
            return entry.decode();
        }
    }

    /// [`find`](Self::find) or [`find_tagged`](Self::find_tagged).
    pub fn find_filtered(&mut self, max: usize, filter: Filter) -> Option<Entry<T>> {
        match filter {
            Filter::Present => self.find(max),
            Filter::Tagged(tag) => self.find_tagged(max, tag),
        }
    }

    /// Move to the first slot after the current one in this node.
    #[inline(always)]
    fn advance(&mut self) {
        let Position::Node(node) = self.pos else {
            return;
        };
        // SAFETY: Reached under our guard.
        let shift = unsafe { node_ref(node) }.shift();
        self.offset += 1;
        self.move_index(shift, self.offset);
    }

    pub(crate) fn find_raw(&mut self, max: usize) -> RawEntry {
        match self.pos {
            Position::Error(_) | Position::Bounds => return RawEntry::NULL,
            _ if self.index > max => return self.set_bounds(),
            Position::Head => {
                self.index = 1;
                return self.set_bounds();
            }
            Position::Restart => {
                let entry = self.load_raw();
                if !entry.is_null() || self.pos.node().is_none() {
                    self.align_to_slot(entry);
                    return entry;
                }
            }
            Position::Node(node) => {
                // SAFETY: Reached under our guard.
                let n = unsafe { node_ref(node) };
                if n.shift() == 0 && usize::from(self.offset) != (self.index & CHUNK_MASK) {
                    #[expect(clippy::cast_possible_truncation, reason = "at most CHUNK_SIZE")]
                    let offset = ((self.index.wrapping_sub(1) & CHUNK_MASK) + 1) as u8;
                    self.offset = offset;
                }
            }
        }

        self.advance();

        loop {
            let Position::Node(node) = self.pos else {
                break;
            };
            if self.index > max {
                return RawEntry::NULL;
            }
            // SAFETY: Reached under our guard.
            let n = unsafe { node_ref(node) };
            if self.offset == END {
                self.offset = n.offset() + 1;
                match self.load_parent(n) {
                    Some(parent) => self.pos = Position::Node(parent),
                    None => break,
                }
                continue;
            }

            let entry = self.load_slot(n, self.offset);
            if let Some(child) = entry.to_node() {
                self.pos = Position::Node(child);
                self.offset = 0;
                continue;
            }
            if !entry.is_null() && !entry.is_sibling() {
                return entry;
            }
            self.advance();
        }

        self.set_bounds()
    }

    fn next_entry_raw(&mut self, max: usize) -> RawEntry {
        let Position::Node(node) = self.pos else {
            return self.find_raw(max);
        };
        // SAFETY: Reached under our guard.
        let n = unsafe { node_ref(node) };
        if n.shift() != 0 || usize::from(self.offset) != (self.index & CHUNK_MASK) {
            return self.find_raw(max);
        }

        loop {
            if self.index >= max || usize::from(self.offset) == CHUNK_MASK {
                return self.find_raw(max);
            }
            let entry = self.load_slot(n, self.offset + 1);
            if entry.is_internal() {
                return self.find_raw(max);
            }
            self.offset += 1;
            self.index = self.index.wrapping_add(1);
            if !entry.is_null() {
                return entry;
            }
        }
    }

    // ========================================================================
    //  Tagged search
    // ========================================================================

    /// Offset of the first slot at or after the current one (after it, when
    /// `advance`) whose `tag` bit is set, or `END`.
    fn find_chunk(&self, node: &XaNode, advance: bool, tag: Tag) -> u8 {
        let mut offset = u32::from(self.offset);
        if advance {
            offset += 1;
        }
        if offset < u32::from(END) {
            let bits = node.tag_bits(tag) & (u64::MAX << offset);
            if bits != 0 {
                #[expect(clippy::cast_possible_truncation, reason = "below 64")]
                return bits.trailing_zeros() as u8;
            }
        }
        END
    }

    /// Leave a tagged search: past `max` the cursor restarts, otherwise it
    /// is out of bounds.
    fn leave_tagged(&mut self, max: usize) -> RawEntry {
        if self.index > max {
            self.pos = Position::Restart;
            return RawEntry::NULL;
        }
        self.set_bounds()
    }

    fn find_tagged_raw(&mut self, max: usize, tag: Tag) -> RawEntry {
        let mut advance = true;

        match self.pos {
            Position::Error(_) => return RawEntry::NULL,
            _ if self.index > max => {
                self.pos = Position::Restart;
                return RawEntry::NULL;
            }
            Position::Head => {
                self.index = 1;
                return self.leave_tagged(max);
            }
            Position::Restart | Position::Bounds => {
                advance = false;
                let entry = self.load_head();
                self.pos = Position::Head;
                if self.index > self.max_index_of(entry) {
                    return self.leave_tagged(max);
                }
                let Some(node) = entry.to_node() else {
                    if self.xa.is_tagged(tag) {
                        return entry;
                    }
                    self.index = 1;
                    return self.leave_tagged(max);
                };
                self.pos = Position::Node(node);
                // SAFETY: Loaded under our guard.
                self.offset = unsafe { node_ref(node) }.offset_of(self.index);
            }
            Position::Node(_) => {}
        }

        while self.index <= max {
            let Position::Node(node) = self.pos else {
                break;
            };
            // SAFETY: Reached under our guard.
            let n = unsafe { node_ref(node) };

            if self.offset == END {
                self.offset = n.offset() + 1;
                let Some(parent) = self.load_parent(n) else {
                    break;
                };
                self.pos = Position::Node(parent);
                advance = false;
                continue;
            }

            if !advance {
                let entry = self.load_slot(n, self.offset);
                if entry.is_sibling() {
                    self.offset = entry.to_sibling();
                    self.move_index(n.shift(), self.offset);
                }
            }

            let offset = self.find_chunk(n, advance, tag);
            if offset > self.offset {
                advance = false;
                self.move_index(n.shift(), offset);
                if self.index.wrapping_sub(1) >= max {
                    self.pos = Position::Restart;
                    return RawEntry::NULL;
                }
                self.offset = offset;
                if offset == END {
                    continue;
                }
            }

            let entry = self.load_slot(n, self.offset);
            let Some(child) = entry.to_node() else {
                self.align_to_slot(entry);
                return entry;
            };
            self.pos = Position::Node(child);
            // SAFETY: Loaded under our guard.
            self.offset = unsafe { node_ref(child) }.offset_of(self.index);
        }

        self.leave_tagged(max)
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "Fail fast in tests")]

    use crate::array::XArray;
    use crate::cursor::{Cursor, CursorState};
    use crate::entry::Entry;
    use crate::tag::Tag;

    fn value(v: usize) -> Option<Entry<u64>> {
        Some(Entry::Value(v))
    }

    fn filled(indices: &[usize]) -> XArray<u64> {
        let xa = XArray::new();
        for &index in indices {
            xa.store(index, value(index)).unwrap();
        }
        xa
    }

    #[test]
    fn next_walks_across_leaves() {
        let xa = filled(&[62, 63, 64, 65]);
        let mut xas = Cursor::new(&xa, 62);
        assert_eq!(xas.load(), value(62));
        assert_eq!(xas.next(), value(63));
        assert_eq!(xas.next(), value(64));
        assert_eq!(xas.index(), 64);
        assert_eq!(xas.next(), value(65));
        assert_eq!(xas.prev(), value(64));
        assert_eq!(xas.prev(), value(63));
        assert_eq!(xas.index(), 63);
    }

    #[test]
    fn stepping_wraps_around_the_index_space() {
        let xa = filled(&[0, 1]);
        let mut xas = Cursor::new(&xa, usize::MAX);
        assert_eq!(xas.next(), None);
        assert_eq!(xas.index(), usize::MAX);
        assert_eq!(xas.next(), value(0));
        assert_eq!(xas.index(), 0);
        assert_eq!(xas.prev(), None);
        assert_eq!(xas.index(), usize::MAX);
        assert_eq!(xas.state(), CursorState::Bounds);
    }

    #[test]
    fn find_skips_gaps_and_stops_at_max() {
        let xa = filled(&[3, 700, 90_000]);
        let mut xas = Cursor::new(&xa, 0);
        assert_eq!(xas.find(usize::MAX), value(3));
        assert_eq!(xas.index(), 3);
        assert_eq!(xas.next_entry(usize::MAX), value(700));
        assert_eq!(xas.index(), 700);
        assert_eq!(xas.next_entry(10_000), None);
        assert_eq!(xas.next_entry(usize::MAX), value(90_000));
        assert_eq!(xas.next_entry(usize::MAX), None);
        assert_eq!(xas.state(), CursorState::Bounds);

        xas.set(701);
        assert_eq!(xas.find(usize::MAX), value(90_000));
    }

    #[test]
    fn find_on_a_bare_head() {
        let xa = filled(&[0]);
        let mut xas = Cursor::new(&xa, 0);
        assert_eq!(xas.find(usize::MAX), value(0));
        assert_eq!(xas.find(usize::MAX), None);
        assert_eq!(xas.index(), 1);
    }

    #[test]
    fn find_tagged_uses_the_summaries() {
        let xa = filled(&[1, 2, 5000, 5001, 1 << 20]);
        xa.set_tag(5001, Tag::T1);
        xa.set_tag(1 << 20, Tag::T1);

        let mut xas = Cursor::new(&xa, 0);
        assert_eq!(xas.find_tagged(usize::MAX, Tag::T1), value(5001));
        assert_eq!(xas.index(), 5001);
        assert_eq!(xas.find_tagged(usize::MAX, Tag::T1), value(1 << 20));
        assert_eq!(xas.find_tagged(usize::MAX, Tag::T1), None);

        xas.set(0);
        assert_eq!(xas.find_tagged(5000, Tag::T1), None);
        xas.set(0);
        assert_eq!(xas.find_tagged(usize::MAX, Tag::T0), None);
    }

    #[test]
    fn find_tagged_on_a_bare_head() {
        let xa = filled(&[0]);
        xa.set_tag(0, Tag::T2);
        let mut xas = Cursor::new(&xa, 0);
        assert_eq!(xas.find_tagged(usize::MAX, Tag::T2), value(0));
        assert_eq!(xas.find_tagged(usize::MAX, Tag::T2), None);
    }
}
