//! Radix-tree node.
//!
//! A node covers `CHUNK_SIZE << shift` consecutive indices. Slot `i` covers
//! the sub-range starting at `i << shift` within that span. Leaves have
//! `shift == 0`.
//!
//! All slot, tag and parent accesses are atomic so lock-free readers can walk
//! a node while the lock holder mutates it. Bookkeeping (`count`,
//! `nr_values`, `offset`) is only touched under the tree lock.

use std::fmt as StdFmt;
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicU64};

use crate::entry::RawEntry;
use crate::ordering::{READ_ORD, RELAXED, RMW_ORD, WRITE_ORD};
use crate::tag::{MAX_TAGS, Tag};

/// Bits of the index consumed per level.
pub const CHUNK_SHIFT: u32 = 6;

/// Slots per node.
pub const CHUNK_SIZE: usize = 1 << CHUNK_SHIFT;

/// Mask selecting a slot offset.
pub const CHUNK_MASK: usize = CHUNK_SIZE - 1;

// ============================================================================
//  XaNode
// ============================================================================

/// A fixed fan-out node of the tree.
///
/// The parent link is a non-owning back-reference used for ascent. Ownership
/// runs strictly from the head down through node-reference slots.
#[repr(C, align(64))]
pub struct XaNode {
    /// Bit position of this node's offset within an index.
    shift: u8,

    /// Offset of this node within its parent (0 for the top node).
    offset: AtomicU8,

    /// Number of non-empty slots, siblings included.
    count: AtomicU8,

    /// Number of slots belonging to inline-value entries.
    nr_values: AtomicU8,

    /// Non-owning link to the parent node; null for the top node.
    parent: AtomicPtr<XaNode>,

    /// Encoded entries.
    slots: [AtomicPtr<()>; CHUNK_SIZE],

    /// One bitmap per tag class; bit `i` mirrors slot `i`.
    tags: [AtomicU64; MAX_TAGS],
}

impl XaNode {
    /// A detached, empty leaf.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shift: 0,
            offset: AtomicU8::new(0),
            count: AtomicU8::new(0),
            nr_values: AtomicU8::new(0),
            parent: AtomicPtr::new(std::ptr::null_mut()),
            slots: [const { AtomicPtr::new(std::ptr::null_mut()) }; CHUNK_SIZE],
            tags: [const { AtomicU64::new(0) }; MAX_TAGS],
        }
    }

    /// Prepare a freshly allocated node before it is published.
    ///
    /// Takes `&mut self`, so it can only run while the node is private.
    #[expect(clippy::cast_possible_truncation, reason = "shift < usize::BITS")]
    pub(crate) fn init(&mut self, shift: u32, offset: u8, parent: *mut Self) {
        debug_assert!(shift < usize::BITS);
        self.shift = shift as u8;
        *self.offset.get_mut() = offset;
        *self.count.get_mut() = 0;
        *self.nr_values.get_mut() = 0;
        *self.parent.get_mut() = parent;
        for slot in &mut self.slots {
            *slot.get_mut() = std::ptr::null_mut();
        }
        for bits in &mut self.tags {
            *bits.get_mut() = 0;
        }
    }

    // ========================================================================
    //  Geometry
    // ========================================================================

    /// Bit position of this node's offset within an index.
    #[must_use]
    #[inline(always)]
    pub fn shift(&self) -> u32 {
        u32::from(self.shift)
    }

    /// Offset of `index` within this node.
    #[must_use]
    #[inline(always)]
    #[expect(clippy::cast_possible_truncation, reason = "masked to CHUNK_MASK")]
    pub fn offset_of(&self, index: usize) -> u8 {
        ((index >> self.shift) & CHUNK_MASK) as u8
    }

    /// Highest index addressable below a node with this shift (wraps to
    /// `usize::MAX` at the top level).
    #[must_use]
    #[inline(always)]
    pub const fn max_index_for(shift: u32) -> usize {
        (CHUNK_SIZE.wrapping_shl(shift)).wrapping_sub(1)
    }

    /// Offset of this node within its parent.
    #[must_use]
    #[inline(always)]
    pub fn offset(&self) -> u8 {
        self.offset.load(RELAXED)
    }

    #[inline(always)]
    pub(crate) fn set_offset(&self, offset: u8) {
        self.offset.store(offset, RELAXED);
    }

    /// The parent link, loaded with reader ordering.
    #[inline(always)]
    pub(crate) const fn parent_link(&self) -> &AtomicPtr<Self> {
        &self.parent
    }

    #[inline(always)]
    pub(crate) fn set_parent(&self, parent: *mut Self) {
        self.parent.store(parent, WRITE_ORD);
    }

    // ========================================================================
    //  Slots
    // ========================================================================

    /// The atomic cell behind slot `offset`.
    #[inline(always)]
    pub(crate) fn slot(&self, offset: u8) -> &AtomicPtr<()> {
        &self.slots[usize::from(offset)]
    }

    /// Read slot `offset`.
    #[must_use]
    #[inline(always)]
    pub fn get(&self, offset: u8) -> RawEntry {
        RawEntry::from_raw(self.slot(offset).load(READ_ORD))
    }

    /// Publish `entry` into slot `offset`. Lock holders only; counts are
    /// adjusted separately with [`update_counts`](Self::update_counts).
    #[inline(always)]
    pub(crate) fn set(&self, offset: u8, entry: RawEntry) {
        self.slot(offset).store(entry.into_raw(), WRITE_ORD);
    }

    /// Number of non-empty slots.
    #[must_use]
    #[inline(always)]
    pub fn count(&self) -> u8 {
        self.count.load(RELAXED)
    }

    /// Number of slots occupied by inline values.
    #[must_use]
    #[inline(always)]
    pub fn nr_values(&self) -> u8 {
        self.nr_values.load(RELAXED)
    }

    /// Apply slot-count deltas from a store.
    #[inline]
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        reason = "counts stay within 0..=CHUNK_SIZE"
    )]
    pub(crate) fn update_counts(&self, count: i32, values: i32) {
        let new_count = i32::from(self.count()) + count;
        let new_values = i32::from(self.nr_values()) + values;
        debug_assert!((0..=CHUNK_SIZE as i32).contains(&new_count));
        debug_assert!((0..=CHUNK_SIZE as i32).contains(&new_values));
        self.count.store(new_count as u8, RELAXED);
        self.nr_values.store(new_values as u8, RELAXED);
    }

    #[inline(always)]
    pub(crate) fn set_counts(&self, count: u8, values: u8) {
        self.count.store(count, RELAXED);
        self.nr_values.store(values, RELAXED);
    }

    // ========================================================================
    //  Tags
    // ========================================================================

    #[inline(always)]
    fn tag_word(&self, tag: Tag) -> &AtomicU64 {
        &self.tags[tag.index()]
    }

    /// Whole bitmap for one tag class.
    #[must_use]
    #[inline(always)]
    pub fn tag_bits(&self, tag: Tag) -> u64 {
        self.tag_word(tag).load(READ_ORD)
    }

    /// Check if slot `offset` carries `tag`.
    #[must_use]
    #[inline(always)]
    pub fn tag_test(&self, offset: u8, tag: Tag) -> bool {
        self.tag_bits(tag) & (1 << offset) != 0
    }

    /// Set `tag` on slot `offset`, returning the previous state.
    #[inline(always)]
    pub(crate) fn tag_set(&self, offset: u8, tag: Tag) -> bool {
        let bit = 1 << offset;
        self.tag_word(tag).fetch_or(bit, RMW_ORD) & bit != 0
    }

    /// Clear `tag` on slot `offset`, returning the previous state.
    #[inline(always)]
    pub(crate) fn tag_clear(&self, offset: u8, tag: Tag) -> bool {
        let bit = 1 << offset;
        self.tag_word(tag).fetch_and(!bit, RMW_ORD) & bit != 0
    }

    /// Check if any slot of this node carries `tag`.
    #[must_use]
    #[inline(always)]
    pub fn tag_any(&self, tag: Tag) -> bool {
        self.tag_bits(tag) != 0
    }

    /// Fold the tag bits of slots `offset + 1 ..= offset + sibs` onto
    /// `offset`, leaving the secondary slots untagged.
    pub(crate) fn squash_tags(&self, offset: u8, sibs: u8) {
        if sibs == 0 {
            return;
        }
        let span: u64 = ((1u64 << sibs) - 1) << (offset + 1);
        for tag in Tag::ALL {
            let word = self.tag_word(tag);
            if word.load(RELAXED) & span == 0 {
                continue;
            }
            word.fetch_or(1 << offset, RMW_ORD);
            word.fetch_and(!span, RMW_ORD);
        }
    }

    /// Tag slot 0 with every class in `mask` (bit `t` for `Tag` index `t`).
    pub(crate) fn seed_slot0_tags(&mut self, mask: u8) {
        for tag in Tag::ALL {
            if mask & tag.flag() != 0 {
                *self.tags[tag.index()].get_mut() |= 1;
            }
        }
    }
}

impl Default for XaNode {
    fn default() -> Self {
        Self::new()
    }
}

impl StdFmt::Debug for XaNode {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("XaNode")
            .field("shift", &self.shift)
            .field("offset", &self.offset())
            .field("count", &self.count())
            .field("nr_values", &self.nr_values())
            .field("parent", &self.parent.load(READ_ORD))
            .field(
                "tags",
                &[
                    self.tag_bits(Tag::T0),
                    self.tag_bits(Tag::T1),
                    self.tag_bits(Tag::T2),
                ],
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_node_is_empty() {
        let node = XaNode::new();
        assert_eq!(node.count(), 0);
        assert_eq!(node.nr_values(), 0);
        assert!(node.parent_link().load(READ_ORD).is_null());
        for offset in (0u8..).take(CHUNK_SIZE) {
            assert!(node.get(offset).is_null());
        }
        for tag in Tag::ALL {
            assert!(!node.tag_any(tag));
        }
    }

    #[test]
    fn offset_of_uses_shift() {
        let mut node = XaNode::new();
        node.init(6, 0, std::ptr::null_mut());
        assert_eq!(node.offset_of(0), 0);
        assert_eq!(node.offset_of(63), 0);
        assert_eq!(node.offset_of(64), 1);
        assert_eq!(node.offset_of(64 * 64 - 1), 63);
        assert_eq!(node.offset_of(64 * 64), 0);
    }

    #[test]
    fn max_index_wraps_at_the_top() {
        assert_eq!(XaNode::max_index_for(0), 63);
        assert_eq!(XaNode::max_index_for(6), 4095);
        assert_eq!(XaNode::max_index_for(60), usize::MAX);
    }

    #[test]
    fn tag_set_and_clear_report_previous_state() {
        let node = XaNode::new();
        assert!(!node.tag_set(5, Tag::T1));
        assert!(node.tag_set(5, Tag::T1));
        assert!(node.tag_test(5, Tag::T1));
        assert!(!node.tag_test(5, Tag::T0));
        assert!(node.tag_any(Tag::T1));
        assert!(node.tag_clear(5, Tag::T1));
        assert!(!node.tag_clear(5, Tag::T1));
        assert!(!node.tag_any(Tag::T1));
    }

    #[test]
    fn squash_moves_tags_to_the_canonical_slot() {
        let node = XaNode::new();
        node.tag_set(5, Tag::T0);
        node.tag_set(6, Tag::T2);
        node.tag_set(8, Tag::T2);
        node.squash_tags(4, 3);
        assert_eq!(node.tag_bits(Tag::T0), 1 << 4);
        assert_eq!(node.tag_bits(Tag::T1), 0);
        assert_eq!(node.tag_bits(Tag::T2), (1 << 4) | (1 << 8));
    }

    #[test]
    fn counts_follow_deltas() {
        let node = XaNode::new();
        node.update_counts(3, 2);
        assert_eq!((node.count(), node.nr_values()), (3, 2));
        node.update_counts(-1, -1);
        assert_eq!((node.count(), node.nr_values()), (2, 1));
    }
}
