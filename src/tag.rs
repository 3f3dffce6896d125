//! Tag classes and tag propagation.
//!
//! Every node keeps one bitmap per tag class. A bit set in an interior node
//! means "some entry below this slot carries the tag". The tree keeps one
//! more flag per class meaning "some entry in the whole array carries it".
//! Searches use these summaries to skip untagged subtrees.

use std::ptr::NonNull;

use crate::node::XaNode;
use crate::ordering::READ_ORD;

/// Number of tag classes.
pub const MAX_TAGS: usize = 3;

/// A tag class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// First tag class.
    T0,
    /// Second tag class.
    T1,
    /// Third tag class.
    T2,
}

impl Tag {
    /// All tag classes in ascending order.
    pub const ALL: [Self; MAX_TAGS] = [Self::T0, Self::T1, Self::T2];

    /// Position of this class in per-node tag arrays.
    #[must_use]
    #[inline(always)]
    pub const fn index(self) -> usize {
        match self {
            Self::T0 => 0,
            Self::T1 => 1,
            Self::T2 => 2,
        }
    }

    /// Bit of this class in the tree-level flag byte.
    #[must_use]
    #[inline(always)]
    pub const fn flag(self) -> u8 {
        1 << self.index()
    }
}

/// Which entries a search should stop at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Any non-empty entry.
    Present,
    /// Entries carrying the given tag.
    Tagged(Tag),
}

impl From<Tag> for Filter {
    fn from(tag: Tag) -> Self {
        Self::Tagged(tag)
    }
}

// ============================================================================
//  Propagation
// ============================================================================

/// Set `tag` on `(node, offset)` and on every ancestor slot leading to it.
///
/// Stops at the first ancestor that already had the bit. Returns `true` when
/// the walk passed the top node, meaning the tree-level flag must be set.
///
/// # Safety
///
/// The caller holds the tree lock and `node` is reachable from the head.
pub(crate) unsafe fn propagate_set(node: NonNull<XaNode>, offset: u8, tag: Tag) -> bool {
    let mut node = node;
    let mut offset = offset;
    loop {
        // SAFETY: Reachable nodes stay allocated while the lock is held.
        let n = unsafe { node.as_ref() };
        if n.tag_set(offset, tag) {
            return false;
        }
        offset = n.offset();
        match NonNull::new(n.parent_link().load(READ_ORD)) {
            Some(parent) => node = parent,
            None => return true,
        }
    }
}

/// Clear `tag` on `(node, offset)` and on ancestors whose subtree no longer
/// carries it.
///
/// Stops when the bit was already clear or the node still has the tag on
/// another slot. Returns `true` when the walk passed the top node, meaning the
/// tree-level flag must be cleared.
///
/// # Safety
///
/// The caller holds the tree lock and `node` is reachable from the head.
pub(crate) unsafe fn propagate_clear(node: NonNull<XaNode>, offset: u8, tag: Tag) -> bool {
    let mut node = node;
    let mut offset = offset;
    loop {
        // SAFETY: Reachable nodes stay allocated while the lock is held.
        let n = unsafe { node.as_ref() };
        if !n.tag_clear(offset, tag) || n.tag_any(tag) {
            return false;
        }
        offset = n.offset();
        match NonNull::new(n.parent_link().load(READ_ORD)) {
            Some(parent) => node = parent,
            None => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_distinct_bits() {
        let mut seen = 0u8;
        for tag in Tag::ALL {
            assert_eq!(seen & tag.flag(), 0);
            seen |= tag.flag();
        }
        assert_eq!(seen, 0b111);
    }

    #[test]
    fn propagation_walks_the_parent_chain() {
        let mut top = Box::new(XaNode::new());
        top.init(6, 0, std::ptr::null_mut());
        let top_ptr = NonNull::from(&mut *top);
        let mut leaf = Box::new(XaNode::new());
        leaf.init(0, 3, top_ptr.as_ptr());
        let leaf_ptr = NonNull::from(&mut *leaf);

        // SAFETY: Both nodes are alive for the whole test.
        unsafe {
            assert!(propagate_set(leaf_ptr, 9, Tag::T1));
            assert!(!propagate_set(leaf_ptr, 10, Tag::T1));
            assert!(top.tag_test(3, Tag::T1));

            assert!(!propagate_clear(leaf_ptr, 9, Tag::T1));
            assert!(top.tag_test(3, Tag::T1));
            assert!(propagate_clear(leaf_ptr, 10, Tag::T1));
        }
        assert!(!top.tag_any(Tag::T1));
        assert!(!leaf.tag_any(Tag::T1));
    }
}
