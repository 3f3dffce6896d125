//! [`XArray`]: the array itself, its lock and iteration.
//!
//! Reads ([`load`](XArray::load), [`find`](XArray::find), iteration, tag
//! queries) never take the lock. They walk the tree under a `seize` guard and
//! restart when they meet a retry marker left by a concurrent writer.
//!
//! Writes serialise on one mutex. The convenience methods on [`XArray`] take
//! it internally; [`XaLock`] holds it across several operations and lets the
//! caller choose how allocation may behave.

use std::fmt as StdFmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, AtomicU8};

use parking_lot::{Mutex, MutexGuard};
use seize::{Collector, Guard};

use crate::alloc::{AllocMode, GlobalNodeAllocator, NodeAllocator};
use crate::cursor::Cursor;
use crate::entry::{Entry, RawEntry};
use crate::error::XaError;
use crate::ordering::{READ_ORD, RMW_ORD, WRITE_ORD};
use crate::tag::{Filter, Tag};
use crate::tracing_helpers::debug_log;

// ============================================================================
//  XArray
// ============================================================================

/// A sparse array indexed by `usize`, stored as a radix tree.
///
/// Entries are inline integers or caller-owned pointers to `T` (see
/// [`Entry`]). The array never dereferences or frees stored pointers.
///
/// # Type Parameters
///
/// - `T` - Pointee type of pointer entries
/// - `A` - Node allocator (defaults to the global allocator)
///
/// # Example
///
/// ```
/// use xarray::{Entry, Tag, XArray};
///
/// let xa: XArray<u64> = XArray::new();
/// xa.store(7, Entry::Value(70)).unwrap();
/// xa.set_tag(7, Tag::T0);
/// assert_eq!(xa.load(7), Some(Entry::Value(70)));
/// assert!(xa.get_tag(7, Tag::T0));
/// ```
pub struct XArray<T, A: NodeAllocator = GlobalNodeAllocator> {
    /// Encoded head: empty, a bare entry (index 0 only) or the top node.
    head: AtomicPtr<()>,

    /// Tree-level tag flags (`Tag::flag` bits).
    tags: AtomicU8,

    /// Serialises writers.
    lock: Mutex<()>,

    /// Deferred reclamation of unlinked nodes.
    collector: Collector,

    allocator: A,

    _marker: PhantomData<*const T>,
}

// SAFETY: The array stores addresses of `T` but never dereferences them.
// Handing such addresses to other threads is sound when `T: Sync`. Nodes are
// only freed through the collector or with exclusive access.
unsafe impl<T: Sync, A: NodeAllocator> Send for XArray<T, A> {}

// SAFETY: Writers serialise on the mutex. Readers only perform atomic loads
// under a reclamation guard.
unsafe impl<T: Sync, A: NodeAllocator> Sync for XArray<T, A> {}

impl<T> XArray<T> {
    /// An empty array using the global allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(GlobalNodeAllocator)
    }
}

impl<T> Default for XArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: NodeAllocator> XArray<T, A> {
    /// An empty array drawing nodes from `allocator`.
    #[must_use]
    pub fn with_allocator(allocator: A) -> Self {
        Self {
            head: AtomicPtr::new(std::ptr::null_mut()),
            tags: AtomicU8::new(0),
            lock: Mutex::new(()),
            collector: Collector::new(),
            allocator,
            _marker: PhantomData,
        }
    }

    /// The node allocator.
    #[must_use]
    #[inline(always)]
    pub const fn allocator(&self) -> &A {
        &self.allocator
    }

    // ========================================================================
    //  Crate-internal access
    // ========================================================================

    #[inline(always)]
    pub(crate) const fn collector(&self) -> &Collector {
        &self.collector
    }

    #[inline(always)]
    pub(crate) const fn head_cell(&self) -> &AtomicPtr<()> {
        &self.head
    }

    /// Current head word.
    #[inline(always)]
    pub(crate) fn head(&self) -> RawEntry {
        RawEntry::from_raw(self.head.load(READ_ORD))
    }

    /// Publish a new head. Lock holders only.
    #[inline(always)]
    pub(crate) fn set_head(&self, entry: RawEntry) {
        self.head.store(entry.into_raw(), WRITE_ORD);
    }

    #[inline(always)]
    pub(crate) fn tree_tags(&self) -> u8 {
        self.tags.load(READ_ORD)
    }

    #[inline(always)]
    pub(crate) fn set_tree_tag(&self, tag: Tag) {
        self.tags.fetch_or(tag.flag(), RMW_ORD);
    }

    #[inline(always)]
    pub(crate) fn clear_tree_tag(&self, tag: Tag) {
        self.tags.fetch_and(!tag.flag(), RMW_ORD);
    }

    /// `(count, nr_values)` of the top node, if the head is a node.
    pub(crate) fn top_counts(&self) -> Option<(u8, u8)> {
        let guard = self.collector.enter();
        let head = RawEntry::from_raw(guard.protect(&self.head, READ_ORD));
        head.to_node().map(|node| {
            // SAFETY: Loaded under `guard`, which is still active.
            let n = unsafe { node.as_ref() };
            (n.count(), n.nr_values())
        })
    }

    // ========================================================================
    //  Lock
    // ========================================================================

    /// Take the writer lock, blocking until it is free.
    pub fn lock(&self) -> XaLock<'_, T, A> {
        XaLock {
            xa: self,
            guard: self.lock.lock(),
        }
    }

    /// Take the writer lock if it is free.
    pub fn try_lock(&self) -> Option<XaLock<'_, T, A>> {
        self.lock.try_lock().map(|guard| XaLock { xa: self, guard })
    }

    /// A cursor at `index`.
    pub fn cursor(&self, index: usize) -> Cursor<'_, T, A> {
        Cursor::new(self, index)
    }

    // ========================================================================
    //  Reads
    // ========================================================================

    /// Check if the array holds no entries.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head().is_null()
    }

    /// Check if any entry carries `tag`.
    #[must_use]
    #[inline]
    pub fn is_tagged(&self, tag: Tag) -> bool {
        self.tree_tags() & tag.flag() != 0
    }

    /// Entry at `index`, if any.
    #[must_use]
    pub fn load(&self, index: usize) -> Option<Entry<T>> {
        Cursor::new(self, index).load()
    }

    /// Check if the entry at `index` carries `tag`.
    ///
    /// Descends only while the summary bits say the tag is present below.
    #[must_use]
    pub fn get_tag(&self, index: usize, tag: Tag) -> bool {
        let mut xas = Cursor::new(self, index);
        let mut entry = xas.start();
        while xas.get_tag(tag) {
            match entry.to_node() {
                Some(node) => entry = xas.descend(node),
                None => return true,
            }
        }
        false
    }

    /// First entry at or after `*index`, up to `max`, matching `filter`.
    ///
    /// On success `*index` is set to the entry's first index. On `None`
    /// `*index` is unchanged.
    pub fn find(&self, index: &mut usize, max: usize, filter: Filter) -> Option<Entry<T>> {
        let mut xas = Cursor::new(self, *index);
        let entry = xas.find_filtered(max, filter)?;
        *index = xas.index();
        Some(entry)
    }

    /// First entry strictly after the one at `*index`, up to `max`, matching
    /// `filter`.
    ///
    /// Skips the rest of a multi-index entry that covers `*index`. Returns
    /// `None` when `*index` is `usize::MAX`.
    pub fn find_after(&self, index: &mut usize, max: usize, filter: Filter) -> Option<Entry<T>> {
        let start = *index;
        let mut xas = Cursor::new(self, start.checked_add(1)?);
        loop {
            let entry = xas.find_filtered(max, filter)?;
            if xas.index() > start {
                *index = xas.index();
                return Some(entry);
            }
        }
    }

    /// Iterate over every entry in index order.
    pub fn iter(&self) -> Iter<'_, T, A> {
        self.range(0, usize::MAX)
    }

    /// Iterate over entries with first index in `start..=max`.
    pub fn range(&self, start: usize, max: usize) -> Iter<'_, T, A> {
        Iter::new(Cursor::new(self, start), max, Filter::Present)
    }

    /// Iterate over entries carrying `tag`.
    pub fn iter_tagged(&self, tag: Tag) -> Iter<'_, T, A> {
        Iter::new(Cursor::new(self, 0), usize::MAX, Filter::Tagged(tag))
    }

    // ========================================================================
    //  Writes (take the lock internally)
    // ========================================================================

    /// Store `entry` at `index`, returning the previous entry.
    ///
    /// Passing `None` erases. May block to allocate nodes.
    ///
    /// # Errors
    ///
    /// - [`XaError::InvalidValue`] if `entry` cannot be encoded.
    /// - [`XaError::NoMemory`] if a node could not be allocated.
    pub fn store(
        &self,
        index: usize,
        entry: impl Into<Option<Entry<T>>>,
    ) -> Result<Option<Entry<T>>, XaError> {
        self.lock().store(index, entry, AllocMode::Blocking)
    }

    /// Store `entry` over the `2^order` aligned range containing `index`.
    ///
    /// # Errors
    ///
    /// As [`store`](Self::store), plus [`XaError::OutOfBounds`] when a
    /// non-empty entry is stored with `order >= usize::BITS`.
    #[cfg(feature = "multi-index")]
    pub fn store_order(
        &self,
        index: usize,
        order: u32,
        entry: impl Into<Option<Entry<T>>>,
    ) -> Result<Option<Entry<T>>, XaError> {
        self.lock().store_order(index, order, entry, AllocMode::Blocking)
    }

    /// Remove the entry at `index` (all of it, for a multi-index entry).
    pub fn erase(&self, index: usize) -> Option<Entry<T>> {
        self.lock().erase(index)
    }

    /// Store `entry` at `index` only if the slot is empty.
    ///
    /// # Errors
    ///
    /// [`XaError::AlreadyExists`] if an entry is present, otherwise as
    /// [`store`](Self::store).
    pub fn insert(&self, index: usize, entry: Entry<T>) -> Result<(), XaError> {
        self.lock().insert(index, entry, AllocMode::Blocking)
    }

    /// Replace the entry at `index` with `new` if it currently equals `old`.
    ///
    /// Returns the entry found at `index`; the swap happened iff it equals
    /// `old`.
    ///
    /// # Errors
    ///
    /// As [`store`](Self::store).
    pub fn cmpxchg(
        &self,
        index: usize,
        old: Option<Entry<T>>,
        new: Option<Entry<T>>,
    ) -> Result<Option<Entry<T>>, XaError> {
        self.lock().cmpxchg(index, old, new, AllocMode::Blocking)
    }

    /// Set `tag` on the entry at `index`. No effect on an empty index.
    pub fn set_tag(&self, index: usize, tag: Tag) {
        self.lock().set_tag(index, tag);
    }

    /// Clear `tag` on the entry at `index`.
    pub fn clear_tag(&self, index: usize, tag: Tag) {
        self.lock().clear_tag(index, tag);
    }

    /// Remove every entry and tag. Nodes are retired, so concurrent readers
    /// finish safely.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self)))]
    pub fn destroy(&self) {
        self.lock().destroy();
    }
}

impl<T, A: NodeAllocator> Drop for XArray<T, A> {
    fn drop(&mut self) {
        let head = RawEntry::from_raw(*self.head.get_mut());
        if let Some(top) = head.to_node() {
            // SAFETY: `&mut self` proves no reader, writer or cursor exists,
            // and every node below the head came from this allocator.
            unsafe { self.allocator.teardown(top) };
        }
    }
}

impl<T, A: NodeAllocator> StdFmt::Debug for XArray<T, A> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("XArray")
            .field("head", &self.head())
            .field("tags", &format_args!("{:#05b}", self.tree_tags()))
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  XaLock
// ============================================================================

/// The writer lock of an [`XArray`], held across several operations.
///
/// Methods take an [`AllocMode`]. With [`AllocMode::Blocking`] a store that
/// runs out of nodes releases the lock while it allocates, then retries;
/// other writers may run in between. With [`AllocMode::NonBlocking`] the lock
/// is never released and such a store fails with [`XaError::NoMemory`].
pub struct XaLock<'a, T, A: NodeAllocator = GlobalNodeAllocator> {
    xa: &'a XArray<T, A>,
    guard: MutexGuard<'a, ()>,
}

impl<'a, T, A: NodeAllocator> XaLock<'a, T, A> {
    /// The locked array.
    #[must_use]
    #[inline(always)]
    pub const fn array(&self) -> &'a XArray<T, A> {
        self.xa
    }

    /// Back off after a failed attempt. Returns `true` to retry.
    fn nomem(&mut self, xas: &mut Cursor<'a, T, A>, mode: AllocMode) -> bool {
        if mode.may_block() && xas.error() == Some(XaError::NoMemory) {
            return MutexGuard::unlocked(&mut self.guard, || xas.nomem(mode));
        }
        xas.nomem(mode)
    }

    /// Store `entry` at `index`, returning the previous entry.
    ///
    /// # Errors
    ///
    /// [`XaError::InvalidValue`] or [`XaError::NoMemory`].
    pub fn store(
        &mut self,
        index: usize,
        entry: impl Into<Option<Entry<T>>>,
        mode: AllocMode,
    ) -> Result<Option<Entry<T>>, XaError> {
        let raw = RawEntry::encode(entry.into())?;
        let mut xas = Cursor::new(self.xa, index);
        loop {
            let curr = xas.store_raw(raw);
            if !self.nomem(&mut xas, mode) {
                return xas.result(curr.decode());
            }
        }
    }

    /// Store `entry` over the `2^order` aligned range containing `index`.
    ///
    /// # Errors
    ///
    /// [`XaError::InvalidValue`], [`XaError::NoMemory`] or
    /// [`XaError::OutOfBounds`].
    #[cfg(feature = "multi-index")]
    pub fn store_order(
        &mut self,
        index: usize,
        order: u32,
        entry: impl Into<Option<Entry<T>>>,
        mode: AllocMode,
    ) -> Result<Option<Entry<T>>, XaError> {
        let raw = RawEntry::encode(entry.into())?;
        let mut xas = Cursor::with_order(self.xa, index, order);
        loop {
            let curr = xas.store_raw(raw);
            if !self.nomem(&mut xas, mode) {
                return xas.result(curr.decode());
            }
        }
    }

    /// Remove the entry at `index`. Never allocates.
    pub fn erase(&self, index: usize) -> Option<Entry<T>> {
        Cursor::new(self.xa, index).store_raw(RawEntry::NULL).decode()
    }

    /// Store `entry` at `index` only if the slot is empty.
    ///
    /// # Errors
    ///
    /// [`XaError::AlreadyExists`], [`XaError::InvalidValue`] or
    /// [`XaError::NoMemory`].
    pub fn insert(&mut self, index: usize, entry: Entry<T>, mode: AllocMode) -> Result<(), XaError> {
        let raw = RawEntry::encode(Some(entry))?;
        let mut xas = Cursor::new(self.xa, index);
        loop {
            if xas.load_raw().is_null() {
                xas.store_raw(raw);
            } else {
                xas.set_error(XaError::AlreadyExists);
            }
            if !self.nomem(&mut xas, mode) {
                return xas.result(());
            }
        }
    }

    /// Replace the entry at `index` with `new` if it currently equals `old`.
    ///
    /// # Errors
    ///
    /// [`XaError::InvalidValue`] or [`XaError::NoMemory`].
    pub fn cmpxchg(
        &mut self,
        index: usize,
        old: Option<Entry<T>>,
        new: Option<Entry<T>>,
        mode: AllocMode,
    ) -> Result<Option<Entry<T>>, XaError> {
        let old = RawEntry::encode(old)?;
        let new = RawEntry::encode(new)?;
        let mut xas = Cursor::new(self.xa, index);
        loop {
            let curr = xas.load_raw();
            if curr == old {
                xas.store_raw(new);
            }
            if !self.nomem(&mut xas, mode) {
                return xas.result(curr.decode());
            }
        }
    }

    /// Set `tag` on the entry at `index`. No effect on an empty index.
    pub fn set_tag(&self, index: usize, tag: Tag) {
        let mut xas = Cursor::new(self.xa, index);
        if !xas.load_raw().is_null() {
            xas.set_tag_locked(tag);
        }
    }

    /// Clear `tag` on the entry at `index`.
    pub fn clear_tag(&self, index: usize, tag: Tag) {
        let mut xas = Cursor::new(self.xa, index);
        if !xas.load_raw().is_null() {
            xas.clear_tag_locked(tag);
        }
    }

    /// Remove every entry and tag.
    pub fn destroy(&self) {
        Cursor::new(self.xa, 0).destroy_tree();
        debug_log!("array destroyed");
    }
}

impl<T, A: NodeAllocator> StdFmt::Debug for XaLock<'_, T, A> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("XaLock").field("array", self.xa).finish()
    }
}

// ============================================================================
//  Iter
// ============================================================================

/// Iterator over `(first index, entry)` pairs in ascending index order.
///
/// Runs lock-free. Entries stored or erased concurrently may or may not be
/// seen; every entry present for the whole iteration is seen exactly once.
/// The iterator pins reclamation while it is alive.
pub struct Iter<'a, T, A: NodeAllocator = GlobalNodeAllocator> {
    xas: Cursor<'a, T, A>,
    max: usize,
    filter: Filter,
    started: bool,
    done: bool,
}

impl<'a, T, A: NodeAllocator> Iter<'a, T, A> {
    const fn new(xas: Cursor<'a, T, A>, max: usize, filter: Filter) -> Self {
        Self {
            xas,
            max,
            filter,
            started: false,
            done: false,
        }
    }
}

impl<T, A: NodeAllocator> Iterator for Iter<'_, T, A> {
    type Item = (usize, Entry<T>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let entry = match (self.filter, self.started) {
            (Filter::Present, false) => self.xas.find(self.max),
            (Filter::Present, true) => self.xas.next_entry(self.max),
            (Filter::Tagged(tag), _) => self.xas.find_tagged(self.max, tag),
        };
        self.started = true;
        let Some(entry) = entry else {
            self.done = true;
            return None;
        };
        Some((self.xas.index(), entry))
    }
}

impl<T, A: NodeAllocator> FusedIterator for Iter<'_, T, A> {}

impl<T, A: NodeAllocator> StdFmt::Debug for Iter<'_, T, A> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Iter")
            .field("cursor", &self.xas)
            .field("max", &self.max)
            .field("filter", &self.filter)
            .field("done", &self.done)
            .finish()
    }
}

impl<'a, T, A: NodeAllocator> IntoIterator for &'a XArray<T, A> {
    type Item = (usize, Entry<T>);
    type IntoIter = Iter<'a, T, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "Fail fast in tests")]

    use std::ptr::NonNull;

    use super::*;

    fn value(v: usize) -> Option<Entry<u64>> {
        Some(Entry::Value(v))
    }

    #[test]
    fn store_load_erase() {
        let xa: XArray<u64> = XArray::new();
        assert!(xa.is_empty());
        assert_eq!(xa.store(3, value(30)).unwrap(), None);
        assert_eq!(xa.store(3, value(31)).unwrap(), value(30));
        assert_eq!(xa.load(3), value(31));
        assert_eq!(xa.load(4), None);
        assert_eq!(xa.erase(3), value(31));
        assert!(xa.is_empty());
    }

    #[test]
    fn pointer_entries_round_trip() {
        let slots = [1u64, 2, 3];
        let xa: XArray<u64> = XArray::new();
        for (i, slot) in slots.iter().enumerate() {
            let entry = Entry::pointer(NonNull::from(slot)).unwrap();
            xa.store(i * 1000, entry).unwrap();
        }
        for (i, slot) in slots.iter().enumerate() {
            let ptr = xa.load(i * 1000).unwrap().as_ptr().unwrap();
            assert_eq!(ptr, NonNull::from(slot));
        }
    }

    #[test]
    fn invalid_values_are_rejected_without_side_effects() {
        let xa: XArray<u64> = XArray::new();
        assert_eq!(
            xa.store(1, Entry::Value(usize::MAX)),
            Err(XaError::InvalidValue)
        );
        assert!(xa.is_empty());
    }

    #[test]
    fn insert_and_cmpxchg() {
        let xa: XArray<u64> = XArray::new();
        xa.insert(9, Entry::Value(1)).unwrap();
        assert_eq!(xa.insert(9, Entry::Value(2)), Err(XaError::AlreadyExists));
        assert_eq!(xa.cmpxchg(9, value(5), value(6)).unwrap(), value(1));
        assert_eq!(xa.load(9), value(1));
        assert_eq!(xa.cmpxchg(9, value(1), value(6)).unwrap(), value(1));
        assert_eq!(xa.load(9), value(6));
        assert_eq!(xa.cmpxchg(9, value(6), None).unwrap(), value(6));
        assert!(xa.is_empty());
        assert_eq!(xa.cmpxchg(9, None, value(7)).unwrap(), None);
        assert_eq!(xa.load(9), value(7));
    }

    #[test]
    fn iteration_in_index_order() {
        let xa: XArray<u64> = XArray::new();
        let indices = [0, 5, 63, 64, 4095, 4096, 1 << 40, usize::MAX];
        for &i in indices.iter().rev() {
            xa.store(i, value(i & 0xffff)).unwrap();
        }
        let seen: Vec<usize> = xa.iter().map(|(i, _)| i).collect();
        assert_eq!(seen, indices);

        let ranged: Vec<usize> = xa.range(6, 4096).map(|(i, _)| i).collect();
        assert_eq!(ranged, vec![63, 64, 4095, 4096]);
    }

    #[test]
    fn tagged_iteration() {
        let xa: XArray<u64> = XArray::new();
        for i in 0..300 {
            xa.store(i, value(i)).unwrap();
            if i % 7 == 0 {
                xa.set_tag(i, Tag::T2);
            }
        }
        let tagged: Vec<usize> = xa.iter_tagged(Tag::T2).map(|(i, _)| i).collect();
        let expected: Vec<usize> = (0..300).filter(|i| i % 7 == 0).collect();
        assert_eq!(tagged, expected);

        xa.clear_tag(0, Tag::T2);
        assert!(!xa.get_tag(0, Tag::T2));
        assert_eq!(xa.iter_tagged(Tag::T2).next().map(|(i, _)| i), Some(7));
    }

    #[test]
    fn find_and_find_after() {
        let xa: XArray<u64> = XArray::new();
        xa.store(10, value(10)).unwrap();
        xa.store(20, value(20)).unwrap();

        let mut index = 0;
        assert_eq!(xa.find(&mut index, usize::MAX, Filter::Present), value(10));
        assert_eq!(index, 10);
        assert_eq!(xa.find_after(&mut index, usize::MAX, Filter::Present), value(20));
        assert_eq!(index, 20);
        assert_eq!(xa.find_after(&mut index, usize::MAX, Filter::Present), None);
        assert_eq!(index, 20);

        let mut index = usize::MAX;
        assert_eq!(xa.find_after(&mut index, usize::MAX, Filter::Present), None);
    }

    #[cfg(feature = "multi-index")]
    #[test]
    fn find_after_steps_over_wide_entries() {
        for order in [6, 12, 30] {
            let start = 1usize << order;
            let next = start << 1;
            let xa: XArray<u64> = XArray::new();
            xa.store_order(start, order, value(7)).unwrap();
            xa.store(next, value(9)).unwrap();

            let mut index = start + (start >> 1);
            assert_eq!(xa.find(&mut index, usize::MAX, Filter::Present), value(7));
            assert_eq!(index, start);
            assert_eq!(xa.find_after(&mut index, usize::MAX, Filter::Present), value(9));
            assert_eq!(index, next);

            let mut index = start;
            let mut hits = Vec::new();
            while let Some(entry) = xa.find_after(&mut index, usize::MAX, Filter::Present) {
                hits.push((index, entry));
            }
            assert_eq!(hits, vec![(next, Entry::Value(9))]);
        }
    }

    #[test]
    fn try_lock_excludes_writers() {
        let xa: XArray<u64> = XArray::new();
        let lock = xa.lock();
        assert!(xa.try_lock().is_none());
        assert_eq!(xa.load(0), None);
        drop(lock);
        assert!(xa.try_lock().is_some());
    }

    #[test]
    fn destroy_clears_entries_and_tags() {
        let xa: XArray<u64> = XArray::new();
        for i in (0..5000).step_by(3) {
            xa.store(i, value(i)).unwrap();
        }
        xa.set_tag(300, Tag::T0);
        xa.destroy();
        assert!(xa.is_empty());
        assert!(!xa.is_tagged(Tag::T0));
        assert_eq!(xa.iter().count(), 0);
        xa.store(1, value(1)).unwrap();
        assert_eq!(xa.load(1), value(1));
    }

    #[test]
    fn nonblocking_lock_reports_no_memory() {
        let xa: XArray<u64, crate::alloc::FaultInjectingAllocator> =
            XArray::with_allocator(crate::alloc::FaultInjectingAllocator::new());
        let mut lock = xa.lock();
        assert_eq!(lock.store(0, value(0), AllocMode::NonBlocking), Ok(None));
        assert_eq!(
            lock.store(1, value(1), AllocMode::NonBlocking),
            Err(XaError::NoMemory)
        );
        assert_eq!(lock.store(1, value(1), AllocMode::Blocking), Ok(None));
        assert_eq!(lock.store(1, value(0), AllocMode::NonBlocking), Ok(value(1)));
        drop(lock);
        assert!(xa.allocator().refusals() > 0);
        assert_eq!(xa.erase(1), value(0));
        assert_eq!(xa.erase(0), value(0));
        assert!(xa.is_empty());
    }
}
