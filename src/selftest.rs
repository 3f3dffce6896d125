//! Named end-to-end self-checks.
//!
//! Each check drives the public and cursor APIs against one shared array and
//! counts every assertion it makes. [`run_all`] runs the whole [`SUITE`] in
//! order and returns a [`Report`]; the `xarray-selftest` binary and
//! `tests/selftest.rs` are thin wrappers around it.
//!
//! The shared array uses a [`FaultInjectingAllocator`] that refuses
//! non-blocking allocations, so every store that needs a node goes through
//! the `NoMemory` backoff path.

use std::fmt as StdFmt;
use std::panic::Location;
use std::ptr::NonNull;

use crate::alloc::{AllocMode, FaultInjectingAllocator};
use crate::array::XArray;
use crate::cursor::{Cursor, CursorState};
use crate::entry::{Entry, MAX_VALUE};
use crate::error::XaError;
use crate::tag::{Filter, Tag};
use crate::tracing_helpers::{debug_log, error_log};

/// Array type every self-check runs against.
pub type TestArray = XArray<u64, FaultInjectingAllocator>;

/// A pointer entry target that outlives every check.
static ANCHOR: u64 = 0;

// ============================================================================
//  Checker and Report
// ============================================================================

/// One failed assertion.
#[derive(Debug, Clone, Copy)]
pub struct Failure {
    /// Name of the check that made the assertion.
    pub check: &'static str,

    /// Where the assertion was made.
    pub location: &'static Location<'static>,
}

/// Counts assertions for the running check.
#[derive(Debug)]
pub struct Checker {
    current: &'static str,
    run: u32,
    passed: u32,
    failures: Vec<Failure>,
}

impl Checker {
    const fn new() -> Self {
        Self {
            current: "",
            run: 0,
            passed: 0,
            failures: Vec::new(),
        }
    }

    /// Record one assertion.
    #[track_caller]
    pub fn check(&mut self, ok: bool) {
        self.run += 1;
        if ok {
            self.passed += 1;
            return;
        }
        let location = Location::caller();
        error_log!(check = self.current, %location, "self-check failed");
        self.failures.push(Failure {
            check: self.current,
            location,
        });
    }

    fn into_report(self) -> Report {
        Report {
            run: self.run,
            passed: self.passed,
            failures: self.failures,
        }
    }
}

/// Outcome of a suite run.
#[derive(Debug)]
pub struct Report {
    /// Assertions made.
    pub run: u32,

    /// Assertions that held.
    pub passed: u32,

    /// Every assertion that did not hold, in order.
    pub failures: Vec<Failure>,
}

impl Report {
    /// Check if every assertion held.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.run == self.passed
    }
}

impl StdFmt::Display for Report {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(f, "XArray: {} of {} tests passed", self.passed, self.run)
    }
}

// ============================================================================
//  Suite
// ============================================================================

/// A named check.
#[derive(Debug, Clone, Copy)]
pub struct SelfTest {
    /// Name used for filtering and in failure reports.
    pub name: &'static str,

    /// The check itself. It must leave the array empty.
    pub run: fn(&mut Checker, &TestArray),
}

/// Every check, in the order [`run_all`] runs them.
pub const SUITE: &[SelfTest] = &[
    SelfTest { name: "xa_err", run: check_xa_err },
    SelfTest { name: "xas_retry", run: check_xas_retry },
    SelfTest { name: "xa_load", run: check_xa_load },
    SelfTest { name: "xa_tag", run: check_xa_tag },
    SelfTest { name: "xa_shrink", run: check_xa_shrink },
    SelfTest { name: "xas_erase", run: check_xas_erase },
    SelfTest { name: "cmpxchg", run: check_cmpxchg },
    #[cfg(feature = "multi-index")]
    SelfTest { name: "multi_store", run: check_multi_store },
    SelfTest { name: "find", run: check_find },
    #[cfg(feature = "multi-index")]
    SelfTest { name: "multi_find", run: check_multi_find },
    SelfTest { name: "iter_symmetry", run: check_iter_symmetry },
    SelfTest { name: "destroy", run: check_destroy },
    SelfTest { name: "move", run: check_move },
    SelfTest { name: "store_iter", run: check_store_iter },
];

/// Run every check in [`SUITE`].
#[must_use]
pub fn run_all() -> Report {
    run_matching(|_| true)
}

/// Run the checks whose name satisfies `filter`, in suite order.
pub fn run_matching(filter: impl Fn(&str) -> bool) -> Report {
    let xa = TestArray::with_allocator(FaultInjectingAllocator::new());
    let mut checker = Checker::new();
    for test in SUITE.iter().filter(|test| filter(test.name)) {
        checker.current = test.name;
        debug_log!(name = test.name, "running self-check");
        (test.run)(&mut checker, &xa);
    }
    debug_log!(
        allocations = xa.allocator().allocations(),
        refusals = xa.allocator().refusals(),
        "self-checks finished"
    );
    checker.into_report()
}

// ============================================================================
//  Helpers
// ============================================================================

const fn value(v: usize) -> Option<Entry<u64>> {
    Some(Entry::Value(v))
}

fn anchor() -> Option<Entry<u64>> {
    Entry::pointer(NonNull::from(&ANCHOR)).ok()
}

/// The value stored for `index` by [`store_value`]: the index with its top
/// bit cleared, so every index has an encodable value.
const fn index_value(index: usize) -> Option<Entry<u64>> {
    value(index & MAX_VALUE)
}

fn store_value(
    xa: &TestArray,
    index: usize,
    mode: AllocMode,
) -> Result<Option<Entry<u64>>, XaError> {
    xa.lock().store(index, index_value(index), mode)
}

#[track_caller]
fn erase_value(c: &mut Checker, xa: &TestArray, index: usize) {
    c.check(xa.erase(index) == index_value(index));
    c.check(xa.load(index).is_none());
}

/// Store through an order cursor, backing off until allocation succeeds.
#[cfg(feature = "multi-index")]
fn store_order(
    xa: &TestArray,
    index: usize,
    order: u32,
    entry: Option<Entry<u64>>,
) -> Option<Entry<u64>> {
    let mut xas = Cursor::with_order(xa, index, order);
    loop {
        let curr = {
            let lock = xa.lock();
            xas.store(&lock, entry)
        };
        if !xas.nomem(AllocMode::Blocking) {
            return curr;
        }
    }
}

/// Store through `xas` at its current index, backing off as needed.
fn cursor_store(xa: &TestArray, xas: &mut Cursor<'_, u64, FaultInjectingAllocator>, v: usize) {
    loop {
        {
            let lock = xa.lock();
            xas.store(&lock, value(v));
        }
        if !xas.nomem(AllocMode::Blocking) {
            return;
        }
    }
}

// ============================================================================
//  Checks
// ============================================================================

fn check_xa_err(c: &mut Checker, xa: &TestArray) {
    c.check(store_value(xa, 0, AllocMode::NonBlocking).is_ok());
    c.check(xa.erase(0).is_some());
    c.check(store_value(xa, 1, AllocMode::NonBlocking) == Err(XaError::NoMemory));
    c.check(store_value(xa, 1, AllocMode::NonBlocking) == Err(XaError::NoMemory));
    c.check(xa.is_empty());
    c.check(store_value(xa, 1, AllocMode::Blocking).is_ok());
    c.check(xa.store(1, value(0)).is_ok());
    c.check(xa.erase(1).is_some());
    c.check(xa.store(0, Entry::Value(usize::MAX)) == Err(XaError::InvalidValue));
    c.check(xa.is_empty());
}

fn check_xas_retry(c: &mut Checker, xa: &TestArray) {
    c.check(store_value(xa, 0, AllocMode::Blocking).is_ok());
    c.check(store_value(xa, 1, AllocMode::Blocking).is_ok());

    let mut xas = Cursor::new(xa, 0);
    c.check(xas.find(usize::MAX) == value(0));
    erase_value(c, xa, 1);
    c.check(xas.reload_raw().is_retry());
    c.check(xas.reload() == value(0));
    xas.reset();
    c.check(xas.state() == CursorState::Restart);
    c.check(xas.next_entry(usize::MAX) == value(0));
    c.check(xas.state() == CursorState::Head);

    c.check(store_value(xa, 1, AllocMode::Blocking) == Ok(None));
    c.check(xas.reload_raw().is_internal());
    xas.reset();
    c.check(xas.next_entry(usize::MAX) == value(0));
    drop(xas);

    erase_value(c, xa, 0);
    erase_value(c, xa, 1);
}

fn check_xa_load(c: &mut Checker, xa: &TestArray) {
    for i in 0..1024 {
        for j in 0..1024 {
            let entry = xa.load(j);
            c.check(if j < i { entry == value(j) } else { entry.is_none() });
        }
        c.check(store_value(xa, i, AllocMode::Blocking) == Ok(None));
    }

    for i in 0..1024 {
        for j in 0..1024 {
            let entry = xa.load(j);
            c.check(if j >= i { entry == value(j) } else { entry.is_none() });
        }
        erase_value(c, xa, i);
    }
    c.check(xa.is_empty());
}

fn check_xa_tag_1(c: &mut Checker, xa: &TestArray, index: usize) {
    // Empty indices carry no tags.
    c.check(!xa.get_tag(index, Tag::T0));
    xa.set_tag(index, Tag::T0);
    c.check(!xa.get_tag(index, Tag::T0));

    // Storing an entry does not make a tag appear.
    c.check(store_value(xa, index, AllocMode::Blocking) == Ok(None));
    c.check(!xa.get_tag(index, Tag::T0));
    xa.set_tag(index, Tag::T0);
    c.check(xa.get_tag(index, Tag::T0));

    // One tag does not set another.
    c.check(!xa.get_tag(index + 1, Tag::T0));
    c.check(!xa.get_tag(index, Tag::T1));

    // Erasing clears tags, and they cannot be set again.
    erase_value(c, xa, index);
    c.check(xa.is_empty());
    c.check(!xa.get_tag(index, Tag::T0));
    xa.set_tag(index, Tag::T0);
    c.check(!xa.get_tag(index, Tag::T0));

    // A multi-index entry stored over tagged entries carries the union.
    #[cfg(feature = "multi-index")]
    {
        c.check(index % 4 == 0);
        c.check(store_value(xa, index + 1, AllocMode::Blocking) == Ok(None));
        xa.set_tag(index + 1, Tag::T0);
        c.check(store_value(xa, index + 2, AllocMode::Blocking) == Ok(None));
        xa.set_tag(index + 2, Tag::T1);
        store_order(xa, index, 2, value(index));
        for i in [index, index + 1, index + 3] {
            c.check(xa.get_tag(i, Tag::T0));
            c.check(xa.get_tag(i, Tag::T1));
            c.check(!xa.get_tag(i, Tag::T2));
        }
        erase_value(c, xa, index);
    }
    c.check(xa.is_empty());
}

fn check_xa_tag(c: &mut Checker, xa: &TestArray) {
    for index in [0, 4, 64, 4096, 16380] {
        check_xa_tag_1(c, xa, index);
    }
}

fn check_xa_shrink(c: &mut Checker, xa: &TestArray) {
    c.check(xa.is_empty());
    c.check(store_value(xa, 0, AllocMode::Blocking) == Ok(None));
    c.check(store_value(xa, 1, AllocMode::Blocking) == Ok(None));

    // Erasing 1 collapses the leaf and leaves a retry marker behind.
    {
        let lock = xa.lock();
        let mut xas = Cursor::new(xa, 1);
        c.check(xas.load() == value(1));
        let Some(node) = xas.node_ptr() else {
            c.check(false);
            return;
        };
        // SAFETY: The node was reached under `xas`'s guard, which keeps it
        // allocated after it is retired below.
        let node = unsafe { node.as_ref() };
        c.check(node.get(0).decode::<u64>() == value(0));
        c.check(xas.store(&lock, None) == value(1));
        c.check(xa.load(1).is_none());
        c.check(xas.state() == CursorState::Bounds);
        c.check(node.get(0).is_retry());
        c.check(xas.load().is_none());
    }
    c.check(xa.load(0) == value(0));
    erase_value(c, xa, 0);
    c.check(xa.is_empty());

    // Growing over a multi-index entry and shrinking back restores the head.
    #[cfg(feature = "multi-index")]
    for order in 0..8 {
        let max = (1usize << order) - 1;
        store_order(xa, 0, order, value(0));
        c.check(xa.load(max) == value(0));
        c.check(xa.load(max + 1).is_none());
        let head = xa.head();
        c.check(store_value(xa, usize::MAX, AllocMode::Blocking) == Ok(None));
        c.check(xa.head() != head);
        c.check(xa.load(usize::MAX) == index_value(usize::MAX));
        c.check(xa.load(max + 1).is_none());
        erase_value(c, xa, usize::MAX);
        c.check(xa.head() == head);
        c.check(xa.erase(0) == value(0));
        c.check(xa.is_empty());
    }
}

fn check_cmpxchg(c: &mut Checker, xa: &TestArray) {
    let five = value(5);
    let six = value(6);
    let lots = value(12_345_678);

    c.check(xa.is_empty());
    c.check(store_value(xa, 12_345_678, AllocMode::Blocking) == Ok(None));
    let Some(anchor) = anchor() else {
        c.check(false);
        return;
    };
    c.check(xa.insert(12_345_678, anchor) == Err(XaError::AlreadyExists));
    c.check(xa.cmpxchg(12_345_678, six, five) == Ok(lots));
    c.check(xa.cmpxchg(12_345_678, lots, five) == Ok(lots));
    c.check(xa.cmpxchg(12_345_678, five, lots) == Ok(five));
    c.check(xa.cmpxchg(5, five, None) == Ok(None));
    c.check(xa.cmpxchg(5, None, five) == Ok(None));
    erase_value(c, xa, 12_345_678);
    erase_value(c, xa, 5);
    c.check(xa.is_empty());
}

fn check_xas_erase(c: &mut Checker, xa: &TestArray) {
    let mut xas = Cursor::new(xa, 0);
    for i in 0..200 {
        for j in i..2 * i + 17 {
            xas.set(j);
            cursor_store(xa, &mut xas, j);
        }

        xas.set(usize::MAX);
        cursor_store(xa, &mut xas, 0);

        let lock = xa.lock();
        xas.store(&lock, None);

        xas.set(0);
        let mut j = i;
        let mut entry = xas.find(usize::MAX);
        while let Some(found) = entry {
            c.check(found == Entry::Value(j));
            xas.store(&lock, None);
            j += 1;
            entry = xas.next_entry(usize::MAX);
        }
        c.check(j == 2 * i + 17);
        drop(lock);
        c.check(xa.is_empty());
    }
}

#[cfg(feature = "multi-index")]
fn check_multi_store(c: &mut Checker, xa: &TestArray) {
    // Loading from any index of the span returns the same entry.
    store_order(xa, 0, 1, value(0));
    c.check(xa.load(0) == value(0));
    c.check(xa.load(1) == value(0));
    c.check(xa.load(2).is_none());
    c.check(xa.top_counts() == Some((2, 2)));

    // Storing next to it leaves it alone.
    c.check(xa.store(3, anchor()).is_ok());
    c.check(xa.load(0) == value(0));
    c.check(xa.load(1) == value(0));
    c.check(xa.load(2).is_none());
    c.check(xa.top_counts() == Some((3, 2)));

    // Overwriting several indices at once.
    store_order(xa, 0, 2, value(1));
    for i in 0..4 {
        c.check(xa.load(i) == value(1));
    }
    c.check(xa.load(4).is_none());
    c.check(xa.top_counts() == Some((4, 4)));

    // One store of nothing over the whole index space empties the array.
    store_order(xa, 0, usize::BITS, None);
    c.check(xa.is_empty());

    // Even when the first slot of the span is empty.
    c.check(store_value(xa, 1, AllocMode::Blocking).is_ok());
    c.check(store_value(xa, 2, AllocMode::Blocking).is_ok());
    store_order(xa, 0, 2, None);
    c.check(xa.is_empty());

    let max_order: u32 = if usize::BITS == 32 { 30 } else { 60 };
    for i in 0..max_order {
        for j in 0..max_order {
            store_order(xa, 0, i, value(i as usize));
            store_order(xa, 0, j, value(j as usize));

            for k in 0..max_order {
                let entry = xa.load((1usize << k) - 1);
                if i < k && j < k {
                    c.check(entry.is_none());
                } else {
                    c.check(entry == value(j as usize));
                }
            }

            xa.erase(0);
            c.check(xa.is_empty());
        }
    }
}

#[cfg(feature = "multi-index")]
fn check_multi_find(c: &mut Checker, xa: &TestArray) {
    store_order(xa, 12, 2, value(12));
    c.check(store_value(xa, 16, AllocMode::Blocking) == Ok(None));

    let mut index = 0;
    c.check(xa.find(&mut index, usize::MAX, Filter::Present) == value(12));
    c.check(index == 12);
    index = 13;
    c.check(xa.find(&mut index, usize::MAX, Filter::Present) == value(12));
    c.check((12..16).contains(&index));
    c.check(xa.find_after(&mut index, usize::MAX, Filter::Present) == value(16));
    c.check(index == 16);

    erase_value(c, xa, 12);
    erase_value(c, xa, 16);
    c.check(xa.is_empty());

    // Entries that fill whole slots of interior nodes.
    for order in [6, 12, 30] {
        let start = 1usize << order;
        let next = start << 1;
        store_order(xa, start, order, value(order as usize));
        c.check(xa.store(next, anchor()).is_ok());

        let mut index = start + (start >> 1);
        c.check(xa.find(&mut index, usize::MAX, Filter::Present) == value(order as usize));
        c.check(index == start);
        c.check(xa.find_after(&mut index, usize::MAX, Filter::Present) == anchor());
        c.check(index == next);
        c.check(xa.find_after(&mut index, usize::MAX, Filter::Present).is_none());

        c.check(xa.erase(start) == value(order as usize));
        c.check(xa.erase(next) == anchor());
        c.check(xa.is_empty());
    }
}

fn check_find(c: &mut Checker, xa: &TestArray) {
    c.check(xa.is_empty());

    // Every pair of entries below 100, searched from every start below 100.
    for i in 0..100 {
        c.check(store_value(xa, i, AllocMode::Blocking) == Ok(None));
        xa.set_tag(i, Tag::T0);
        for j in 0..i {
            c.check(store_value(xa, j, AllocMode::Blocking) == Ok(None));
            xa.set_tag(j, Tag::T0);
            for k in 0..100 {
                for filter in [Filter::Present, Filter::Tagged(Tag::T0)] {
                    let mut index = k;
                    let entry = xa.find(&mut index, usize::MAX, filter);
                    if k <= j {
                        c.check(index == j && entry == value(j));
                    } else if k <= i {
                        c.check(index == i && entry == value(i));
                    } else {
                        c.check(entry.is_none());
                    }
                }
            }
            erase_value(c, xa, j);
            c.check(!xa.get_tag(j, Tag::T0));
            c.check(xa.get_tag(i, Tag::T0));
        }
        erase_value(c, xa, i);
        c.check(!xa.get_tag(i, Tag::T0));
    }
    c.check(xa.is_empty());
}

fn check_iter_symmetry(c: &mut Checker, xa: &TestArray) {
    let indices = [0, 5, 1 << 16];
    for index in indices {
        c.check(store_value(xa, index, AllocMode::Blocking) == Ok(None));
    }

    let forward: Vec<(usize, Entry<u64>)> = xa.iter().collect();
    c.check(forward.len() == indices.len());

    // Stepping back from the top of the index space finds nothing until it
    // reaches the span of the top node, so the walk resumes at its last index.
    let mut xas = Cursor::new(xa, 0);
    c.check(xas.load() == index_value(0));
    c.check(xas.prev().is_none());
    c.check(xas.index() == usize::MAX);
    c.check(xas.state() == CursorState::Bounds);
    c.check(xas.prev().is_none());
    c.check(xas.index() == usize::MAX - 1);

    let top = (1usize << 18) - 1;
    let mut backward = Vec::new();
    xas.set(top);
    if let Some(entry) = xas.load() {
        backward.push((xas.index(), entry));
    }
    loop {
        if let Some(entry) = xas.prev() {
            backward.push((xas.index(), entry));
        }
        if xas.index() == 0 {
            break;
        }
    }
    drop(xas);
    backward.reverse();
    c.check(forward == backward);

    for index in indices {
        erase_value(c, xa, index);
    }
    c.check(xa.is_empty());
}

fn check_destroy(c: &mut Checker, xa: &TestArray) {
    c.check(xa.is_empty());

    // Destroying an empty array does nothing.
    xa.destroy();
    c.check(xa.is_empty());

    for index in 0..1000 {
        c.check(store_value(xa, index, AllocMode::Blocking).is_ok());
        c.check(!xa.is_empty());
        xa.destroy();
        c.check(xa.is_empty());
    }

    c.check(xa.store(usize::MAX, anchor()).is_ok());
    c.check(!xa.is_empty());
    xa.destroy();
    c.check(xa.is_empty());

    #[cfg(feature = "multi-index")]
    {
        c.check(xa.store_order(1 << 11, 11, anchor()).is_ok());
        c.check(!xa.is_empty());
        xa.destroy();
        c.check(xa.is_empty());
    }
}

fn check_move_small(c: &mut Checker, xa: &TestArray, idx: usize) {
    c.check(store_value(xa, 0, AllocMode::Blocking).is_ok());
    c.check(store_value(xa, idx, AllocMode::Blocking).is_ok());

    let mut xas = Cursor::new(xa, 0);
    let mut i = 0;
    while i < idx * 4 {
        let entry = xas.next();
        if i <= idx {
            c.check(xas.state() != CursorState::Restart);
        }
        c.check(xas.index() == i);
        if i == 0 || i == idx {
            c.check(entry == value(i));
        } else {
            c.check(entry.is_none());
        }
        i += 1;
    }
    xas.next();
    c.check(xas.index() == i);

    loop {
        let entry = xas.prev();
        i -= 1;
        if i <= idx {
            c.check(xas.state() != CursorState::Restart);
        }
        c.check(xas.index() == i);
        if i == 0 || i == idx {
            c.check(entry == value(i));
        } else {
            c.check(entry.is_none());
        }
        if i == 0 {
            break;
        }
    }

    xas.set(usize::MAX);
    c.check(xas.next().is_none());
    c.check(xas.index() == usize::MAX);
    c.check(xas.next() == value(0));
    c.check(xas.index() == 0);
    c.check(xas.prev().is_none());
    c.check(xas.index() == usize::MAX);
    drop(xas);

    erase_value(c, xa, 0);
    erase_value(c, xa, idx);
    c.check(xa.is_empty());
}

fn check_move(c: &mut Checker, xa: &TestArray) {
    const TOP: usize = 1 << 16;
    const HOLE: std::ops::Range<usize> = (1 << 8)..(1 << 15);

    for i in 0..TOP {
        c.check(store_value(xa, i, AllocMode::Blocking) == Ok(None));
    }

    let mut xas = Cursor::new(xa, TOP - 1);
    let mut i = TOP;
    loop {
        let entry = xas.prev();
        i -= 1;
        c.check(entry == value(i));
        c.check(xas.index() == i);
        if i == 0 {
            break;
        }
    }
    c.check(xas.prev().is_none());
    c.check(xas.index() == usize::MAX);

    while i < TOP {
        let entry = xas.next();
        c.check(entry == value(i));
        c.check(xas.index() == i);
        i += 1;
    }

    for index in HOLE {
        erase_value(c, xa, index);
    }

    i = xas.index();
    loop {
        let entry = xas.prev();
        i -= 1;
        if HOLE.contains(&i) {
            c.check(entry.is_none());
        } else {
            c.check(entry == value(i));
        }
        c.check(xas.index() == i);
        if i == 0 {
            break;
        }
    }
    c.check(xas.prev().is_none());
    c.check(xas.index() == usize::MAX);

    i = 0;
    while i < TOP {
        let entry = xas.next();
        if HOLE.contains(&i) {
            c.check(entry.is_none());
        } else {
            c.check(entry == value(i));
        }
        c.check(xas.index() == i);
        i += 1;
    }
    drop(xas);

    xa.destroy();

    for shift in 0..16 {
        check_move_small(c, xa, 1 << shift);
    }
    for shift in 2..16 {
        check_move_small(c, xa, (1 << shift) - 1);
    }
}

fn check_store_iter_1(c: &mut Checker, xa: &TestArray, start: usize, order: u32, present: usize) {
    let span = 1usize << order;
    let mut xas = Cursor::new(xa, start);
    #[cfg(feature = "multi-index")]
    xas.set_order(start, order);

    let mut count;
    loop {
        count = 0;
        {
            let lock = xa.lock();
            while let Some(entry) = xas.find_conflict(&lock) {
                let v = entry.as_value();
                c.check(v.is_some_and(|v| (start..start + span).contains(&v)));
                count += 1;
            }
            xas.store(&lock, value(start));
        }
        if !xas.nomem(AllocMode::Blocking) {
            break;
        }
    }
    c.check(xas.error().is_none());
    c.check(count == present);
    drop(xas);
    c.check(xa.load(start) == value(start));
    c.check(xa.load(start + span - 1) == value(start));
    erase_value(c, xa, start);
}

fn check_store_iter(c: &mut Checker, xa: &TestArray) {
    let max_order: u32 = if cfg!(feature = "multi-index") { 16 } else { 1 };

    for i in 0..max_order {
        let min = 1usize << i;
        let max = (2usize << i) - 1;
        check_store_iter_1(c, xa, 0, i, 0);
        c.check(xa.is_empty());
        check_store_iter_1(c, xa, min, i, 0);
        c.check(xa.is_empty());

        c.check(store_value(xa, min, AllocMode::Blocking).is_ok());
        check_store_iter_1(c, xa, min, i, 1);
        c.check(xa.is_empty());
        c.check(store_value(xa, max, AllocMode::Blocking).is_ok());
        check_store_iter_1(c, xa, min, i, 1);
        c.check(xa.is_empty());

        for j in 0..min {
            c.check(store_value(xa, j, AllocMode::Blocking).is_ok());
        }
        check_store_iter_1(c, xa, 0, i, min);
        c.check(xa.is_empty());
        for j in 0..min {
            c.check(store_value(xa, min + j, AllocMode::Blocking).is_ok());
        }
        check_store_iter_1(c, xa, min, i, min);
        c.check(xa.is_empty());
    }

    #[cfg(feature = "multi-index")]
    {
        c.check(store_value(xa, 63, AllocMode::Blocking).is_ok());
        c.check(store_value(xa, 65, AllocMode::Blocking).is_ok());
        check_store_iter_1(c, xa, 64, 2, 1);
        erase_value(c, xa, 63);
    }
    c.check(xa.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checker_counts_and_records_failures() {
        let mut checker = Checker::new();
        checker.current = "demo";
        checker.check(true);
        checker.check(false);
        let report = checker.into_report();
        assert!(!report.is_ok());
        assert_eq!(report.run, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].check, "demo");
        assert_eq!(report.to_string(), "XArray: 1 of 2 tests passed");
    }

    #[test]
    fn suite_names_are_unique() {
        let mut names: Vec<&str> = SUITE.iter().map(|test| test.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SUITE.len());
    }

    #[test]
    fn small_checks_pass() {
        let report = run_matching(|name| matches!(name, "xa_err" | "xas_retry" | "cmpxchg"));
        assert!(report.is_ok(), "{report}: {:?}", report.failures);
        assert!(report.run > 20);
    }
}
