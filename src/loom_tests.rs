//! Loom models of the reader/writer publication protocol.
//!
//! Loom explores every interleaving of a small model, so these use a
//! two-slot stand-in for [`XaNode`](crate::XaNode) with loom's atomics and the
//! same word encoding: values are `(v << 1) | 1`, node references are
//! `ptr | 2`, and the retry marker is the internal entry 256.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --lib loom_tests`

use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::sync::{Arc, Mutex};
use loom::thread;

const RETRY: usize = (256 << 2) | 2;

const fn value(v: usize) -> usize {
    (v << 1) | 1
}

const fn is_node(entry: usize) -> bool {
    entry & 3 == 2 && entry > 4096
}

struct LoomNode {
    slots: [AtomicUsize; 2],
}

impl LoomNode {
    fn new() -> Self {
        Self {
            slots: [AtomicUsize::new(0), AtomicUsize::new(0)],
        }
    }

    fn into_entry(self) -> usize {
        Box::into_raw(Box::new(self)) as usize | 2
    }

    /// # Safety
    /// `entry` came from [`into_entry`](Self::into_entry) and is still live.
    unsafe fn from_entry<'a>(entry: usize) -> &'a Self {
        // SAFETY: Caller guarantees the node is live.
        unsafe { &*((entry & !3) as *const Self) }
    }

    /// # Safety
    /// As [`from_entry`](Self::from_entry), and nothing else refers to it.
    unsafe fn free(entry: usize) {
        // SAFETY: Caller guarantees exclusive ownership.
        drop(unsafe { Box::from_raw((entry & !3) as *mut Self) });
    }
}

struct LoomArray {
    head: AtomicUsize,
    lock: Mutex<()>,
}

impl LoomArray {
    fn new(head: usize) -> Self {
        Self {
            head: AtomicUsize::new(head),
            lock: Mutex::new(()),
        }
    }

    /// Lock-free load with the same restart rule as the cursor.
    fn load(&self, index: usize) -> usize {
        'restart: loop {
            let head = self.head.load(Ordering::Acquire);
            if !is_node(head) {
                return if index == 0 { head } else { 0 };
            }
            // SAFETY: Nodes in these models are freed only after all threads join.
            let node = unsafe { LoomNode::from_entry(head) };
            let entry = node.slots[index].load(Ordering::Acquire);
            if entry == RETRY {
                continue 'restart;
            }
            return entry;
        }
    }
}

// ============================================================================
//  Models
// ============================================================================

/// A reader that sees a freshly published node sees its slots.
#[test]
fn growth_publishes_initialised_node() {
    loom::model(|| {
        let xa = Arc::new(LoomArray::new(value(7)));

        let writer = {
            let xa = Arc::clone(&xa);
            thread::spawn(move || {
                let _guard = xa.lock.lock().unwrap();
                let node = LoomNode::new();
                node.slots[0].store(xa.head.load(Ordering::Relaxed), Ordering::Relaxed);
                node.slots[1].store(value(9), Ordering::Relaxed);
                xa.head.store(node.into_entry(), Ordering::Release);
            })
        };

        let first = xa.load(0);
        let second = xa.load(1);
        assert_eq!(first, value(7));
        assert!(second == 0 || second == value(9));

        writer.join().unwrap();
        assert_eq!(xa.load(1), value(9));
        // SAFETY: All threads have joined.
        unsafe { LoomNode::free(xa.head.load(Ordering::Relaxed)) };
    });
}

/// Shrinking to a bare head never hides the surviving entry.
#[test]
fn shrink_leaves_retry_for_stale_readers() {
    loom::model(|| {
        let node = LoomNode::new();
        node.slots[0].store(value(3), Ordering::Relaxed);
        let node_entry = node.into_entry();
        let xa = Arc::new(LoomArray::new(node_entry));

        let writer = {
            let xa = Arc::clone(&xa);
            thread::spawn(move || {
                let _guard = xa.lock.lock().unwrap();
                // SAFETY: Freed only after join.
                let node = unsafe { LoomNode::from_entry(node_entry) };
                let survivor = node.slots[0].load(Ordering::Relaxed);
                xa.head.store(survivor, Ordering::Release);
                node.slots[0].store(RETRY, Ordering::Release);
            })
        };

        assert_eq!(xa.load(0), value(3));
        writer.join().unwrap();
        assert_eq!(xa.load(0), value(3));
        // SAFETY: All threads have joined and the node is unlinked.
        unsafe { LoomNode::free(node_entry) };
    });
}

/// Erasing through an unlinked node reads as empty, never as the marker.
#[test]
fn node_removal_reads_as_empty() {
    loom::model(|| {
        let node = LoomNode::new();
        node.slots[1].store(value(5), Ordering::Relaxed);
        let node_entry = node.into_entry();
        let xa = Arc::new(LoomArray::new(node_entry));

        let writer = {
            let xa = Arc::clone(&xa);
            thread::spawn(move || {
                let _guard = xa.lock.lock().unwrap();
                // SAFETY: Freed only after join.
                let node = unsafe { LoomNode::from_entry(node_entry) };
                node.slots[1].store(0, Ordering::Release);
                xa.head.store(0, Ordering::Release);
                node.slots[0].store(RETRY, Ordering::Release);
                node.slots[1].store(RETRY, Ordering::Release);
            })
        };

        let seen = xa.load(1);
        assert!(seen == 0 || seen == value(5));
        assert_ne!(xa.load(0), RETRY);

        writer.join().unwrap();
        assert_eq!(xa.load(1), 0);
        // SAFETY: All threads have joined and the node is unlinked.
        unsafe { LoomNode::free(node_entry) };
    });
}

/// Compare-and-exchange under the writer lock loses no update.
#[test]
fn locked_cmpxchg_is_exclusive() {
    loom::model(|| {
        let xa = Arc::new(LoomArray::new(value(0)));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let xa = Arc::clone(&xa);
                thread::spawn(move || {
                    let _guard = xa.lock.lock().unwrap();
                    let current = xa.head.load(Ordering::Relaxed);
                    xa.head.store(value((current >> 1) + 1), Ordering::Release);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(xa.load(0), value(2));
    });
}
