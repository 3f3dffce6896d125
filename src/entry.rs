//! Slot entries.
//!
//! Two layers live here:
//! - [`Entry<T>`]: the sum type callers store and load (an inline value or a
//!   caller-owned pointer). "No entry" is `None`.
//! - [`RawEntry`]: the word-sized encoding kept in every slot. Only the node,
//!   cursor and tree code reason about its bit layout.
//!
//! Word layout (low two bits):
//!
//! | bits | meaning |
//! |------|---------|
//! | `x1` | inline value, `v = word >> 1` |
//! | `00` | pointer (or empty when the whole word is zero) |
//! | `10` | internal: sibling (`< 62`), retry (`256`) or node reference (`> 4096`) |

use std::fmt as StdFmt;
use std::hash::{Hash, Hasher};
use std::ptr as StdPtr;
use std::ptr::NonNull;

use crate::error::XaError;
use crate::node::{CHUNK_SIZE, XaNode};

/// Largest value that fits inline in a slot.
pub const MAX_VALUE: usize = isize::MAX as usize;

/// Low two bits of an internal entry.
const INTERNAL_TAG: usize = 0b10;

/// Low two bits that must be clear in a pointer entry.
const POINTER_MASK: usize = 0b11;

/// Internal entries above this word are node references.
const NODE_THRESHOLD: usize = 4096;

/// Internal payload of the retry marker.
const RETRY_PAYLOAD: usize = 256;

// ============================================================================
//  Entry<T>
// ============================================================================

/// An entry as seen by callers of [`XArray`](crate::XArray).
///
/// Pointer entries are owned by the caller. The array never dereferences or
/// frees them; it only stores the address.
pub enum Entry<T> {
    /// An integer stored inline in the slot. Must not exceed [`MAX_VALUE`].
    Value(usize),

    /// A caller-owned pointer. Its two low address bits must be zero.
    Pointer(NonNull<T>),
}

impl<T> Entry<T> {
    /// Checked constructor for an inline value.
    ///
    /// # Errors
    ///
    /// [`XaError::InvalidValue`] if `v > MAX_VALUE`.
    #[inline]
    pub const fn value(v: usize) -> Result<Self, XaError> {
        if v > MAX_VALUE {
            return Err(XaError::InvalidValue);
        }
        Ok(Self::Value(v))
    }

    /// Checked constructor for a pointer entry.
    ///
    /// # Errors
    ///
    /// [`XaError::InvalidValue`] if the pointer is not 4-byte aligned.
    #[inline]
    pub fn pointer(ptr: NonNull<T>) -> Result<Self, XaError> {
        if ptr.as_ptr().addr() & POINTER_MASK != 0 {
            return Err(XaError::InvalidValue);
        }
        Ok(Self::Pointer(ptr))
    }

    /// Check if this is an inline value.
    #[must_use]
    #[inline(always)]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Check if this is a pointer entry.
    #[must_use]
    #[inline(always)]
    pub const fn is_pointer(&self) -> bool {
        matches!(self, Self::Pointer(_))
    }

    /// The inline value, if this is one.
    #[must_use]
    #[inline(always)]
    pub const fn as_value(&self) -> Option<usize> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Pointer(_) => None,
        }
    }

    /// The stored pointer, if this is one.
    #[must_use]
    #[inline(always)]
    pub const fn as_ptr(&self) -> Option<NonNull<T>> {
        match self {
            Self::Pointer(p) => Some(*p),
            Self::Value(_) => None,
        }
    }
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Entry<T> {}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Pointer(a), Self::Pointer(b)) => a == b,
            _ => false,
        }
    }
}

impl<T> Eq for Entry<T> {}

impl<T> Hash for Entry<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Value(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            Self::Pointer(p) => {
                1u8.hash(state);
                p.hash(state);
            }
        }
    }
}

impl<T> StdFmt::Debug for Entry<T> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Pointer(p) => f.debug_tuple("Pointer").field(p).finish(),
        }
    }
}

// SAFETY: An entry is an integer or an address the array never dereferences.
// Sending it is as safe as sending `&T`, which needs `T: Sync`.
unsafe impl<T: Sync> Send for Entry<T> {}

// SAFETY: Same reasoning as `Send`; `Entry` has no interior mutability.
unsafe impl<T: Sync> Sync for Entry<T> {}

// ============================================================================
//  RawEntry
// ============================================================================

/// The encoded word stored in a slot, the tree head or a node pointer.
///
/// Value and internal words are built without provenance. Node references
/// keep the node allocation's provenance through `map_addr`, so they can be
/// turned back into dereferenceable pointers.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawEntry(*mut ());

impl RawEntry {
    /// The empty slot.
    pub const NULL: Self = Self(StdPtr::null_mut());

    /// Marker left in slots of removed nodes: the reader must restart.
    pub const RETRY: Self = Self::internal(RETRY_PAYLOAD);

    #[inline(always)]
    const fn internal(payload: usize) -> Self {
        Self(StdPtr::without_provenance_mut((payload << 2) | INTERNAL_TAG))
    }

    #[inline(always)]
    pub(crate) const fn from_raw(word: *mut ()) -> Self {
        Self(word)
    }

    #[inline(always)]
    pub(crate) const fn into_raw(self) -> *mut () {
        self.0
    }

    /// Encode an inline value.
    ///
    /// # Errors
    ///
    /// [`XaError::InvalidValue`] if `v > MAX_VALUE`.
    #[inline]
    pub const fn from_value(v: usize) -> Result<Self, XaError> {
        if v > MAX_VALUE {
            return Err(XaError::InvalidValue);
        }
        Ok(Self(StdPtr::without_provenance_mut((v << 1) | 1)))
    }

    /// Encode a caller pointer.
    ///
    /// # Errors
    ///
    /// [`XaError::InvalidValue`] if either low address bit is set.
    #[inline]
    pub fn from_ptr<T>(ptr: NonNull<T>) -> Result<Self, XaError> {
        let raw: *mut () = ptr.as_ptr().cast();
        if raw.addr() & POINTER_MASK != 0 {
            return Err(XaError::InvalidValue);
        }
        Ok(Self(raw))
    }

    /// Encode an optional caller entry (`None` is the empty slot).
    ///
    /// # Errors
    ///
    /// [`XaError::InvalidValue`] if the entry cannot be represented.
    #[inline]
    pub fn encode<T>(entry: Option<Entry<T>>) -> Result<Self, XaError> {
        match entry {
            None => Ok(Self::NULL),
            Some(Entry::Value(v)) => Self::from_value(v),
            Some(Entry::Pointer(p)) => Self::from_ptr(p),
        }
    }

    /// Decode into a caller entry. Empty and internal words give `None`.
    #[must_use]
    #[inline]
    pub fn decode<T>(self) -> Option<Entry<T>> {
        if self.is_value() {
            return Some(Entry::Value(self.to_value()));
        }
        if self.is_pointer() {
            return NonNull::new(self.0.cast::<T>()).map(Entry::Pointer);
        }
        None
    }

    /// Secondary slot of a multi-index entry whose canonical slot is `offset`.
    #[inline(always)]
    pub(crate) const fn sibling(offset: u8) -> Self {
        debug_assert!((offset as usize) < CHUNK_SIZE - 1);
        Self::internal(offset as usize)
    }

    /// Wrap a node pointer as an internal entry.
    #[inline(always)]
    pub(crate) fn from_node(node: NonNull<XaNode>) -> Self {
        Self(node.as_ptr().cast::<()>().map_addr(|a| a | INTERNAL_TAG))
    }

    /// Check if the slot is empty.
    #[must_use]
    #[inline(always)]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// Check if the word holds an inline value.
    #[must_use]
    #[inline(always)]
    pub fn is_value(self) -> bool {
        self.0.addr() & 1 != 0
    }

    /// Check if the word holds a (non-empty) caller pointer.
    #[must_use]
    #[inline(always)]
    pub fn is_pointer(self) -> bool {
        !self.is_null() && self.0.addr() & POINTER_MASK == 0
    }

    /// Check if the word is internal (sibling, retry or node).
    #[must_use]
    #[inline(always)]
    pub fn is_internal(self) -> bool {
        self.0.addr() & POINTER_MASK == INTERNAL_TAG
    }

    /// Check if the word references a node.
    #[must_use]
    #[inline(always)]
    pub fn is_node(self) -> bool {
        self.is_internal() && self.0.addr() > NODE_THRESHOLD
    }

    /// Check if the word is the retry marker.
    #[must_use]
    #[inline(always)]
    pub fn is_retry(self) -> bool {
        self == Self::RETRY
    }

    /// Check if the word is a sibling marker.
    #[must_use]
    #[inline(always)]
    pub fn is_sibling(self) -> bool {
        self.is_internal() && self.0.addr() < Self::internal(CHUNK_SIZE - 1).0.addr()
    }

    /// The inline value. Meaningful only when [`is_value`](Self::is_value).
    #[must_use]
    #[inline(always)]
    pub fn to_value(self) -> usize {
        debug_assert!(self.is_value());
        self.0.addr() >> 1
    }

    /// Canonical offset of a sibling. Meaningful only when [`is_sibling`](Self::is_sibling).
    #[must_use]
    #[inline(always)]
    #[expect(clippy::cast_possible_truncation, reason = "sibling offsets are below 63")]
    pub fn to_sibling(self) -> u8 {
        debug_assert!(self.is_sibling());
        (self.0.addr() >> 2) as u8
    }

    /// The referenced node, if this is a node entry.
    #[inline(always)]
    pub(crate) fn to_node(self) -> Option<NonNull<XaNode>> {
        if !self.is_node() {
            return None;
        }
        NonNull::new(self.0.map_addr(|a| a & !INTERNAL_TAG).cast::<XaNode>())
    }
}

impl StdFmt::Debug for RawEntry {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        if self.is_null() {
            write!(f, "Null")
        } else if self.is_value() {
            write!(f, "Value({})", self.to_value())
        } else if self.is_retry() {
            write!(f, "Retry")
        } else if self.is_sibling() {
            write!(f, "Sibling({})", self.to_sibling())
        } else if self.is_node() {
            write!(f, "Node({:p})", self.0)
        } else if self.is_internal() {
            write!(f, "Internal({:#x})", self.0.addr() >> 2)
        } else {
            write!(f, "Pointer({:p})", self.0)
        }
    }
}
