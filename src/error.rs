//! Error type returned by fallible [`XArray`](crate::XArray) operations.

use std::fmt as StdFmt;

// ============================================================================
//  XaError
// ============================================================================

/// Errors reported by stores, inserts and cursor operations.
///
/// The internal "tree changed under you" condition is not represented here:
/// readers absorb it by restarting their walk from the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XaError {
    /// The entry cannot be encoded in a slot.
    ///
    /// Raised for inline values above `isize::MAX` and for pointers whose
    /// two low address bits are not zero.
    InvalidValue,

    /// A node allocation failed while growing the tree or creating the path
    /// to the target index. The tree is unchanged; retry after backing off.
    NoMemory,

    /// [`insert`](crate::XArray::insert) found the index already occupied.
    AlreadyExists,

    /// The requested span cannot be represented in the index space.
    OutOfBounds,
}

impl XaError {
    /// Negative errno-style code, for callers bridging to C-shaped interfaces.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::InvalidValue => -22,
            Self::NoMemory => -12,
            Self::AlreadyExists => -17,
            Self::OutOfBounds => -34,
        }
    }
}

impl StdFmt::Display for XaError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::InvalidValue => write!(f, "entry cannot be encoded in a slot"),

            Self::NoMemory => write!(f, "node allocation failed"),

            Self::AlreadyExists => write!(f, "index is already occupied"),

            Self::OutOfBounds => {
                write!(f, "span does not fit in the index space")
            }
        }
    }
}

impl std::error::Error for XaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_lowercase_and_terse() {
        assert_eq!(XaError::NoMemory.to_string(), "node allocation failed");
        assert_eq!(
            XaError::AlreadyExists.to_string(),
            "index is already occupied"
        );
    }

    #[test]
    fn errno_codes_are_negative() {
        for err in [
            XaError::InvalidValue,
            XaError::NoMemory,
            XaError::AlreadyExists,
            XaError::OutOfBounds,
        ] {
            assert!(err.errno() < 0, "{err:?}");
        }
    }
}
