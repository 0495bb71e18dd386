//! Core identifier types for the Nd database.
//!
//! These types provide type-safe wrappers around the raw integers that the
//! store hands out, so an address is never confused with a type tag or a
//! write number.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a record within the database.
///
/// Addresses are byte offsets into a single growable store. Address 0 lies
/// inside the database header and is never handed out by the allocator, so it
/// doubles as the "no reference" sentinel.
///
/// # Example
///
/// ```rust
/// use nd_common::types::Address;
///
/// let addr = Address::new(4096);
/// assert_eq!(addr.as_u64(), 4096);
/// assert!(Address::NULL.is_null());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Address(u64);

impl Address {
    /// The null address, meaning "no record".
    pub const NULL: Self = Self(0);

    /// Creates a new `Address` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true for the null sentinel.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns the address `delta` bytes further into the store.
    #[inline]
    #[must_use]
    pub const fn offset(self, delta: u64) -> Self {
        Self(self.0 + delta)
    }

    /// Returns true if `[self, self + size)` overlaps `[other, other + other_size)`.
    #[must_use]
    pub const fn overlaps(self, size: u64, other: Self, other_size: u64) -> bool {
        self.0 < other.0 + other_size && other.0 < self.0 + size
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Address(NULL)")
        } else {
            write!(f, "Address({:#x})", self.0)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Address {
    #[inline]
    fn from(addr: u64) -> Self {
        Self::new(addr)
    }
}

impl From<Address> for u64 {
    #[inline]
    fn from(addr: Address) -> Self {
        addr.0
    }
}

/// Small integer identifying a node's concrete layout.
///
/// Tags are stored in the first two bytes of every node record and are
/// resolved through the type registry. Tags must stay stable for as long as
/// the schema version that assigned them is readable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TypeTag(u16);

impl TypeTag {
    /// Creates a tag from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    /// Returns the raw u16 value.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.0)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for TypeTag {
    #[inline]
    fn from(tag: u16) -> Self {
        Self::new(tag)
    }
}

/// Value of the write-generation counter.
///
/// Incremented exactly once per completed outermost write transaction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct WriteNumber(u64);

impl WriteNumber {
    /// Creates a write number from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following write number.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for WriteNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WriteNumber({})", self.0)
    }
}

impl fmt::Display for WriteNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_null() {
        assert!(Address::NULL.is_null());
        assert!(!Address::new(8).is_null());
        assert_eq!(format!("{:?}", Address::NULL), "Address(NULL)");
        assert_eq!(format!("{}", Address::new(255)), "0xff");
    }

    #[test]
    fn test_address_overlaps() {
        let a = Address::new(100);
        assert!(a.overlaps(8, Address::new(104), 2));
        assert!(a.overlaps(8, Address::new(96), 8));
        assert!(!a.overlaps(8, Address::new(108), 4));
        assert!(!a.overlaps(8, Address::new(92), 8));
    }

    #[test]
    fn test_write_number_next() {
        let n = WriteNumber::new(41);
        assert_eq!(n.next(), WriteNumber::new(42));
        assert!(n < n.next());
    }
}
