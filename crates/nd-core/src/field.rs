//! Record field layout.
//!
//! A node type declares its layout once as a chain of `const` fields, each
//! placed after the previous one:
//!
//! ```rust
//! use nd_core::field::Field;
//! use nd_core::node::NODE_TYPE;
//!
//! const PARENT: Field = NODE_TYPE.next("parent", 8);
//! const FLAGS: Field = PARENT.next("flags", 2);
//! const RECORD_SIZE: u64 = FLAGS.end();
//!
//! assert_eq!(PARENT.offset(), 8);
//! assert_eq!(FLAGS.offset(), 16);
//! assert_eq!(RECORD_SIZE, 18);
//! ```
//!
//! Fields are naturally aligned (up to 8 bytes) so every value sits on its
//! own size boundary within the record.

use std::fmt;

use nd_common::types::Address;

/// A named byte range within a record.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    name: &'static str,
    offset: u64,
    size: u64,
}

impl Field {
    /// Creates a field at an explicit offset.
    pub const fn new(name: &'static str, offset: u64, size: u64) -> Self {
        Self { name, offset, size }
    }

    /// Creates the field that follows `self`, aligned to its own size.
    pub const fn next(&self, name: &'static str, size: u64) -> Self {
        let align = if size >= 8 {
            8
        } else if size >= 4 {
            4
        } else if size >= 2 {
            2
        } else {
            1
        };
        let offset = (self.end() + align - 1) / align * align;
        Self { name, offset, size }
    }

    /// Returns the field name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the offset from the start of the record.
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the size in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the first offset past this field.
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Returns the absolute address of this field in the record at `record`.
    pub const fn address_in(&self, record: Address) -> Address {
        record.offset(self.offset)
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({} @{}+{})", self.name, self.offset, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_aligns_to_size() {
        let tag = Field::new("tag", 0, 2);
        let byte = tag.next("b", 1);
        let int = byte.next("i", 4);
        let long = int.next("l", 8);
        let bytes = long.next("raw", 12);

        assert_eq!(byte.offset(), 2);
        assert_eq!(int.offset(), 4);
        assert_eq!(long.offset(), 8);
        assert_eq!(bytes.offset(), 16);
        assert_eq!(bytes.end(), 28);
    }

    #[test]
    fn test_address_in() {
        let field = Field::new("next", 8, 8);
        assert_eq!(field.address_in(Address::new(0x100)), Address::new(0x108));
    }
}
