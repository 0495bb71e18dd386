//! The addressable node handle.
//!
//! A [`Node`] is a `(session, address)` pair. Handles are cheap to clone and
//! several may alias one record; equality and hashing only consider the
//! session identity and the address.
//!
//! Typed node kinds wrap a `Node` and implement [`NodeType`]:
//!
//! ```rust
//! use nd_core::field::Field;
//! use nd_core::node::{Node, NodeType, NODE_TYPE};
//!
//! const NAME_LENGTH: Field = NODE_TYPE.next("name_length", 4);
//!
//! #[derive(Clone)]
//! struct FileNode(Node);
//!
//! impl NodeType for FileNode {
//!     const TYPE_NAME: &'static str = "FileNode";
//!
//!     fn from_node(node: Node) -> Self {
//!         Self(node)
//!     }
//!
//!     fn node(&self) -> &Node {
//!         &self.0
//!     }
//! }
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use nd_common::constants::{NODE_TYPE_OFFSET, NODE_TYPE_SIZE, POINTER_SIZE};
use nd_common::error::{NdError, NdResult};
use nd_common::types::{Address, TypeTag};

use crate::field::Field;
use crate::nd::Nd;

/// The type tag every record starts with.
pub const NODE_TYPE: Field = Field::new("NODE_TYPE", NODE_TYPE_OFFSET, NODE_TYPE_SIZE);

/// A typed view of a node record.
pub trait NodeType: Sized + 'static {
    /// Name used in diagnostics.
    const TYPE_NAME: &'static str;

    /// Wraps an untyped handle whose tag is known to belong to this type.
    fn from_node(node: Node) -> Self;

    /// Returns the untyped handle.
    fn node(&self) -> &Node;

    /// Returns the record address.
    fn address(&self) -> Address {
        self.node().address()
    }
}

/// An untyped handle to a node record.
#[derive(Clone)]
pub struct Node {
    nd: Arc<Nd>,
    address: Address,
}

impl Node {
    /// Wraps an existing record. Performs no I/O.
    pub fn new(nd: Arc<Nd>, address: Address) -> Self {
        Self { nd, address }
    }

    /// Loads the record at `address`, or `None` for the null address.
    pub fn load(nd: &Arc<Nd>, address: Address) -> NdResult<Option<Self>> {
        nd.load_node(address)
    }

    /// Returns the record address.
    #[inline]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Returns the owning session.
    #[inline]
    pub fn nd(&self) -> &Arc<Nd> {
        &self.nd
    }

    /// Reads the stored type tag.
    pub fn type_tag(&self) -> NdResult<TypeTag> {
        self.get_short(&NODE_TYPE).map(TypeTag::new)
    }

    /// Returns the registered name of this record's type.
    pub fn type_name(&self) -> NdResult<&'static str> {
        let tag = self.type_tag()?;
        let registered = self.nd.registry().resolve(&self.nd, self.address, tag)?;
        Ok(registered.type_name)
    }

    /// Deletes the record immediately. The handle must not be used again.
    pub fn delete(self) -> NdResult<()> {
        self.nd.delete(self.address)
    }

    /// Deletes the record when the current write lock is released.
    pub fn schedule_deletion(&self) {
        self.nd.schedule_deletion(self.address);
    }

    fn locate(&self, field: &Field, width: u64) -> Address {
        debug_assert!(
            field.size() >= width,
            "field {} is {} bytes, accessed as {width}",
            field.name(),
            field.size()
        );
        field.address_in(self.address)
    }

    fn readable(&self, field: &Field, width: u64) -> Address {
        self.nd.assert_readable();
        self.locate(field, width)
    }

    fn writable(&self, field: &Field, width: u64) -> Address {
        self.nd.assert_writable();
        self.locate(field, width)
    }

    /// Reads a one-byte field.
    pub fn get_byte(&self, field: &Field) -> NdResult<u8> {
        self.nd.database().get_byte(self.readable(field, 1))
    }

    /// Reads a two-byte field.
    pub fn get_short(&self, field: &Field) -> NdResult<u16> {
        self.nd.database().get_short(self.readable(field, 2))
    }

    /// Reads a four-byte field.
    pub fn get_int(&self, field: &Field) -> NdResult<u32> {
        self.nd.database().get_int(self.readable(field, 4))
    }

    /// Reads an eight-byte field.
    pub fn get_long(&self, field: &Field) -> NdResult<u64> {
        self.nd.database().get_long(self.readable(field, 8))
    }

    /// Reads an address field.
    pub fn get_address(&self, field: &Field) -> NdResult<Address> {
        self.nd
            .database()
            .get_address(self.readable(field, POINTER_SIZE))
    }

    /// Reads the whole field as raw bytes.
    pub fn get_bytes(&self, field: &Field) -> NdResult<Vec<u8>> {
        let mut buf = vec![0u8; field.size() as usize];
        self.nd
            .database()
            .get_bytes(self.readable(field, field.size()), &mut buf)?;
        Ok(buf)
    }

    /// Writes a one-byte field.
    pub fn put_byte(&self, field: &Field, value: u8) -> NdResult<()> {
        self.nd.database().put_byte(self.writable(field, 1), value)
    }

    /// Writes a two-byte field.
    pub fn put_short(&self, field: &Field, value: u16) -> NdResult<()> {
        self.nd.database().put_short(self.writable(field, 2), value)
    }

    /// Writes a four-byte field.
    pub fn put_int(&self, field: &Field, value: u32) -> NdResult<()> {
        self.nd.database().put_int(self.writable(field, 4), value)
    }

    /// Writes an eight-byte field.
    pub fn put_long(&self, field: &Field, value: u64) -> NdResult<()> {
        self.nd.database().put_long(self.writable(field, 8), value)
    }

    /// Writes an address field.
    pub fn put_address(&self, field: &Field, value: Address) -> NdResult<()> {
        self.nd
            .database()
            .put_address(self.writable(field, POINTER_SIZE), value)
    }

    /// Writes `data` at the start of the field.
    pub fn put_bytes(&self, field: &Field, data: &[u8]) -> NdResult<()> {
        if data.len() as u64 > field.size() {
            return Err(NdError::invalid_argument(format!(
                "{} bytes do not fit field {} ({} bytes)",
                data.len(),
                field.name(),
                field.size()
            )));
        }
        self.nd.database().put_bytes(self.writable(field, 0), data)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.nd, &other.nd) && self.address == other.address
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.nd).hash(state);
        self.address.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
