//! Typed references to non-node values.
//!
//! A [`Pointer`] names a slot holding the address of a value whose type is
//! fixed, so no type tag dispatch is needed. Node references go through
//! [`Nd::load`](crate::nd::Nd::load) instead; constructing a `Pointer` to a
//! registered node type is rejected.

use std::any::{type_name, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use nd_common::error::{NdError, NdResult};
use nd_common::types::Address;

use crate::nd::Nd;

/// A value that can be rebuilt from its address.
pub trait PointerTarget: Sized + 'static {
    /// Builds a handle for the value stored at `address`.
    fn from_address(nd: &Arc<Nd>, address: Address) -> NdResult<Self>;
}

/// A slot containing the address of a `T`.
pub struct Pointer<T> {
    nd: Arc<Nd>,
    slot: Address,
    _target: PhantomData<fn() -> T>,
}

impl<T: PointerTarget> Pointer<T> {
    /// Creates a pointer for the slot at `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`NdError::InvalidArgument`] if `T` is registered as a node
    /// type in this session's registry. The check is made against the
    /// registry at run time: a [`NodeType`](crate::node::NodeType) that is
    /// not registered with the session is not recognised and is accepted.
    pub fn new(nd: Arc<Nd>, slot: Address) -> NdResult<Self> {
        if nd.registry().is_node_type(TypeId::of::<T>()) {
            return Err(NdError::invalid_argument(format!(
                "{} is a node type and must be loaded by type tag",
                type_name::<T>()
            )));
        }
        Ok(Self {
            nd,
            slot,
            _target: PhantomData,
        })
    }

    /// Returns the slot address.
    pub fn slot(&self) -> Address {
        self.slot
    }

    /// Reads the slot and rebuilds the target, or `None` if the slot is null.
    ///
    /// Never cached: every call reflects the current contents of the slot.
    pub fn get(&self) -> NdResult<Option<T>> {
        self.nd.assert_readable();
        let target = self.nd.database().get_address(self.slot)?;
        if target.is_null() {
            return Ok(None);
        }
        T::from_address(&self.nd, target).map(Some)
    }

    /// Points the slot at `target`. Requires the write lock.
    pub fn set(&self, target: Address) -> NdResult<()> {
        self.nd.assert_writable();
        self.nd.database().put_address(self.slot, target)
    }
}

impl<T> Clone for Pointer<T> {
    fn clone(&self) -> Self {
        Self {
            nd: Arc::clone(&self.nd),
            slot: self.slot,
            _target: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Pointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pointer")
            .field("target", &type_name::<T>())
            .field("slot", &self.slot)
            .finish()
    }
}
