//! Node type registry.
//!
//! Every node record starts with a two-byte type tag. The registry maps each
//! tag to the [`TypeFactory`] describing that type's record size, destructor
//! and deletion policy, and maps each Rust node type back to its tag so new
//! records are stamped correctly.
//!
//! An unregistered tag found in storage is corruption, never a recoverable
//! condition.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nd_common::constants::NODE_TYPE_SIZE;
use nd_common::error::{ErrorCode, NdError, NdResult};
use nd_common::types::{Address, TypeTag};

use crate::nd::Nd;
use crate::node::{Node, NodeType, NODE_TYPE};
use crate::problem::ProblemBuilder;

/// How a node type's records are reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionSemantics {
    /// Records are only deleted by direct caller action. Scheduled deletions
    /// of such records are dropped.
    Explicit,
    /// The factory decides, through `is_ready_for_deletion`, whether a
    /// scheduled deletion may proceed.
    ReferenceCounted,
}

/// Per-type behaviour for a node type.
///
/// `record_size` must return the same value for the lifetime of the
/// database: records are never resized.
pub trait TypeFactory: Send + Sync + 'static {
    /// Fixed size of a record of this type, including the type tag.
    fn record_size(&self) -> u64;

    /// Deletion policy. Defaults to [`DeletionSemantics::Explicit`].
    fn deletion_semantics(&self) -> DeletionSemantics {
        DeletionSemantics::Explicit
    }

    /// Releases anything the record at `address` owns. Runs before the
    /// record's storage is freed, under the write lock.
    fn destruct(&self, _nd: &Arc<Nd>, _address: Address) -> NdResult<()> {
        Ok(())
    }

    /// Returns true if no owner still refers to the record.
    ///
    /// Only consulted for [`DeletionSemantics::ReferenceCounted`] types.
    fn is_ready_for_deletion(&self, _nd: &Arc<Nd>, _address: Address) -> NdResult<bool> {
        Ok(false)
    }
}

/// A registered node type.
#[derive(Clone)]
pub(crate) struct RegisteredType {
    pub(crate) tag: TypeTag,
    pub(crate) type_name: &'static str,
    pub(crate) type_id: TypeId,
    pub(crate) factory: Arc<dyn TypeFactory>,
}

impl fmt::Debug for RegisteredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredType")
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .field("record_size", &self.factory.record_size())
            .finish()
    }
}

/// Maps type tags to factories and node types to tags.
#[derive(Debug, Default)]
pub struct NodeTypeRegistry {
    by_tag: HashMap<TypeTag, RegisteredType>,
    by_type: HashMap<TypeId, TypeTag>,
}

impl NodeTypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `tag` with node type `T` and its factory.
    ///
    /// Each tag and each node type can be registered once.
    pub fn register<T: NodeType>(&mut self, tag: u16, factory: impl TypeFactory) -> NdResult<()> {
        let tag = TypeTag::new(tag);
        if let Some(existing) = self.by_tag.get(&tag) {
            return Err(NdError::invalid_argument(format!(
                "type tag {tag} is already registered to {}",
                existing.type_name
            )));
        }
        let type_id = TypeId::of::<T>();
        if self.by_type.contains_key(&type_id) {
            return Err(NdError::invalid_argument(format!(
                "{} is already registered",
                T::TYPE_NAME
            )));
        }
        if factory.record_size() < NODE_TYPE_SIZE {
            return Err(NdError::invalid_argument(format!(
                "{} records must have room for the type tag",
                T::TYPE_NAME
            )));
        }

        self.by_type.insert(type_id, tag);
        self.by_tag.insert(
            tag,
            RegisteredType {
                tag,
                type_name: T::TYPE_NAME,
                type_id,
                factory: Arc::new(factory),
            },
        );
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T: NodeType>(mut self, tag: u16, factory: impl TypeFactory) -> NdResult<Self> {
        self.register::<T>(tag, factory)?;
        Ok(self)
    }

    /// Returns the tag assigned to node type `T`.
    pub fn type_for<T: NodeType>(&self) -> Option<TypeTag> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Returns true if `type_id` belongs to a registered node type.
    pub fn is_node_type(&self, type_id: TypeId) -> bool {
        self.by_type.contains_key(&type_id)
    }

    /// Returns the factory registered for `tag`.
    pub fn factory(&self, tag: TypeTag) -> Option<&dyn TypeFactory> {
        self.by_tag.get(&tag).map(|t| t.factory.as_ref())
    }

    /// Returns the type name registered for `tag`.
    pub fn type_name(&self, tag: TypeTag) -> Option<&'static str> {
        self.by_tag.get(&tag).map(|t| t.type_name)
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    /// Looks up `tag`, reporting an unregistered tag as corruption of the
    /// record at `address`.
    pub(crate) fn resolve(
        &self,
        nd: &Nd,
        address: Address,
        tag: TypeTag,
    ) -> NdResult<&RegisteredType> {
        self.by_tag.get(&tag).ok_or_else(|| {
            ProblemBuilder::new(nd)
                .add_field_problem(&NODE_TYPE, address)
                .build_error(
                    ErrorCode::UnregisteredType,
                    format!("unregistered node type {tag} at address {address}"),
                )
        })
    }

    /// Constructs an untyped handle for the record at `address` whose tag
    /// is `tag`.
    pub fn create_node(&self, nd: &Arc<Nd>, address: Address, tag: TypeTag) -> NdResult<Node> {
        self.resolve(nd, address, tag)?;
        Ok(Node::new(Arc::clone(nd), address))
    }
}
