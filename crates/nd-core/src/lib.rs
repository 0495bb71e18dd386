//! # nd-core
//!
//! Session core of the Nd index database.
//!
//! Records in the store are addressed by integer offset and start with a
//! two-byte type tag. This crate turns those raw records into typed nodes and
//! coordinates access to them:
//!
//! - **Registry**: maps type tags to [`TypeFactory`] implementations
//! - **Nodes**: the [`Node`] handle, the [`NodeType`] trait and [`Field`] layouts
//! - **Session**: [`Nd`], with its reentrant reader/writer lock, result cache
//!   and deferred deletion queue
//! - **References**: [`Pointer`] for plain values, [`DatabaseRef`] for
//!   references held across write transactions
//! - **Diagnostics**: [`ProblemBuilder`] for corruption reports
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use nd_common::config::NdConfig;
//! use nd_core::{Field, Nd, Node, NodeType, NodeTypeRegistry, TypeFactory, NODE_TYPE};
//!
//! const SIZE: Field = NODE_TYPE.next("size", 8);
//!
//! struct Blob(Node);
//!
//! impl NodeType for Blob {
//!     const TYPE_NAME: &'static str = "Blob";
//!     fn from_node(node: Node) -> Self { Self(node) }
//!     fn node(&self) -> &Node { &self.0 }
//! }
//!
//! struct BlobFactory;
//!
//! impl TypeFactory for BlobFactory {
//!     fn record_size(&self) -> u64 { SIZE.end() }
//! }
//!
//! let registry = NodeTypeRegistry::new().with::<Blob>(1, BlobFactory).unwrap();
//! let nd = Nd::open_memory(NdConfig::for_testing(), Arc::new(registry)).unwrap();
//!
//! let address = {
//!     let _write = nd.acquire_write_lock();
//!     let blob = nd.create::<Blob>().unwrap();
//!     blob.node().put_long(&SIZE, 1024).unwrap();
//!     blob.address()
//! };
//!
//! let _read = nd.acquire_read_lock();
//! let blob = nd.load::<Blob>(address).unwrap().unwrap();
//! assert_eq!(blob.node().get_long(&SIZE).unwrap(), 1024);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change_event;
pub mod db_ref;
pub mod field;
pub mod nd;
pub mod node;
pub mod pointer;
pub mod problem;
pub mod registry;

pub use change_event::ChangeEvent;
pub use db_ref::DatabaseRef;
pub use field::Field;
pub use nd::{CacheKey, CacheStats, Nd, NdReadGuard, NdWriteGuard};
pub use node::{Node, NodeType, NODE_TYPE};
pub use pointer::{Pointer, PointerTarget};
pub use problem::ProblemBuilder;
pub use registry::{DeletionSemantics, NodeTypeRegistry, TypeFactory};
