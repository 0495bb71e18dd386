//! Shared node types for the integration tests.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nd_common::config::NdConfig;
use nd_common::error::NdResult;
use nd_common::types::Address;
use nd_core::{
    DeletionSemantics, Field, Nd, Node, NodeType, NodeTypeRegistry, TypeFactory, NODE_TYPE,
};
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// Tag of [`FileNode`].
pub const FILE_TAG: u16 = 1;
/// Tag of [`TypeNode`].
pub const TYPE_TAG: u16 = 2;

pub const FILE_HASH: Field = NODE_TYPE.next("hash", 8);
pub const FILE_FIRST_TYPE: Field = FILE_HASH.next("first_type", 8);

pub const TYPE_REFS: Field = NODE_TYPE.next("refs", 4);
pub const TYPE_NEXT: Field = TYPE_REFS.next("next", 8);

/// An explicitly deleted node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode(Node);

impl NodeType for FileNode {
    const TYPE_NAME: &'static str = "FileNode";

    fn from_node(node: Node) -> Self {
        Self(node)
    }

    fn node(&self) -> &Node {
        &self.0
    }
}

/// A node deleted once its reference count drops to zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNode(Node);

impl NodeType for TypeNode {
    const TYPE_NAME: &'static str = "TypeNode";

    fn from_node(node: Node) -> Self {
        Self(node)
    }

    fn node(&self) -> &Node {
        &self.0
    }
}

/// Counts destructor calls per type.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub files_destructed: Arc<AtomicUsize>,
    pub types_destructed: Arc<AtomicUsize>,
}

impl Counters {
    pub fn files(&self) -> usize {
        self.files_destructed.load(Ordering::SeqCst)
    }

    pub fn types(&self) -> usize {
        self.types_destructed.load(Ordering::SeqCst)
    }
}

struct FileFactory(Counters);

impl TypeFactory for FileFactory {
    fn record_size(&self) -> u64 {
        FILE_FIRST_TYPE.end()
    }

    fn destruct(&self, _nd: &Arc<Nd>, _address: Address) -> NdResult<()> {
        self.0.files_destructed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct TypeFactoryImpl(Counters);

impl TypeFactory for TypeFactoryImpl {
    fn record_size(&self) -> u64 {
        TYPE_NEXT.end()
    }

    fn deletion_semantics(&self) -> DeletionSemantics {
        DeletionSemantics::ReferenceCounted
    }

    fn destruct(&self, _nd: &Arc<Nd>, _address: Address) -> NdResult<()> {
        self.0.types_destructed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready_for_deletion(&self, nd: &Arc<Nd>, address: Address) -> NdResult<bool> {
        let refs = nd.database().get_int(TYPE_REFS.address_in(address))?;
        Ok(refs == 0)
    }
}

/// Builds the registry for both node types.
pub fn registry(counters: &Counters) -> Arc<NodeTypeRegistry> {
    let registry = NodeTypeRegistry::new()
        .with::<FileNode>(FILE_TAG, FileFactory(counters.clone()))
        .expect("register FileNode")
        .with::<TypeNode>(TYPE_TAG, TypeFactoryImpl(counters.clone()))
        .expect("register TypeNode");
    Arc::new(registry)
}

/// Opens an in-memory session with the test types registered.
pub fn memory_session() -> (Arc<Nd>, Counters) {
    memory_session_with(NdConfig::for_testing())
}

/// Opens an in-memory session with `config`.
pub fn memory_session_with(config: NdConfig) -> (Arc<Nd>, Counters) {
    let counters = Counters::default();
    let nd = Nd::open_memory(config, registry(&counters)).expect("open session");
    (nd, counters)
}

/// Collects formatted log output in memory.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Runs `f` with a subscriber that writes WARN and above into `self`.
    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
