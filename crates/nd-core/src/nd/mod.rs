//! The Nd session.
//!
//! One [`Nd`] owns one database file for the life of the process. It holds:
//!
//! - the reader/writer lock every node access happens under
//! - the result cache, emptied on every unlock
//! - the deferred-deletion queue, flushed on the outermost write unlock
//! - the pending [`ChangeEvent`] and its listeners
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use nd_common::config::NdConfig;
//! use nd_core::nd::Nd;
//! use nd_core::registry::NodeTypeRegistry;
//!
//! let nd = Nd::open_memory(NdConfig::for_testing(), Arc::new(NodeTypeRegistry::new())).unwrap();
//! let before = nd.write_number().unwrap();
//! {
//!     let _write = nd.acquire_write_lock();
//! }
//! assert_eq!(nd.write_number().unwrap(), before.next());
//! ```

mod cache;
mod deletion;
mod lock;

pub use cache::{CacheKey, CacheStats};
pub use lock::{NdReadGuard, NdWriteGuard};

use std::any::{Any, TypeId};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use nd_common::config::NdConfig;
use nd_common::error::{ErrorCode, NdError, NdResult};
use nd_common::types::{Address, TypeTag, WriteNumber};
use nd_storage::Database;

use crate::change_event::ChangeEvent;
use crate::node::{Node, NodeType, NODE_TYPE};
use crate::problem::ProblemBuilder;
use crate::registry::NodeTypeRegistry;

use self::cache::ResultCache;
use self::deletion::PendingDeletions;
use self::lock::LockState;

type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// A session over one index database.
pub struct Nd {
    db: Database,
    registry: Arc<NodeTypeRegistry>,
    config: NdConfig,
    lock: Mutex<LockState>,
    lock_released: Condvar,
    cache: ResultCache,
    pending: Mutex<PendingDeletions>,
    change_event: Mutex<ChangeEvent>,
    listeners: Mutex<Vec<Listener>>,
}

impl Nd {
    /// Opens the database at `path`.
    ///
    /// A file whose stored version lies outside
    /// `[min_version, max_version]` is deleted and recreated empty at
    /// `current_version`. There is no migration.
    pub fn open(
        path: impl AsRef<Path>,
        config: NdConfig,
        registry: Arc<NodeTypeRegistry>,
    ) -> NdResult<Arc<Self>> {
        let path = path.as_ref();
        let mut db = Database::open(path, &config)?;
        let version = db.version()?;
        if !config.supports_version(version) {
            warn!(
                path = ?path,
                version,
                min_version = config.min_version,
                max_version = config.max_version,
                current_version = config.current_version,
                "Unsupported database version, recreating"
            );
            drop(db);
            std::fs::remove_file(path)?;
            db = Database::create(path, &config)?;
            info!(path = ?path, "Recreated database");
        }
        Ok(Arc::new(Self::with_database(db, config, registry)))
    }

    /// Opens a session over a fresh in-memory database.
    pub fn open_memory(config: NdConfig, registry: Arc<NodeTypeRegistry>) -> NdResult<Arc<Self>> {
        let db = Database::open_memory(&config)?;
        Ok(Arc::new(Self::with_database(db, config, registry)))
    }

    fn with_database(db: Database, config: NdConfig, registry: Arc<NodeTypeRegistry>) -> Self {
        Self {
            db,
            registry,
            config,
            lock: Mutex::new(LockState::default()),
            lock_released: Condvar::new(),
            cache: ResultCache::default(),
            pending: Mutex::new(PendingDeletions::default()),
            change_event: Mutex::new(ChangeEvent::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Returns the underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Returns the type registry.
    pub fn registry(&self) -> &NodeTypeRegistry {
        &self.registry
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &NdConfig {
        &self.config
    }

    /// Returns true if the write lock can never be taken.
    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Returns the number of completed write transactions.
    pub fn write_number(&self) -> NdResult<WriteNumber> {
        self.db.write_number()
    }

    /// Persists dirty chunks.
    pub fn flush(&self) -> NdResult<()> {
        self.db.flush()
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Returns the tag registered for node type `T`.
    pub fn type_for<T: NodeType>(&self) -> Option<TypeTag> {
        self.registry.type_for::<T>()
    }

    /// Allocates a new record of type `T` and stamps its type tag.
    ///
    /// Requires the write lock.
    pub fn create<T: NodeType>(self: &Arc<Self>) -> NdResult<T> {
        self.assert_writable();
        let tag = self.type_for::<T>().ok_or_else(|| {
            NdError::invalid_argument(format!("{} is not a registered node type", T::TYPE_NAME))
        })?;
        let size = self
            .registry
            .factory(tag)
            .map(|factory| factory.record_size())
            .ok_or_else(|| NdError::internal(format!("no factory for type tag {tag}")))?;

        self.db.start_operation("create");
        let address = self
            .db
            .malloc(size)
            .and_then(|address| self.db.put_short(address, tag.as_u16()).map(|()| address));
        self.db.end_operation();

        Ok(T::from_node(Node::new(Arc::clone(self), address?)))
    }

    /// Loads the record at `address` as a `T`.
    ///
    /// Returns `None` for the null address. A record of another type is
    /// reported as corruption naming both types.
    pub fn load<T: NodeType>(self: &Arc<Self>, address: Address) -> NdResult<Option<T>> {
        if address.is_null() {
            return Ok(None);
        }
        self.assert_readable();
        let tag = TypeTag::new(self.db.get_short(address)?);
        let registered = self.registry.resolve(self, address, tag)?;
        if registered.type_id != TypeId::of::<T>() {
            return Err(ProblemBuilder::new(self)
                .add_field_problem(&NODE_TYPE, address)
                .build_error(
                    ErrorCode::TypeMismatch,
                    format!(
                        "expected node of type {} at address {address} but found {}",
                        T::TYPE_NAME,
                        registered.type_name
                    ),
                ));
        }
        Ok(Some(T::from_node(Node::new(Arc::clone(self), address))))
    }

    /// Loads the record at `address` without checking its type beyond
    /// registration.
    pub fn load_node(self: &Arc<Self>, address: Address) -> NdResult<Option<Node>> {
        if address.is_null() {
            return Ok(None);
        }
        self.assert_readable();
        let tag = TypeTag::new(self.db.get_short(address)?);
        self.registry.create_node(self, address, tag).map(Some)
    }

    // =========================================================================
    // Result cache
    // =========================================================================

    /// Returns the value cached under `key`, if it has type `V`.
    pub fn get_cached_result<K: CacheKey, V: Any + Send + Sync>(&self, key: &K) -> Option<Arc<V>> {
        self.cache.get(key)
    }

    /// Caches `value` under `key` until the next unlock.
    pub fn put_cached_result<K: CacheKey, V: Any + Send + Sync>(&self, key: K, value: V) -> Arc<V> {
        self.cache.put(key, value)
    }

    /// Removes the value cached under `key`. Returns true if there was one.
    pub fn remove_cached_result<K: CacheKey>(&self, key: &K) -> bool {
        self.cache.remove(key)
    }

    /// Returns the result cache counters.
    pub fn cache_stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    // =========================================================================
    // Change events
    // =========================================================================

    /// Notes that the index content for `path` was written.
    pub fn record_file_written(&self, path: impl AsRef<Path>) {
        self.assert_writable();
        self.change_event.lock().file_written(path);
    }

    /// Notes that the index content for `path` was removed.
    pub fn record_file_cleared(&self, path: impl AsRef<Path>) {
        self.assert_writable();
        self.change_event.lock().file_cleared(path);
    }

    /// Notes that the whole index was reloaded.
    pub fn mark_reloaded(&self) {
        self.assert_writable();
        self.change_event.lock().set_reloaded();
    }

    /// Notes that the whole index was emptied.
    pub fn mark_cleared(&self) {
        self.assert_writable();
        self.change_event.lock().set_cleared();
    }

    /// Registers a callback for the changes of each write transaction.
    ///
    /// Listeners run on the releasing thread after the write lock is gone.
    pub fn add_listener(&self, listener: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        self.listeners.lock().push(Arc::new(listener));
    }

    fn notify_listeners(&self, event: &ChangeEvent) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(event);
        }
    }
}

impl fmt::Debug for Nd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nd")
            .field("path", &self.db.path())
            .field("lock", &*self.lock.lock())
            .field("pending", &*self.pending.lock())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::registry::TypeFactory;

    #[derive(Debug, Clone)]
    struct Alpha(Node);

    impl NodeType for Alpha {
        const TYPE_NAME: &'static str = "Alpha";

        fn from_node(node: Node) -> Self {
            Self(node)
        }

        fn node(&self) -> &Node {
            &self.0
        }
    }

    #[derive(Debug)]
    struct Beta(Node);

    impl NodeType for Beta {
        const TYPE_NAME: &'static str = "Beta";

        fn from_node(node: Node) -> Self {
            Self(node)
        }

        fn node(&self) -> &Node {
            &self.0
        }
    }

    #[derive(Debug)]
    struct Unregistered(Node);

    impl NodeType for Unregistered {
        const TYPE_NAME: &'static str = "Unregistered";

        fn from_node(node: Node) -> Self {
            Self(node)
        }

        fn node(&self) -> &Node {
            &self.0
        }
    }

    struct FixedSize(u64);

    impl TypeFactory for FixedSize {
        fn record_size(&self) -> u64 {
            self.0
        }
    }

    fn session() -> Arc<Nd> {
        let registry = NodeTypeRegistry::new()
            .with::<Alpha>(10, FixedSize(8))
            .unwrap()
            .with::<Beta>(11, FixedSize(24))
            .unwrap();
        Nd::open_memory(NdConfig::for_testing(), Arc::new(registry)).unwrap()
    }

    #[test]
    fn test_create_and_load() {
        let nd = session();
        let write = nd.acquire_write_lock();
        let alpha = nd.create::<Alpha>().unwrap();
        assert_eq!(nd.database().block_size(alpha.address()).unwrap(), 8);
        write.release().unwrap();

        let _read = nd.acquire_read_lock();
        let loaded = nd.load::<Alpha>(alpha.address()).unwrap().unwrap();
        assert_eq!(loaded.node(), alpha.node());
        assert!(nd.load::<Alpha>(Address::NULL).unwrap().is_none());
        let node = nd.load_node(alpha.address()).unwrap().unwrap();
        assert_eq!(node.type_tag().unwrap(), TypeTag::new(10));
    }

    #[test]
    fn test_load_wrong_type() {
        let nd = session();
        let _write = nd.acquire_write_lock();
        let beta = nd.create::<Beta>().unwrap();

        let err = nd.load::<Alpha>(beta.address()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
        let message = err.to_string();
        assert!(message.contains("expected node of type Alpha"));
        assert!(message.contains("found Beta"));
        assert!(message.contains("NODE_TYPE [2 bytes"));
        assert!(message.contains("(create)"));
    }

    #[test]
    fn test_unregistered_tag_is_corruption() {
        let nd = session();
        let _write = nd.acquire_write_lock();
        let address = nd.database().malloc(8).unwrap();
        nd.database().put_short(address, 99).unwrap();

        let err = nd.load_node(address).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnregisteredType);
        assert!(err.is_fatal());
        assert_eq!(err.index_exception().unwrap().related_addresses().len(), 1);
    }

    #[test]
    fn test_create_unregistered_type() {
        let nd = session();
        let _write = nd.acquire_write_lock();
        let err = nd.create::<Unregistered>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_cache_cleared_by_write_unlock() {
        let nd = session();
        let write = nd.acquire_write_lock();
        nd.put_cached_result("answer", 42u32);
        assert_eq!(nd.get_cached_result::<_, u32>(&"answer").as_deref(), Some(&42));
        write.release().unwrap();

        assert!(nd.get_cached_result::<_, u32>(&"answer").is_none());
    }

    #[test]
    fn test_listeners_receive_event_once() {
        let nd = session();
        let calls = Arc::new(AtomicUsize::new(0));
        let written = Arc::new(Mutex::new(Vec::new()));
        {
            let calls = Arc::clone(&calls);
            let written = Arc::clone(&written);
            nd.add_listener(move |event| {
                calls.fetch_add(1, Ordering::SeqCst);
                written.lock().extend(event.written_files().iter().cloned());
            });
        }

        let write = nd.acquire_write_lock();
        nd.record_file_written("a.rs");
        nd.mark_reloaded();
        write.release().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(written.lock().len(), 1);

        // Nothing recorded, nothing delivered.
        nd.acquire_write_lock().release().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
