//! The database handle.
//!
//! [`Database`] owns the in-memory chunk image, the backing file and the
//! modification log. All methods take `&self`: the chunk image sits behind a
//! `parking_lot::RwLock` so concurrent readers never block each other, while
//! callers are expected to serialize writers themselves (the session's write
//! lock does this).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use nd_common::config::NdConfig;
use nd_common::constants::{VERSION_OFFSET, WRITE_NUMBER_OFFSET};
use nd_common::error::NdResult;
use nd_common::types::{Address, WriteNumber, WriteRecord};

use crate::chunk::ChunkStore;
use crate::modlog::ModificationLog;
use crate::open_files::OpenFileGuard;
use crate::store::Store;

/// Backing file plus its process-wide registration.
#[derive(Debug)]
struct Backing {
    path: PathBuf,
    file: Mutex<File>,
    _registration: OpenFileGuard,
}

/// A chunked, growable store of fixed-layout records.
///
/// # Example
///
/// ```rust
/// use nd_common::config::NdConfig;
/// use nd_storage::Database;
///
/// let db = Database::open_memory(&NdConfig::for_testing()).unwrap();
/// let addr = db.malloc(16).unwrap();
/// db.put_long(addr, 42).unwrap();
/// assert_eq!(db.get_long(addr).unwrap(), 42);
/// ```
#[derive(Debug)]
pub struct Database {
    store: RwLock<Store>,
    backing: Option<Backing>,
    /// A session lock (read or write) is currently held.
    locked: AtomicBool,
    /// A writer currently has exclusive access.
    exclusive: AtomicBool,
}

impl Database {
    /// Opens the file at `path`, creating it at `current_version` if it is
    /// missing or empty.
    ///
    /// The stored version is not checked here; see [`Database::version`].
    pub fn open(path: impl AsRef<Path>, config: &NdConfig) -> NdResult<Self> {
        config.validate()?;
        let (path, mut file, registration) = Self::open_file(path.as_ref())?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let store = if bytes.is_empty() {
            Self::fresh_store(config)?
        } else {
            Store::new(
                ChunkStore::from_bytes(config.chunk_size, &bytes),
                ModificationLog::new(config.modification_log_capacity),
            )
        };

        let db = Self::with_backing(store, path, file, registration);
        info!(
            path = ?db.path(),
            size = db.size(),
            version = db.version()?,
            "Opened database"
        );
        Ok(db)
    }

    /// Creates an empty database at `path`, discarding any previous contents.
    pub fn create(path: impl AsRef<Path>, config: &NdConfig) -> NdResult<Self> {
        config.validate()?;
        let (path, file, registration) = Self::open_file(path.as_ref())?;
        file.set_len(0)?;

        let db = Self::with_backing(Self::fresh_store(config)?, path, file, registration);
        db.flush()?;
        info!(path = ?db.path(), version = config.current_version, "Created database");
        Ok(db)
    }

    /// Creates a database that lives only in memory.
    pub fn open_memory(config: &NdConfig) -> NdResult<Self> {
        config.validate()?;
        Ok(Self {
            store: RwLock::new(Self::fresh_store(config)?),
            backing: None,
            locked: AtomicBool::new(false),
            exclusive: AtomicBool::new(false),
        })
    }

    fn open_file(path: &Path) -> NdResult<(PathBuf, File, OpenFileGuard)> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let canonical = path.canonicalize()?;
        let registration = OpenFileGuard::register(&canonical)?;
        Ok((canonical, file, registration))
    }

    fn fresh_store(config: &NdConfig) -> NdResult<Store> {
        let mut store = Store::new(
            ChunkStore::new(config.chunk_size),
            ModificationLog::new(config.modification_log_capacity),
        );
        store.initialize(config.current_version)?;
        Ok(store)
    }

    fn with_backing(
        store: Store,
        path: PathBuf,
        file: File,
        registration: OpenFileGuard,
    ) -> Self {
        Self {
            store: RwLock::new(store),
            backing: Some(Backing {
                path,
                file: Mutex::new(file),
                _registration: registration,
            }),
            locked: AtomicBool::new(false),
            exclusive: AtomicBool::new(false),
        }
    }

    /// Returns the backing file path, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.backing.as_ref().map(|b| b.path.as_path())
    }

    /// Returns the size of the store in bytes.
    pub fn size(&self) -> u64 {
        self.store.read().chunks.len()
    }

    /// Returns the chunk size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.store.read().chunks.chunk_size()
    }

    // =========================================================================
    // Header
    // =========================================================================

    /// Returns the stored schema version, or 0 if the file is not an Nd database.
    pub fn version(&self) -> NdResult<u32> {
        self.store.read().version()
    }

    /// Overwrites the stored schema version.
    pub fn set_version(&self, version: u32) -> NdResult<()> {
        self.store
            .write()
            .put_u32(Address::new(VERSION_OFFSET), version)
    }

    /// Returns the persisted write-generation counter.
    pub fn write_number(&self) -> NdResult<WriteNumber> {
        self.store.read().write_number()
    }

    /// Overwrites the persisted write-generation counter.
    pub fn set_write_number(&self, n: WriteNumber) -> NdResult<()> {
        self.store
            .write()
            .put_u64(Address::new(WRITE_NUMBER_OFFSET), n.as_u64())
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocates a zeroed record of at least `size` bytes.
    ///
    /// The returned address is never 0.
    pub fn malloc(&self, size: u64) -> NdResult<Address> {
        let mut store = self.store.write();
        store.log.start_operation("malloc");
        let result = store.malloc(size);
        store.log.end_operation();
        result
    }

    /// Releases the record at `address`.
    ///
    /// Freeing a block twice is reported as `DoubleFree`.
    pub fn free(&self, address: Address) -> NdResult<()> {
        let mut store = self.store.write();
        store.log.start_operation("free");
        let result = store.free(address);
        store.log.end_operation();
        result
    }

    /// Returns the usable size of the live record at `address`.
    pub fn block_size(&self, address: Address) -> NdResult<u64> {
        self.store.read().block_size(address)
    }

    /// Largest size `malloc` accepts.
    pub fn max_malloc_size(&self) -> u64 {
        self.store.read().max_block_size()
    }

    // =========================================================================
    // Primitive access
    // =========================================================================

    /// Reads one byte.
    pub fn get_byte(&self, address: Address) -> NdResult<u8> {
        self.store.read().get_u8(address)
    }

    /// Reads a little-endian u16.
    pub fn get_short(&self, address: Address) -> NdResult<u16> {
        self.store.read().get_u16(address)
    }

    /// Reads a little-endian u32.
    pub fn get_int(&self, address: Address) -> NdResult<u32> {
        self.store.read().get_u32(address)
    }

    /// Reads a little-endian u64.
    pub fn get_long(&self, address: Address) -> NdResult<u64> {
        self.store.read().get_u64(address)
    }

    /// Reads a stored address.
    pub fn get_address(&self, address: Address) -> NdResult<Address> {
        self.get_long(address).map(Address::new)
    }

    /// Fills `buf` from `address`.
    pub fn get_bytes(&self, address: Address, buf: &mut [u8]) -> NdResult<()> {
        self.store.read().read_bytes(address, buf)
    }

    /// Writes one byte.
    pub fn put_byte(&self, address: Address, value: u8) -> NdResult<()> {
        self.store.write().put_u8(address, value)
    }

    /// Writes a little-endian u16.
    pub fn put_short(&self, address: Address, value: u16) -> NdResult<()> {
        self.store.write().put_u16(address, value)
    }

    /// Writes a little-endian u32.
    pub fn put_int(&self, address: Address, value: u32) -> NdResult<()> {
        self.store.write().put_u32(address, value)
    }

    /// Writes a little-endian u64.
    pub fn put_long(&self, address: Address, value: u64) -> NdResult<()> {
        self.store.write().put_u64(address, value)
    }

    /// Stores an address.
    pub fn put_address(&self, address: Address, value: Address) -> NdResult<()> {
        self.put_long(address, value.as_u64())
    }

    /// Writes `data` at `address`.
    pub fn put_bytes(&self, address: Address, data: &[u8]) -> NdResult<()> {
        self.store.write().write_bytes(address, data)
    }

    // =========================================================================
    // Modification log
    // =========================================================================

    /// Returns the most recent logged write overlapping the range.
    pub fn report_for(&self, address: Address, size: u64) -> Option<WriteRecord> {
        self.store.read().log.report_for(address, size)
    }

    /// Tags subsequent writes with `tag` until the matching `end_operation`.
    pub fn start_operation(&self, tag: &'static str) {
        self.store.write().log.start_operation(tag);
    }

    /// Ends the innermost tagged operation.
    pub fn end_operation(&self) {
        self.store.write().log.end_operation();
    }

    // =========================================================================
    // Locking and persistence
    // =========================================================================

    /// Records whether a session lock is held.
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::Release);
    }

    /// Returns true while a session lock is held.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Marks the start of exclusive write access.
    pub fn set_exclusive_lock(&self) {
        self.exclusive.store(true, Ordering::Release);
    }

    /// Returns true while a writer has exclusive access.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive.load(Ordering::Acquire)
    }

    /// Ends exclusive write access, persisting dirty chunks if `flush` is set.
    pub fn give_up_exclusive_lock(&self, flush: bool) -> NdResult<()> {
        let result = if flush { self.flush() } else { Ok(()) };
        self.exclusive.store(false, Ordering::Release);
        result
    }

    /// Returns true if there are changes not yet written to the file.
    pub fn is_dirty(&self) -> bool {
        self.backing.is_some() && self.store.read().chunks.is_dirty()
    }

    /// Writes dirty chunks to the backing file and syncs it.
    ///
    /// A no-op for in-memory databases.
    pub fn flush(&self) -> NdResult<()> {
        let Some(backing) = &self.backing else {
            return Ok(());
        };

        let mut store = self.store.write();
        let mut file = backing.file.lock();
        let mut written = 0usize;
        for (offset, bytes) in store.chunks.dirty_chunks() {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(bytes)?;
            written += 1;
        }
        if written > 0 {
            file.sync_data()?;
            store.chunks.mark_clean();
            debug!(path = ?backing.path, chunks = written, "Flushed database");
        }
        Ok(())
    }

    /// Flushes and closes the database.
    pub fn close(self) -> NdResult<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_common::error::NdError;
    use tempfile::TempDir;

    #[test]
    fn test_memory_database_header() {
        let config = NdConfig::for_testing().with_versions(1, 4, 4);
        let db = Database::open_memory(&config).unwrap();
        assert_eq!(db.version().unwrap(), 4);
        assert_eq!(db.write_number().unwrap(), WriteNumber::new(0));
        assert!(db.path().is_none());
        assert!(!db.is_dirty());
    }

    #[test]
    fn test_primitives() {
        let db = Database::open_memory(&NdConfig::for_testing()).unwrap();
        let addr = db.malloc(32).unwrap();

        db.put_byte(addr, 7).unwrap();
        db.put_short(addr.offset(2), 0xBEEF).unwrap();
        db.put_int(addr.offset(4), 0xDEAD_BEEF).unwrap();
        db.put_address(addr.offset(8), Address::new(0x1234)).unwrap();
        db.put_bytes(addr.offset(16), b"node").unwrap();

        assert_eq!(db.get_byte(addr).unwrap(), 7);
        assert_eq!(db.get_short(addr.offset(2)).unwrap(), 0xBEEF);
        assert_eq!(db.get_int(addr.offset(4)).unwrap(), 0xDEAD_BEEF);
        assert_eq!(db.get_address(addr.offset(8)).unwrap(), Address::new(0x1234));
        let mut buf = [0u8; 4];
        db.get_bytes(addr.offset(16), &mut buf).unwrap();
        assert_eq!(&buf, b"node");
    }

    #[test]
    fn test_report_for_tags_operation() {
        let db = Database::open_memory(&NdConfig::for_testing()).unwrap();
        let addr = db.malloc(16).unwrap();

        let report = db.report_for(addr, 16).unwrap();
        assert_eq!(report.operation, Some("malloc"));

        db.set_write_number(WriteNumber::new(9)).unwrap();
        db.start_operation("set-name");
        db.put_long(addr.offset(8), 1).unwrap();
        db.end_operation();

        let report = db.report_for(addr.offset(8), 8).unwrap();
        assert_eq!(report.operation, Some("set-name"));
        assert_eq!(report.write_number, WriteNumber::new(9));
    }

    #[test]
    fn test_persist_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.db");
        let config = NdConfig::for_testing();

        let addr = {
            let db = Database::open(&path, &config).unwrap();
            let addr = db.malloc(24).unwrap();
            db.put_long(addr, 0xCAFE).unwrap();
            db.set_write_number(WriteNumber::new(3)).unwrap();
            assert!(db.is_dirty());
            db.close().unwrap();
            addr
        };

        let db = Database::open(&path, &config).unwrap();
        assert_eq!(db.get_long(addr).unwrap(), 0xCAFE);
        assert_eq!(db.write_number().unwrap(), WriteNumber::new(3));
        assert_eq!(db.block_size(addr).unwrap(), 24);
        assert!(!db.is_dirty());
    }

    #[test]
    fn test_open_twice_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.db");
        let config = NdConfig::for_testing();

        let db = Database::open(&path, &config).unwrap();
        let err = Database::open(&path, &config).unwrap_err();
        assert!(matches!(err, NdError::AlreadyOpen { .. }));

        drop(db);
        assert!(Database::open(&path, &config).is_ok());
    }

    #[test]
    fn test_foreign_file_reports_version_zero() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("garbage.db");
        std::fs::write(&path, vec![0xAB; 2048]).unwrap();

        let db = Database::open(&path, &NdConfig::for_testing()).unwrap();
        assert_eq!(db.version().unwrap(), 0);
    }

    #[test]
    fn test_create_discards_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.db");
        let config = NdConfig::for_testing().with_versions(2, 2, 2);

        {
            let db = Database::open(&path, &config).unwrap();
            db.malloc(8).unwrap();
            db.set_write_number(WriteNumber::new(5)).unwrap();
            db.close().unwrap();
        }

        let db = Database::create(&path, &config).unwrap();
        assert_eq!(db.write_number().unwrap(), WriteNumber::new(0));
        assert_eq!(db.version().unwrap(), 2);
    }

    #[test]
    fn test_exclusive_and_locked_flags() {
        let db = Database::open_memory(&NdConfig::for_testing()).unwrap();
        db.set_locked(true);
        db.set_exclusive_lock();
        assert!(db.is_locked());
        assert!(db.is_exclusive());

        db.give_up_exclusive_lock(true).unwrap();
        db.set_locked(false);
        assert!(!db.is_exclusive());
        assert!(!db.is_locked());
    }
}
