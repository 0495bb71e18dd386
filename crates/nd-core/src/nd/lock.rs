//! Reader/writer lock of the session.
//!
//! Many readers or one writer. Readers never wait for each other, only for
//! a writer that holds the lock. The writer is reentrant and may also take
//! read locks on its own thread. A thread that only holds a read lock can
//! never acquire the write lock: two such threads would wait for each other
//! forever.
//!
//! Ownership is tracked per thread, so the guards are not `Send`.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use tracing::{debug, error};

use nd_common::error::NdResult;

use super::Nd;

/// Who holds the session lock.
#[derive(Debug, Default)]
pub(crate) struct LockState {
    /// Read hold count per thread. Threads with no holds have no entry.
    readers: HashMap<ThreadId, usize>,
    writer: Option<ThreadId>,
    write_holds: usize,
}

impl LockState {
    fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }

    pub(crate) fn holds_read(&self, thread: ThreadId) -> bool {
        self.readers.contains_key(&thread)
    }

    pub(crate) fn holds_write(&self, thread: ThreadId) -> bool {
        self.writer == Some(thread)
    }
}

/// A held read lock. Released on drop.
#[must_use = "the read lock is released when the guard is dropped"]
pub struct NdReadGuard {
    nd: Arc<Nd>,
    released: bool,
    _not_send: PhantomData<*const ()>,
}

impl NdReadGuard {
    /// Returns the locked session.
    pub fn nd(&self) -> &Arc<Nd> {
        &self.nd
    }

    /// Releases the lock now.
    pub fn release(mut self) {
        self.released = true;
        self.nd.release_read_lock();
    }
}

impl Drop for NdReadGuard {
    fn drop(&mut self) {
        if !self.released {
            self.nd.release_read_lock();
        }
    }
}

impl std::fmt::Debug for NdReadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdReadGuard")
            .field("released", &self.released)
            .finish()
    }
}

/// A held write lock. Released on drop.
///
/// Dropping the outermost guard runs deferred deletions and bumps the write
/// number; errors from that work are logged. Call
/// [`release`](Self::release) to observe them instead.
#[must_use = "the write lock is released when the guard is dropped"]
pub struct NdWriteGuard {
    nd: Arc<Nd>,
    released: bool,
    _not_send: PhantomData<*const ()>,
}

impl NdWriteGuard {
    /// Returns the locked session.
    pub fn nd(&self) -> &Arc<Nd> {
        &self.nd
    }

    /// Releases the lock now, reporting any error from the unlock work.
    pub fn release(mut self) -> NdResult<()> {
        self.released = true;
        self.nd.release_write_lock()
    }
}

impl Drop for NdWriteGuard {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.nd.release_write_lock() {
                error!(error = %e, "Write unlock failed");
            }
        }
    }
}

impl std::fmt::Debug for NdWriteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdWriteGuard")
            .field("released", &self.released)
            .finish()
    }
}

impl Nd {
    /// Blocks until no other thread holds the write lock, then takes a read
    /// lock.
    ///
    /// Succeeds immediately on the thread that holds the write lock. A
    /// writer that is only waiting does not hold readers back.
    pub fn acquire_read_lock(self: &Arc<Self>) -> NdReadGuard {
        let me = thread::current().id();
        let mut state = self.lock.lock();
        if !state.holds_write(me) {
            while state.writer.is_some() {
                self.lock_released.wait(&mut state);
            }
        }
        *state.readers.entry(me).or_insert(0) += 1;
        self.db.set_locked(true);
        drop(state);

        NdReadGuard {
            nd: Arc::clone(self),
            released: false,
            _not_send: PhantomData,
        }
    }

    /// Blocks until no other thread holds any lock, then takes the write
    /// lock. Reentrant.
    ///
    /// # Panics
    ///
    /// Panics if the session is read-only, or if the calling thread holds a
    /// read lock without the write lock.
    pub fn acquire_write_lock(self: &Arc<Self>) -> NdWriteGuard {
        assert!(
            !self.config.read_only,
            "write lock requested on a read-only database"
        );
        let me = thread::current().id();
        let mut state = self.lock.lock();
        if state.holds_write(me) {
            state.write_holds += 1;
        } else {
            assert!(
                !state.holds_read(me),
                "write lock requested by a thread holding a read lock"
            );
            while !state.is_free() {
                self.lock_released.wait(&mut state);
            }
            state.writer = Some(me);
            state.write_holds = 1;
            self.db.set_locked(true);
            self.db.set_exclusive_lock();
            drop(state);

            debug!("Acquired write lock");
        }

        NdWriteGuard {
            nd: Arc::clone(self),
            released: false,
            _not_send: PhantomData,
        }
    }

    /// Drops one read hold of the calling thread and empties the result
    /// cache.
    fn release_read_lock(&self) {
        let me = thread::current().id();
        let mut state = self.lock.lock();
        let Some(holds) = state.readers.get_mut(&me) else {
            panic!("read lock released by a thread that does not hold it");
        };
        *holds -= 1;
        if *holds == 0 {
            state.readers.remove(&me);
        }
        // The storage flag only changes under the state mutex.
        if state.is_free() {
            self.db.set_locked(false);
        }
        drop(state);

        self.cache.clear();
        self.lock_released.notify_all();
    }

    /// Drops one write hold. The outermost release flushes deferred
    /// deletions, bumps the write number, empties the cache, gives up
    /// exclusivity and notifies change listeners.
    fn release_write_lock(self: &Arc<Self>) -> NdResult<()> {
        let me = thread::current().id();
        {
            let mut state = self.lock.lock();
            assert!(
                state.holds_write(me),
                "write lock released by a thread that does not hold it"
            );
            if state.write_holds > 1 {
                state.write_holds -= 1;
                return Ok(());
            }
        }

        // Still exclusive: destructors run with the write lock held.
        let deleted = self.process_deletions();
        let bumped = self
            .db
            .write_number()
            .and_then(|n| self.db.set_write_number(n.next()).map(|()| n.next()));
        self.cache.clear();
        let event = {
            let mut pending = self.change_event.lock();
            (!pending.is_empty()).then(|| std::mem::take(&mut *pending))
        };
        let flushed = self
            .db
            .give_up_exclusive_lock(self.config.flush_on_write_unlock);

        {
            let mut state = self.lock.lock();
            state.writer = None;
            state.write_holds = 0;
            if state.is_free() {
                self.db.set_locked(false);
            }
        }
        self.lock_released.notify_all();

        if let Ok(write_number) = &bumped {
            debug!(write_number = write_number.as_u64(), "Released write lock");
        }
        if let Some(event) = event {
            self.notify_listeners(&event);
        }

        deleted.and(bumped.map(|_| ())).and(flushed)
    }

    /// Returns true if the calling thread holds a read lock.
    pub fn holds_read_lock(&self) -> bool {
        self.lock.lock().holds_read(thread::current().id())
    }

    /// Returns true if the calling thread holds the write lock.
    pub fn holds_write_lock(&self) -> bool {
        self.lock.lock().holds_write(thread::current().id())
    }

    /// Panics if lock assertions are on and the calling thread holds no lock.
    pub(crate) fn assert_readable(&self) {
        if self.config.lock_assertions {
            let me = thread::current().id();
            let state = self.lock.lock();
            assert!(
                state.holds_read(me) || state.holds_write(me),
                "node read without holding a lock"
            );
        }
    }

    /// Panics if lock assertions are on and the calling thread does not hold
    /// the write lock.
    pub(crate) fn assert_writable(&self) {
        if self.config.lock_assertions {
            let held = self.lock.lock().holds_write(thread::current().id());
            assert!(held, "node write without holding the write lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;
    use crate::registry::NodeTypeRegistry;
    use nd_common::config::NdConfig;
    use nd_common::types::WriteNumber;

    fn session() -> Arc<Nd> {
        Nd::open_memory(NdConfig::for_testing(), Arc::new(NodeTypeRegistry::new())).unwrap()
    }

    #[test]
    fn test_read_guard_tracks_holder() {
        let nd = session();
        assert!(!nd.holds_read_lock());
        {
            let _outer = nd.acquire_read_lock();
            let inner = nd.acquire_read_lock();
            assert!(nd.holds_read_lock());
            assert!(nd.database().is_locked());
            inner.release();
            assert!(nd.holds_read_lock());
        }
        assert!(!nd.holds_read_lock());
        assert!(!nd.database().is_locked());
    }

    #[test]
    fn test_writer_can_read() {
        let nd = session();
        let write = nd.acquire_write_lock();
        {
            let _read = nd.acquire_read_lock();
            assert!(nd.holds_read_lock());
            assert!(nd.holds_write_lock());
        }
        assert!(nd.database().is_exclusive());
        write.release().unwrap();
        assert!(!nd.database().is_exclusive());
        assert!(!nd.database().is_locked());
    }

    #[test]
    fn test_nested_release_has_no_side_effects() {
        let nd = session();
        let outer = nd.acquire_write_lock();
        let inner = nd.acquire_write_lock();
        inner.release().unwrap();

        assert!(nd.holds_write_lock());
        assert_eq!(nd.write_number().unwrap(), WriteNumber::new(0));

        outer.release().unwrap();
        assert!(!nd.holds_write_lock());
        assert_eq!(nd.write_number().unwrap(), WriteNumber::new(1));
    }

    #[test]
    fn test_writer_waits_for_reader() {
        let nd = session();
        let read = nd.acquire_read_lock();

        let (tx, rx) = mpsc::channel();
        let writer = {
            let nd = Arc::clone(&nd);
            thread::spawn(move || {
                let guard = nd.acquire_write_lock();
                tx.send(()).unwrap();
                guard.release().unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        read.release();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        writer.join().unwrap();
        assert_eq!(nd.write_number().unwrap(), WriteNumber::new(1));
    }

    #[test]
    #[should_panic(expected = "thread holding a read lock")]
    fn test_upgrade_panics() {
        let nd = session();
        let _read = nd.acquire_read_lock();
        let _write = nd.acquire_write_lock();
    }

    #[test]
    #[should_panic(expected = "node write without holding the write lock")]
    fn test_write_assertion() {
        let nd = session();
        let _read = nd.acquire_read_lock();
        nd.assert_writable();
    }

    #[test]
    fn test_assertions_disabled() {
        let config = NdConfig::for_testing().with_lock_assertions(false);
        let nd = Nd::open_memory(config, Arc::new(NodeTypeRegistry::new())).unwrap();
        nd.assert_readable();
        nd.assert_writable();
    }
}
