//! References that survive write transactions.
//!
//! A raw address held across an unlock may be freed and reused by the next
//! writer. A [`DatabaseRef`] instead remembers how to find its target and
//! the write number it last found it at. While no write transaction has
//! completed since, [`get`](DatabaseRef::get) returns the remembered value
//! without touching storage; otherwise it searches again.

use std::fmt;
use std::sync::Arc;

use nd_common::error::NdResult;
use nd_common::types::WriteNumber;

use crate::nd::{Nd, NdReadGuard};

type Search<T> = Box<dyn FnMut(&Arc<Nd>) -> NdResult<Option<T>> + Send>;

/// A self-revalidating reference.
pub struct DatabaseRef<T> {
    nd: Arc<Nd>,
    search: Search<T>,
    cached: Option<(WriteNumber, Option<T>)>,
}

impl<T: Clone> DatabaseRef<T> {
    /// Creates a reference located by `search`. Nothing is searched until
    /// the first [`get`](Self::get).
    pub fn new(
        nd: Arc<Nd>,
        search: impl FnMut(&Arc<Nd>) -> NdResult<Option<T>> + Send + 'static,
    ) -> Self {
        Self {
            nd,
            search: Box::new(search),
            cached: None,
        }
    }

    /// Returns the target, searching again if any write transaction
    /// completed since the last search.
    ///
    /// The caller must hold a lock on the session.
    pub fn get(&mut self) -> NdResult<Option<T>> {
        let current = self.nd.write_number()?;
        if let Some((found_at, value)) = &self.cached {
            if *found_at == current {
                return Ok(value.clone());
            }
        }
        let value = (self.search)(&self.nd)?;
        self.cached = Some((current, value.clone()));
        Ok(value)
    }

    /// Forgets the remembered value.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Takes a read lock on the session.
    pub fn lock(&self) -> NdReadGuard {
        self.nd.acquire_read_lock()
    }

    /// Returns the session.
    pub fn nd(&self) -> &Arc<Nd> {
        &self.nd
    }
}

impl<T> fmt::Debug for DatabaseRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseRef")
            .field("found_at", &self.cached.as_ref().map(|(n, _)| *n))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::registry::NodeTypeRegistry;
    use nd_common::config::NdConfig;

    #[test]
    fn test_invalidate_forces_search() {
        let nd =
            Nd::open_memory(NdConfig::for_testing(), Arc::new(NodeTypeRegistry::new())).unwrap();
        let searches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&searches);
        let mut reference = DatabaseRef::new(Arc::clone(&nd), move |_| {
            Ok(Some(counter.fetch_add(1, Ordering::SeqCst)))
        });

        let _lock = reference.lock();
        assert_eq!(reference.get().unwrap(), Some(0));
        assert_eq!(reference.get().unwrap(), Some(0));
        reference.invalidate();
        assert_eq!(reference.get().unwrap(), Some(1));
        assert_eq!(searches.load(Ordering::SeqCst), 2);
    }
}
