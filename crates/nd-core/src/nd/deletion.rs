//! Immediate and deferred node deletion.

use std::backtrace::Backtrace;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use nd_common::error::NdResult;
use nd_common::types::{Address, TypeTag};

use crate::registry::DeletionSemantics;

use super::Nd;

/// Addresses waiting for the next write unlock, in scheduling order.
#[derive(Default)]
pub(crate) struct PendingDeletions {
    order: VecDeque<Address>,
    /// Where each pending address was scheduled from.
    sites: HashMap<Address, Backtrace>,
}

impl PendingDeletions {
    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    fn pop(&mut self) -> Option<Address> {
        let address = self.order.pop_front()?;
        self.sites.remove(&address);
        Some(address)
    }

    fn cancel(&mut self, address: Address) -> bool {
        if self.sites.remove(&address).is_none() {
            return false;
        }
        self.order.retain(|&pending| pending != address);
        true
    }
}

impl fmt::Debug for PendingDeletions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.order).finish()
    }
}

impl Nd {
    /// Destructs and frees the record at `address` now.
    ///
    /// A pending scheduled deletion of the same address is cancelled. The
    /// null address is ignored.
    pub fn delete(self: &Arc<Self>, address: Address) -> NdResult<()> {
        if address.is_null() {
            return Ok(());
        }
        self.assert_writable();
        if self.pending.lock().cancel(address) {
            debug!(address = %address, "Cancelled scheduled deletion");
        }

        let tag = TypeTag::new(self.db.get_short(address)?);
        let registered = self.registry.resolve(self, address, tag)?;

        self.db.start_operation("delete");
        let result = registered
            .factory
            .destruct(self, address)
            .and_then(|()| self.db.free(address));
        self.db.end_operation();
        result
    }

    /// Queues `address` for deletion when the outermost write lock is
    /// released.
    ///
    /// Scheduling an address that is already queued is not an error: the
    /// duplicate is dropped and both scheduling sites are logged.
    pub fn schedule_deletion(&self, address: Address) {
        if address.is_null() {
            return;
        }
        self.assert_writable();
        let site = Backtrace::capture();
        let mut pending = self.pending.lock();
        if let Some(first) = pending.sites.get(&address) {
            warn!(
                address = %address,
                first_scheduled_at = %first,
                scheduled_again_at = %site,
                "Node scheduled for deletion twice"
            );
            return;
        }
        pending.sites.insert(address, site);
        pending.order.push_back(address);
    }

    /// Deletes the record at `address` if its type says no owner remains.
    ///
    /// Returns true if the record was deleted. Records of
    /// [`DeletionSemantics::Explicit`] types are never deleted here.
    pub fn delete_if_unreferenced(self: &Arc<Self>, address: Address) -> NdResult<bool> {
        if address.is_null() {
            return Ok(false);
        }
        let tag = TypeTag::new(self.db.get_short(address)?);
        let factory = &self.registry.resolve(self, address, tag)?.factory;
        let ready = match factory.deletion_semantics() {
            DeletionSemantics::Explicit => false,
            DeletionSemantics::ReferenceCounted => factory.is_ready_for_deletion(self, address)?,
        };
        if ready {
            self.delete(address)?;
        }
        Ok(ready)
    }

    /// Runs every queued deletion, including ones queued by destructors
    /// along the way.
    ///
    /// A failing deletion is logged and the rest still run; the first error
    /// is returned.
    pub fn process_deletions(self: &Arc<Self>) -> NdResult<()> {
        let mut first_error = None;
        let mut processed = 0usize;
        loop {
            let next = self.pending.lock().pop();
            let Some(address) = next else { break };
            processed += 1;
            if let Err(e) = self.delete_if_unreferenced(address) {
                warn!(address = %address, error = %e, "Deferred deletion failed");
                first_error.get_or_insert(e);
            }
        }
        if processed > 0 {
            debug!(count = processed, "Processed deferred deletions");
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Returns the number of queued deletions.
    pub fn pending_deletion_count(&self) -> usize {
        self.pending.lock().len()
    }
}
