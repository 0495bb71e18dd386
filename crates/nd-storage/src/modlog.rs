//! Modification log for corruption forensics.
//!
//! The log keeps a bounded ring of the most recent writes. When a record is
//! found to be corrupt, the session asks the log which write last touched the
//! damaged range and attaches the answer to the error.

use std::collections::VecDeque;

use nd_common::types::{Address, WriteNumber, WriteRecord};

/// Bounded history of writes to the store.
#[derive(Debug)]
pub struct ModificationLog {
    /// Retained writes, oldest first.
    entries: VecDeque<WriteRecord>,
    /// Maximum number of retained writes. 0 disables logging.
    capacity: usize,
    /// Sequence number for the next write.
    next_sequence: u64,
    /// Stack of nested operation tags.
    operations: Vec<&'static str>,
}

impl ModificationLog {
    /// Creates a log retaining at most `capacity` writes.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            next_sequence: 0,
            operations: Vec::new(),
        }
    }

    /// Returns true if writes are being recorded.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Returns the number of retained writes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no writes are retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Marks the start of a tagged operation. Tags nest.
    pub fn start_operation(&mut self, tag: &'static str) {
        self.operations.push(tag);
    }

    /// Ends the innermost tagged operation.
    pub fn end_operation(&mut self) {
        self.operations.pop();
    }

    /// Returns the innermost active operation tag.
    pub fn current_operation(&self) -> Option<&'static str> {
        self.operations.last().copied()
    }

    /// Records a write of `size` bytes at `address`.
    pub fn record(&mut self, address: Address, size: u64, write_number: WriteNumber) {
        if !self.is_enabled() {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let record = WriteRecord {
            sequence: self.next_sequence,
            address,
            size,
            write_number,
            operation: self.current_operation(),
        };
        self.next_sequence += 1;
        self.entries.push_back(record);
    }

    /// Returns the most recent retained write overlapping `[address, address + size)`.
    pub fn report_for(&self, address: Address, size: u64) -> Option<WriteRecord> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.address.overlaps(entry.size, address, size.max(1)))
            .cloned()
    }

    /// Drops all retained writes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
