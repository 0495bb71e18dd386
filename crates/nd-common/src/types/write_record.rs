//! Description of a single logged write.

use std::fmt;

use super::{Address, WriteNumber};

/// A write captured by the storage modification log.
///
/// Records describe the byte range touched, the operation that was in
/// progress and the write transaction it belonged to. They are attached to
/// corruption reports so that the last writer of a broken range is known
/// without a debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Monotonic sequence number of the write within this process.
    pub sequence: u64,
    /// First byte written.
    pub address: Address,
    /// Number of bytes written.
    pub size: u64,
    /// Write transaction that was open at the time.
    pub write_number: WriteNumber,
    /// Operation tag active at the time, if any.
    pub operation: Option<&'static str>,
}

impl fmt::Display for WriteRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "write #{} of {} bytes at {} during transaction {}",
            self.sequence, self.size, self.address, self.write_number
        )?;
        if let Some(op) = self.operation {
            write!(f, " ({op})")?;
        }
        Ok(())
    }
}
