//! Corruption report assembly.
//!
//! [`ProblemBuilder`] collects the address ranges implicated in a problem,
//! looks up the last logged write for each one, and packages them into an
//! [`IndexException`]:
//!
//! ```rust,ignore
//! return Err(ProblemBuilder::new(&nd)
//!     .add_field_problem(&PARENT, address)
//!     .add_problem_address("child list", list, 16)
//!     .corruption_error("child points at a deleted parent"));
//! ```

use nd_common::error::{ErrorCode, IndexException, NdError, RelatedAddress};
use nd_common::types::Address;
use nd_storage::Database;

use crate::field::Field;
use crate::nd::Nd;

/// Accumulates related addresses for an [`IndexException`].
#[derive(Debug)]
pub struct ProblemBuilder<'a> {
    db: &'a Database,
    related: Vec<RelatedAddress>,
}

impl<'a> ProblemBuilder<'a> {
    /// Starts an empty report against `nd`'s modification log.
    pub fn new(nd: &'a Nd) -> Self {
        Self {
            db: nd.database(),
            related: Vec::new(),
        }
    }

    /// Records the range `[address, address + size)` and its last writer.
    pub fn add_problem_address(
        &mut self,
        description: impl Into<String>,
        address: Address,
        size: u64,
    ) -> &mut Self {
        self.related.push(RelatedAddress {
            description: description.into(),
            address,
            size,
            last_write: self.db.report_for(address, size),
        });
        self
    }

    /// Records `field` within the record at `record`.
    pub fn add_field_problem(&mut self, field: &Field, record: Address) -> &mut Self {
        self.add_problem_address(field.name(), field.address_in(record), field.size())
    }

    /// Returns the number of recorded ranges.
    pub fn len(&self) -> usize {
        self.related.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.related.is_empty()
    }

    /// Builds the exception carrying every recorded range.
    pub fn build(&self, code: ErrorCode, message: impl Into<String>) -> IndexException {
        let mut exception = IndexException::new(code, message);
        self.attach_to(&mut exception);
        exception
    }

    /// [`build`](Self::build) wrapped in an [`NdError`].
    pub fn build_error(&self, code: ErrorCode, message: impl Into<String>) -> NdError {
        self.build(code, message).into()
    }

    /// Builds a generic corruption error.
    pub fn corruption_error(&self, message: impl Into<String>) -> NdError {
        self.build_error(ErrorCode::Corruption, message)
    }

    /// Appends the recorded ranges to an existing exception.
    pub fn attach_to(&self, exception: &mut IndexException) {
        for related in &self.related {
            exception.add_related(related.clone());
        }
    }
}
