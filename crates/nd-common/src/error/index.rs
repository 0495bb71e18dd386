//! Self-describing corruption reports.

use std::fmt;

use super::ErrorCode;
use crate::types::{Address, WriteRecord};

/// One address range implicated in a corruption report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedAddress {
    /// What the range holds, e.g. a field name.
    pub description: String,
    /// First byte of the range.
    pub address: Address,
    /// Length of the range in bytes.
    pub size: u64,
    /// The most recent logged write touching the range.
    pub last_write: Option<WriteRecord>,
}

impl fmt::Display for RelatedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} bytes at {}]: ",
            self.description, self.size, self.address
        )?;
        match &self.last_write {
            Some(write) => write!(f, "last modified by {write}"),
            None => write!(f, "no logged writes"),
        }
    }
}

/// Diagnostic payload for corruption-class errors.
///
/// The rendered message lists every related range and its last writer, so a
/// bug report containing only the error text is enough to locate the damage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexException {
    code: ErrorCode,
    message: String,
    related: Vec<RelatedAddress>,
}

impl IndexException {
    /// Creates a report with no related addresses.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            related: Vec::new(),
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the headline message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the implicated ranges in the order they were added.
    pub fn related_addresses(&self) -> &[RelatedAddress] {
        &self.related
    }

    /// Appends an implicated range.
    pub fn add_related(&mut self, related: RelatedAddress) {
        self.related.push(related);
    }
}

impl fmt::Display for IndexException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for related in &self.related {
            write!(f, "\n  {related}")?;
        }
        Ok(())
    }
}

impl std::error::Error for IndexException {}
