//! Database error types.

use std::fmt;
use thiserror::Error;

use super::index::IndexException;
use crate::types::Address;

/// Error codes for categorizing errors.
///
/// These codes are stable across versions and can be used for programmatic
/// error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid configuration.
    InvalidConfig = 0x0002,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,

    // I/O errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,
    /// The database file is already open in this process.
    AlreadyOpen = 0x0101,

    // Storage errors (0x0200 - 0x02FF)
    /// Address outside the allocated store.
    OutOfBounds = 0x0200,
    /// Address does not refer to an allocated block.
    InvalidAddress = 0x0201,
    /// Requested block exceeds the chunk size.
    AllocationTooLarge = 0x0202,
    /// Block freed twice.
    DoubleFree = 0x0203,

    // Index errors (0x0300 - 0x03FF)
    /// Index data is corrupted.
    Corruption = 0x0300,
    /// Stored type tag has no registered factory.
    UnregisteredType = 0x0301,
    /// Stored type does not match the requested one.
    TypeMismatch = 0x0302,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "I/O",
            0x02 => "Storage",
            0x03 => "Index",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for the Nd database.
#[derive(Debug, Error)]
pub enum NdError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The file is already held open by another database instance.
    #[error("database file {path} is already open")]
    AlreadyOpen {
        /// Path of the file.
        path: String,
    },

    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    /// Access outside the store.
    #[error("access of {size} bytes at {address} is outside the store ({store_size} bytes)")]
    OutOfBounds {
        /// First byte accessed.
        address: Address,
        /// Number of bytes accessed.
        size: u64,
        /// Current size of the store.
        store_size: u64,
    },

    /// Address does not point at an allocated block.
    #[error("address {address} is not an allocated block")]
    InvalidAddress {
        /// The offending address.
        address: Address,
    },

    /// Allocation request larger than a chunk.
    #[error("allocation of {size} bytes exceeds maximum {max_size}")]
    AllocationTooLarge {
        /// Requested size.
        size: u64,
        /// Largest size the allocator can serve.
        max_size: u64,
    },

    /// Block freed twice.
    #[error("block at {address} is already free")]
    DoubleFree {
        /// The block address.
        address: Address,
    },

    // ==========================================================================
    // Index Errors
    // ==========================================================================
    /// Data corruption detected.
    #[error("data corruption detected: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// Corruption with a full diagnostic payload.
    #[error("{0}")]
    Index(Box<IndexException>),
}

impl NdError {
    /// Returns the error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Io { .. } => ErrorCode::Io,
            Self::AlreadyOpen { .. } => ErrorCode::AlreadyOpen,
            Self::OutOfBounds { .. } => ErrorCode::OutOfBounds,
            Self::InvalidAddress { .. } => ErrorCode::InvalidAddress,
            Self::AllocationTooLarge { .. } => ErrorCode::AllocationTooLarge,
            Self::DoubleFree { .. } => ErrorCode::DoubleFree,
            Self::Corruption { .. } => ErrorCode::Corruption,
            Self::Index(exception) => exception.code(),
        }
    }

    /// Returns true if this error means the index can no longer be trusted.
    ///
    /// Fatal errors abort the current operation and are never retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::Corruption
                | ErrorCode::UnregisteredType
                | ErrorCode::TypeMismatch
                | ErrorCode::InvalidAddress
                | ErrorCode::DoubleFree
        )
    }

    /// Returns the attached diagnostic payload, if any.
    #[must_use]
    pub fn index_exception(&self) -> Option<&IndexException> {
        match self {
            Self::Index(exception) => Some(exception),
            _ => None,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    #[must_use]
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }
}

impl From<IndexException> for NdError {
    fn from(exception: IndexException) -> Self {
        Self::Index(Box::new(exception))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = NdError::InvalidAddress {
            address: Address::new(64),
        };
        assert_eq!(err.code(), ErrorCode::InvalidAddress);
        assert_eq!(err.code().category(), "Storage");
    }

    #[test]
    fn test_error_display() {
        let err = NdError::OutOfBounds {
            address: Address::new(0x40),
            size: 8,
            store_size: 64,
        };
        assert_eq!(
            err.to_string(),
            "access of 8 bytes at 0x40 is outside the store (64 bytes)"
        );
    }

    #[test]
    fn test_fatal() {
        assert!(NdError::corruption("bad tag").is_fatal());
        assert!(NdError::DoubleFree {
            address: Address::new(8)
        }
        .is_fatal());
        assert!(!NdError::invalid_argument("pointer target").is_fatal());
        assert!(!NdError::invalid_config("chunk_size").is_fatal());
    }

    #[test]
    fn test_index_exception_code_passes_through() {
        let exception = IndexException::new(ErrorCode::TypeMismatch, "wrong type");
        let err: NdError = exception.into();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
        assert!(err.is_fatal());
        assert!(err.index_exception().is_some());
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: NdError = io_err.into();
        assert_eq!(err.code(), ErrorCode::Io);
    }
}
