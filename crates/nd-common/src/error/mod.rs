//! Error handling for the Nd database.
//!
//! This module provides a unified error type and result alias used by the
//! storage layer and the session core.

mod database;
mod index;

pub use database::{ErrorCode, NdError};
pub use index::{IndexException, RelatedAddress};

/// Result type alias for Nd operations.
pub type NdResult<T> = std::result::Result<T, NdError>;
