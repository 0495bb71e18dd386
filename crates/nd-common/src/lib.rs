//! # nd-common
//!
//! Common types, errors, and configuration for the Nd index database.
//!
//! This crate provides the foundational types shared by the storage layer
//! and the session core:
//!
//! - **Types**: `Address`, `TypeTag`, `WriteNumber` and `WriteRecord`
//! - **Errors**: Unified error handling with `NdError` and `IndexException`
//! - **Config**: `NdConfig`
//! - **Constants**: Header layout and allocator limits
//!
//! ## Example
//!
//! ```rust
//! use nd_common::types::Address;
//! use nd_common::error::{NdError, NdResult};
//!
//! fn check(addr: Address) -> NdResult<()> {
//!     if addr.is_null() {
//!         return Err(NdError::InvalidAddress { address: addr });
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use constants::*;
pub use config::NdConfig;
pub use error::{NdError, NdResult};
pub use types::{Address, TypeTag, WriteNumber, WriteRecord};
