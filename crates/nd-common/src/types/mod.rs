//! Type definitions for the Nd database.
//!
//! This module contains the identifier newtypes and the write record shared
//! by the storage layer and the session core.

mod ids;
mod write_record;

pub use ids::{Address, TypeTag, WriteNumber};
pub use write_record::WriteRecord;
