//! # nd-storage
//!
//! Storage layer for the Nd index database.
//!
//! The store is a single growable file addressed by byte offset:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ chunk 0                                                          │
//! │ ┌──────────────────────────────┐ ┌─────┬─────────┬─────┬───────┐ │
//! │ │ header: version, magic,      │ │ blk │ payload │ blk │ ...   │ │
//! │ │ write number, end, free lists│ │ hdr │         │ hdr │       │ │
//! │ └──────────────────────────────┘ └─────┴─────────┴─────┴───────┘ │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ chunk 1 ...                                                      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Database**: `malloc`/`free`, typed get/put, header access, flushing
//! - **Allocator**: exact-size free lists plus a first-fit list for large blocks
//! - **ModificationLog**: bounded history of writes for corruption reports

#![warn(missing_docs)]
#![warn(clippy::all)]

mod allocator;
mod chunk;
mod database;
mod modlog;
mod open_files;
mod store;

pub use database::Database;
pub use modlog::ModificationLog;
