//! System-wide constants for the Nd database.
//!
//! Header offsets are part of the persisted format. Changing any of them
//! requires a new schema version.

// =============================================================================
// Header Layout
// =============================================================================

/// Offset of the schema version (u32).
pub const VERSION_OFFSET: u64 = 0;

/// Offset of the file magic (u32).
pub const MAGIC_OFFSET: u64 = 4;

/// File magic, "NDDB" in little-endian byte order.
pub const MAGIC: u32 = u32::from_le_bytes(*b"NDDB");

/// Offset of the write-generation counter (u64).
pub const WRITE_NUMBER_OFFSET: u64 = 8;

/// Offset of the first never-allocated byte (u64).
pub const END_OFFSET: u64 = 16;

/// Offset of the free-list heads (one u64 per size class).
pub const FREE_LIST_OFFSET: u64 = 24;

/// Size of the reserved header region. Nothing is allocated below it.
pub const HEADER_SIZE: u64 = 1024;

// =============================================================================
// Allocator Constants
// =============================================================================

/// Every block and block payload is aligned to this many bytes.
pub const BLOCK_ALIGNMENT: u64 = 8;

/// Bytes preceding each block payload: payload size (u32) and state (u32).
pub const BLOCK_HEADER_SIZE: u64 = 8;

/// Largest payload served from an exact-size free list.
///
/// Larger payloads share a single first-fit list.
pub const MAX_SMALL_BLOCK: u64 = 512;

/// Number of exact-size free lists.
pub const SMALL_SIZE_CLASSES: u64 = MAX_SMALL_BLOCK / BLOCK_ALIGNMENT;

/// Index of the free list shared by large blocks.
pub const LARGE_SIZE_CLASS: u64 = SMALL_SIZE_CLASSES;

/// Size in bytes of a stored address.
pub const POINTER_SIZE: u64 = 8;

// =============================================================================
// Chunk Constants
// =============================================================================

/// Default chunk size (64 KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Minimum chunk size (4 KB).
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

// =============================================================================
// Node Layout
// =============================================================================

/// Offset of the type tag within every node record.
pub const NODE_TYPE_OFFSET: u64 = 0;

/// Size of the type tag.
pub const NODE_TYPE_SIZE: u64 = 2;

// =============================================================================
// Diagnostics
// =============================================================================

/// Default number of writes retained by the modification log.
pub const DEFAULT_MODIFICATION_LOG_CAPACITY: usize = 4096;
