//! # Engine Constants
//!
//! This module centralizes the constants of the versioned page engine.
//! Interdependent values are co-located and tied together with compile-time
//! assertions so they cannot drift apart.
//!
//! ## Dependency Graph
//!
//! ```text
//! DEFAULT_FANOUT (16)
//!       │
//!       ├─> DEFAULT_FANOUT_EXPONENT (log2, digit extraction is shift/mask)
//!       │
//!       └─> SPARSE_CHILD_LIMIT (4)
//!             An indirect page starts with a sparse child list and grows
//!             to a bitmap delegate on the fifth distinct child offset.
//!             Must stay below the fan-out or growth never triggers.
//!
//! DEFAULT_BUCKET_SIZE (512)
//!       │
//!       └─> page_key = record_key / bucket_size
//!             All records of one bucket live in one key/value page; the
//!             bucket size bounds the size of the copy-on-write unit.
//!
//! STORE_HEADER_SIZE (64 bytes)
//!       │
//!       └─> First page frame of the data file begins at this offset.
//!
//! REVISION_ENTRY_SIZE (32 bytes)
//!       │
//!       └─> Revision index entries are fixed size so entry N lives at
//!           byte offset N * 32; the latest revision is the last entry.
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `DEFAULT_FANOUT` is a power of two (digits are shift/mask).
//! 2. `1 << DEFAULT_FANOUT_EXPONENT == DEFAULT_FANOUT`.
//! 3. `SPARSE_CHILD_LIMIT < DEFAULT_FANOUT`.
//! 4. `CACHE_SHARD_COUNT` is a power of two (shard pick is a mask).

/// Child references per indirect page level.
pub const DEFAULT_FANOUT: usize = 16;

/// `log2(DEFAULT_FANOUT)`; per-level digits are `(key >> (level * exp)) & mask`.
pub const DEFAULT_FANOUT_EXPONENT: u32 = 4;

/// Records per key/value page bucket.
pub const DEFAULT_BUCKET_SIZE: u64 = 512;

/// Sentinel logical key for a reference that was never allocated.
pub const NULL_PAGE_KEY: i64 = -1;

/// Sentinel file offset for a reference that was never persisted.
pub const NULL_OFFSET: u64 = u64::MAX;

/// Sparse indirect-page delegate capacity before growing to a bitmap.
pub const SPARSE_CHILD_LIMIT: usize = 4;

/// Magic bytes heading the data file.
pub const STORE_MAGIC: &[u8; 16] = b"StrataDB v1\x00\x00\x00\x00\x00";

/// On-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Fixed size of the data-file header.
pub const STORE_HEADER_SIZE: usize = 64;

/// Fixed size of one revision index entry.
pub const REVISION_ENTRY_SIZE: usize = 32;

/// Per-frame prefix in the data file: length (4) + CRC-64 (8).
pub const PAGE_FRAME_PREFIX: usize = 12;

/// Shards of the shared read cache.
pub const CACHE_SHARD_COUNT: usize = 16;

/// Default read-cache capacity in pages, spread across shards.
pub const DEFAULT_CACHE_CAPACITY: usize = 512;

const _: () = assert!(DEFAULT_FANOUT.is_power_of_two());
const _: () = assert!(1_usize << DEFAULT_FANOUT_EXPONENT == DEFAULT_FANOUT);
const _: () = assert!(SPARSE_CHILD_LIMIT < DEFAULT_FANOUT);
const _: () = assert!(CACHE_SHARD_COUNT.is_power_of_two());
const _: () = assert!(DEFAULT_CACHE_CAPACITY >= CACHE_SHARD_COUNT);
