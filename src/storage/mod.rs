//! # Storage Layer
//!
//! Append-only persistence for the versioned page engine. Committed pages
//! are immutable, so the data file is never rewritten in place: commit
//! appends the new frames, then publishes the revision by appending one
//! entry to the revision index. Readers of any committed revision resolve
//! pages by `(offset, len)` and never race the writer.
//!
//! ## File Layout
//!
//! ```text
//! store_dir/
//! ├── store.pages       # StoreHeader (64B) + checksummed page frames
//! └── store.revisions   # fixed 32-byte entries, one per revision
//! ```
//!
//! Page frame: `[body_len: u32 LE][crc64: u64 LE][page bytes]`. The CRC is
//! CRC-64/ECMA-182 over the body; a mismatch on read is `Corruption`.
//!
//! Revision index entry N lives at byte `N * 32`, so `open(n)` is one
//! positioned read and "latest" is the last entry. Publication of a
//! revision is exactly the append of its entry, after the data file has
//! been synced (pages become durable before the root that references
//! them).
//!
//! ## Module Organization
//!
//! - `backend`: copy-based [`StorageBackend`] trait with file and
//!   in-memory implementations
//! - `frame`: checksummed page frame encode/decode
//! - `header`: zerocopy store header persisting the trie shape
//! - `revisions`: the revision index
//! - `cache`: sharded read-through cache of committed pages

mod backend;
mod cache;
mod frame;
mod header;
mod revisions;

pub use backend::{FileStorage, MemoryStorage, StorageBackend};
pub use cache::{PageAddress, PageCache};
pub use frame::{read_frame, write_frame};
pub use header::StoreHeader;
pub use revisions::{RevisionEntry, RevisionIndex};

/// File names inside a store directory.
pub const PAGES_FILE: &str = "store.pages";
pub const REVISIONS_FILE: &str = "store.revisions";
