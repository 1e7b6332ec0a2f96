//! # StrataDB - Versioned Page Storage Engine
//!
//! StrataDB is the storage core of a temporal, tree-structured database:
//! every committed change produces a new immutable revision while
//! unchanged pages stay physically shared with all prior revisions. The
//! engine provides:
//!
//! - **Append-only persistence**: committed pages are never rewritten;
//!   commit appends frames and publishes one revision index entry
//! - **Copy-on-write revisions**: a writer duplicates only the pages on
//!   the touched paths; everything else is shared by reference
//! - **Sub-linear lookup**: a fan-out trie maps logical page keys to
//!   physical frames per revision, growing levels on demand
//! - **Lock-free readers**: any number of read transactions over any mix
//!   of committed revisions, with a single active writer
//!
//! ## Quick Start
//!
//! ```ignore
//! use stratadb::{Record, ResourceConfig, Store};
//!
//! let store = Store::create("./mystore".as_ref(), ResourceConfig::new())?;
//!
//! let mut txn = store.begin_write()?;
//! txn.put_record(5, Record::new(b"hello".to_vec()))?;
//! let revision = txn.commit()?;
//!
//! let reader = store.begin_read(revision)?;
//! assert!(reader.get_record(5)?.is_some());
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │           Store (resource, latch)        │
//! ├─────────────────────┬────────────────────┤
//! │     ReadHandle      │    WriteHandle     │
//! │  (committed state)  │  (intent log, COW) │
//! ├─────────────────────┴────────────────────┤
//! │   Page Trie (indirect / key-value pages) │
//! ├──────────────────────────────────────────┤
//! │  Read Cache │ Page Frames │ Revision Idx │
//! ├──────────────────────────────────────────┤
//! │      StorageBackend (file / memory)      │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Revision Model
//!
//! Revision numbers are dense and start at 0 (the empty tree committed at
//! store creation). `commit()` always returns `previous_latest + 1`;
//! `open`-ing any `0 <= n <= latest` revision succeeds forever; this
//! engine never deletes revisions.

pub mod config;
pub mod encoding;
pub mod error;
pub mod page;
pub mod record;
pub mod storage;
pub mod store;
pub mod txn;

pub use config::{LeafStrategy, ResourceConfig};
pub use error::{is_storage_error, StorageError};
pub use page::{IndirectPage, KeyValuePage, Page, PageKind, PageReference, RevisionRootPage};
pub use record::{CodecContext, PlainCodec, Record, RecordCodec};
pub use store::Store;
pub use txn::{LogState, PageContainer, ReadHandle, TransactionIntentLog, WriteHandle};
