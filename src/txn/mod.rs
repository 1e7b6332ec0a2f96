//! # Transaction Layer
//!
//! Read and write transactions over the versioned page tree:
//!
//! - [`ReadHandle`]: bound to one committed revision, lock-free, any
//!   number may run concurrently
//! - [`WriteHandle`]: the single active writer, owning the provisional
//!   next revision root and the [`TransactionIntentLog`]
//! - [`PageContainer`]: the original/working-copy pair of one touched page
//! - [`TransactionIntentLog`]: the copy-on-write staging area, discarded
//!   on abort and drained on commit
//!
//! ## Module Organization
//!
//! - `container`: complete/modified page pairs
//! - `intent_log`: the per-transaction staging log and its state machine
//! - `read`: committed-state resolution and read handles
//! - `write`: copy-on-write descent, tree growth, commit and abort

mod container;
mod intent_log;
pub(crate) mod read;
mod write;

pub use container::PageContainer;
pub use intent_log::{LogState, TransactionIntentLog};
pub use read::ReadHandle;
pub use write::WriteHandle;
