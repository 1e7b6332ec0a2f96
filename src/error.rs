//! # Error Taxonomy
//!
//! Typed failures of the storage engine. Callers that branch on a failure
//! mode match on [`StorageError`]; everything else travels as
//! `eyre::Report` with context attached at each layer, so a surfaced error
//! reads as a trail ("opening store at ..." -> "reading root page of
//! revision 3" -> "checksum mismatch").
//!
//! The typed variants convert into `eyre::Report` via `std::error::Error`,
//! and [`is_storage_error`] recovers them from a report's chain regardless
//! of how much context was wrapped around them.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// A page reference with neither a cached page, a log slot, nor a
    /// durable location was asked to resolve.
    #[error("page reference holds no page, no log entry and no file location")]
    InvalidReference,

    /// A referenced frame lies beyond the end of the data file.
    #[error("no page frame at offset {offset}")]
    PageNotFound { offset: u64 },

    /// On-disk bytes fail validation (checksum, length, tag or layout).
    #[error("corrupted store: {0}")]
    Corruption(String),

    /// A read was requested for a revision that was never committed.
    #[error("revision {requested} does not exist (latest is {latest})")]
    RevisionNotFound { requested: u64, latest: u64 },

    /// A write transaction is already active on this store.
    #[error("another write transaction is active")]
    ConcurrentWrite,

    /// The record codec rejected its input.
    #[error("record serialization failed: {0}")]
    Serialization(String),
}

/// True if `report`'s error chain contains a [`StorageError`] accepted by
/// `matches`.
pub fn is_storage_error(
    report: &eyre::Report,
    matches: impl Fn(&StorageError) -> bool,
) -> bool {
    report
        .chain()
        .filter_map(|cause| cause.downcast_ref::<StorageError>())
        .any(matches)
}
