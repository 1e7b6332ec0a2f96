//! # Read Transactions
//!
//! A [`ReadHandle`] is bound to exactly one committed revision root and
//! resolves pages through committed state only: the reference's own cached
//! page, then the shared read cache, then the data file. It never consults
//! any write transaction's intent log, so a reader can never observe the
//! partially built copies of an in-progress writer: isolation falls out
//! of the resolution path, not out of locking.
//!
//! Any number of read handles, across any mix of revisions, may run
//! concurrently; committed pages are immutable and the read cache only
//! ever inserts immutable entries.

use std::sync::Arc;

use eyre::{Result, WrapErr};

use crate::error::StorageError;
use crate::page::{Page, PageReference, RevisionRootPage};
use crate::record::Record;
use crate::storage::{read_frame, PageAddress};
use crate::store::StoreInner;

/// Resolve a reference against committed state: cached page, shared read
/// cache, then the data file.
pub(crate) fn resolve_committed(
    inner: &StoreInner,
    reference: &PageReference,
) -> Result<Arc<Page>> {
    if let Some(page) = reference.cached_page() {
        return Ok(Arc::clone(page));
    }

    let Some((offset, len)) = reference.location() else {
        return Err(StorageError::InvalidReference).wrap_err_with(|| {
            format!(
                "resolving reference with logical key {}",
                reference.page_key()
            )
        });
    };

    if let Some(page) = inner.cache.get(PageAddress(offset)) {
        return Ok(page);
    }

    let body = read_frame(inner.pages.as_ref(), offset, len)?;
    let page = Arc::new(Page::deserialize(&body, &inner.config)?);
    inner.cache.insert(PageAddress(offset), Arc::clone(&page));
    Ok(page)
}

/// Walk the indirect tree below `root` down to the key/value page of
/// `page_key`. `None` if any reference on the path was never allocated.
pub(crate) fn descend_committed(
    inner: &StoreInner,
    root: &RevisionRootPage,
    page_key: u64,
) -> Result<Option<Arc<Page>>> {
    let exponent = inner.config.fanout_exponent();
    if !root.covers_page_key(page_key, exponent) {
        return Ok(None);
    }
    if root.root_ref().is_null() {
        return Ok(None);
    }

    let mask = (inner.config.fanout - 1) as u64;
    let mut page = resolve_committed(inner, root.root_ref())?;

    for level in (0..root.height()).rev() {
        let digit = ((page_key >> (level * exponent)) & mask) as usize;
        let next = {
            let indirect = page.as_indirect()?;
            match indirect.child(digit) {
                None => return Ok(None),
                Some(child) if child.is_null() => return Ok(None),
                Some(child) => resolve_committed(inner, child)?,
            }
        };
        page = next;
    }

    page.as_key_value()
        .wrap_err_with(|| format!("leaf of bucket {page_key}"))?;
    Ok(Some(page))
}

/// Read transaction over one committed revision.
pub struct ReadHandle {
    inner: Arc<StoreInner>,
    root: Arc<RevisionRootPage>,
}

impl std::fmt::Debug for ReadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadHandle")
            .field("revision", &self.root.revision())
            .finish_non_exhaustive()
    }
}

impl ReadHandle {
    pub(crate) fn new(inner: Arc<StoreInner>, root: Arc<RevisionRootPage>) -> Self {
        Self { inner, root }
    }

    /// Revision this handle reads.
    pub fn revision(&self) -> u64 {
        self.root.revision()
    }

    /// Highest record key ever assigned up to this revision.
    pub fn max_record_key(&self) -> u64 {
        self.root.max_record_key()
    }

    pub fn commit_timestamp_ms(&self) -> u64 {
        self.root.commit_timestamp_ms()
    }

    /// The record stored under `key` in this revision, if any.
    pub fn get_record(&self, key: u64) -> Result<Option<Record>> {
        let page_key = self.inner.config.page_key_for(key);
        let Some(page) = self.get_page(page_key)? else {
            return Ok(None);
        };
        Ok(page.as_key_value()?.get(key).cloned())
    }

    /// The key/value page of bucket `page_key` in this revision, if that
    /// bucket was ever materialized.
    pub fn get_page(&self, page_key: u64) -> Result<Option<Arc<Page>>> {
        descend_committed(&self.inner, &self.root, page_key).wrap_err_with(|| {
            format!(
                "reading bucket {page_key} in revision {}",
                self.root.revision()
            )
        })
    }
}
