//! # Write Transactions
//!
//! One [`WriteHandle`] exists per store at a time (fail-fast: a second
//! `begin_write` while one is active is `ConcurrentWrite`, it never
//! blocks). The handle owns the provisional next revision root and the
//! [`TransactionIntentLog`] holding every page the transaction touched.
//!
//! ## Copy-on-Write Descent
//!
//! `put`/`remove` descend the indirect tree toward the record's bucket.
//! At each level the child reference is brought into the intent log first:
//!
//! - reference already stamped with a log slot → reuse the working copy,
//! - reference into an older revision → resolve the committed page, clone
//!   it for the new revision, register the clone,
//! - reference never allocated → create a fresh indirect or key/value
//!   page and register it.
//!
//! Because every ancestor on the path is containerized before its child,
//! re-linking the child happens inside the ancestor's working copy; the
//! committed tree is never modified and everything off the touched path
//! keeps being shared with prior revisions.
//!
//! Record keys beyond the currently addressable key space grow the tree:
//! a fresh indirect page becomes the new root with the old root as its
//! digit-0 child, once per missing level.
//!
//! ## Commit
//!
//! Depth-first over the log: children are serialized and appended before
//! their parents so every parent frames final child locations; the data
//! file is synced, then the new revision root page is appended, synced and
//! published through the revision index. Publication is the single atomic
//! step; a crash anywhere before it leaves the store at the previous
//! revision with only unreferenced frames as garbage. Abort (explicit or
//! by drop) discards the log without any storage write.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use eyre::{Result, WrapErr};

use crate::page::{IndirectPage, KeyValuePage, Page, PageKind, PageReference, RevisionRootPage};
use crate::record::Record;
use crate::storage::{write_frame, PageAddress, RevisionEntry};
use crate::store::StoreInner;
use crate::txn::read::resolve_committed;
use crate::txn::{PageContainer, TransactionIntentLog};

/// Where a descent currently stands: inside the intent log, or on a
/// committed page.
enum Cursor {
    Logged(u32),
    Committed(Arc<Page>),
}

pub struct WriteHandle {
    inner: Arc<StoreInner>,
    log: TransactionIntentLog,
    root: RevisionRootPage,
    finished: bool,
}

impl std::fmt::Debug for WriteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteHandle")
            .field("revision", &self.root.revision())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl WriteHandle {
    /// Begin on top of the latest committed revision. The store's writer
    /// latch must already be held for this handle.
    pub(crate) fn new(inner: Arc<StoreInner>, previous: &RevisionRootPage) -> Self {
        Self {
            inner,
            log: TransactionIntentLog::new(),
            root: previous.next_revision(),
            finished: false,
        }
    }

    /// Begin the very first transaction of a fresh store, committing as
    /// revision 0.
    pub(crate) fn bootstrap(inner: Arc<StoreInner>) -> Self {
        Self {
            inner,
            log: TransactionIntentLog::new(),
            root: RevisionRootPage::new_empty(0),
            finished: false,
        }
    }

    /// Revision this transaction will commit as.
    pub fn revision(&self) -> u64 {
        self.root.revision()
    }

    /// Read back through the transaction's own uncommitted state: pages in
    /// the intent log shadow their committed versions.
    pub fn get_record(&self, key: u64) -> Result<Option<Record>> {
        let page_key = self.inner.config.page_key_for(key);
        let exponent = self.inner.config.fanout_exponent();
        if !self.root.covers_page_key(page_key, exponent) {
            return Ok(None);
        }
        if self.root.root_ref().is_null() {
            return Ok(None);
        }

        let mask = (self.inner.config.fanout - 1) as u64;
        let mut cursor = self.cursor_for(self.root.root_ref())?;

        for level in (0..self.root.height()).rev() {
            let digit = ((page_key >> (level * exponent)) & mask) as usize;
            let child = match &cursor {
                Cursor::Logged(slot) => self
                    .log
                    .container(*slot)?
                    .modified()
                    .as_indirect()?
                    .child(digit)
                    .cloned(),
                Cursor::Committed(page) => page.as_indirect()?.child(digit).cloned(),
            };
            let Some(child) = child else {
                return Ok(None);
            };
            if child.is_null() {
                return Ok(None);
            }
            cursor = self.cursor_for(&child)?;
        }

        match cursor {
            Cursor::Logged(slot) => Ok(self
                .log
                .container(slot)?
                .modified()
                .as_key_value()?
                .get(key)
                .cloned()),
            Cursor::Committed(page) => Ok(page.as_key_value()?.get(key).cloned()),
        }
    }

    /// Store `record` under `key` in the new revision.
    pub fn put_record(&mut self, key: u64, record: Record) -> Result<()> {
        let slot = self
            .prepare_record_page(key)
            .wrap_err_with(|| format!("preparing bucket for record key {key}"))?;
        let bucket_size = self.inner.config.bucket_size;
        let page = self
            .log
            .container_mut(slot)?
            .modified_mut()
            .as_key_value_mut()?;
        debug_assert!(
            key >= page.base_key() && key - page.base_key() < bucket_size,
            "key {key} outside bucket at base {}",
            page.base_key()
        );
        page.put(key, record);
        self.root.note_record_key(key);
        Ok(())
    }

    /// Remove the record under `key`, returning it. A miss prepares
    /// nothing and leaves the tree untouched.
    pub fn remove_record(&mut self, key: u64) -> Result<Option<Record>> {
        if self.get_record(key)?.is_none() {
            return Ok(None);
        }
        let slot = self.prepare_record_page(key)?;
        Ok(self
            .log
            .container_mut(slot)?
            .modified_mut()
            .as_key_value_mut()?
            .remove(key))
    }

    /// Materialize the initial empty tree of a fresh store: root indirect
    /// page plus the empty bucket-0 key/value page.
    pub(crate) fn materialize_initial_tree(&mut self) -> Result<()> {
        self.prepare_record_page(0).map(|_| ())
    }

    /// Commit: persist the touched pages, then publish the new root.
    /// Returns the committed revision number.
    pub fn commit(mut self) -> Result<u64> {
        let inner = Arc::clone(&self.inner);
        let revision = self.root.revision();

        let mut root_ref = std::mem::replace(self.root.root_ref_mut(), PageReference::null());
        self.persist_reference(&mut root_ref)
            .wrap_err_with(|| format!("persisting pages of revision {revision}"))?;
        *self.root.root_ref_mut() = root_ref;

        // Pages must be durable before the root that references them.
        inner.pages.sync()?;

        self.root.set_commit_timestamp_ms(now_ms());
        let root = std::mem::replace(&mut self.root, RevisionRootPage::new_empty(0));
        let root_page = Page::RevisionRoot(root);

        let mut body = Vec::new();
        root_page.serialize(&inner.config, &mut body)?;
        let (offset, len) = write_frame(inner.pages.as_ref(), &body)?;
        inner.pages.sync()?;

        // Publication: the one atomic step that makes the revision exist.
        inner
            .revisions
            .publish(RevisionEntry::new(revision, offset, len))?;

        let root_page = Arc::new(root_page);
        inner
            .cache
            .insert(PageAddress(offset), Arc::clone(&root_page));
        let root = Arc::new(root_page.as_revision_root()?.clone());
        *inner.latest_root.write() = root;

        self.log.seal_committed();
        self.finished = true;
        inner.writer_active.store(false, Ordering::Release);
        Ok(revision)
    }

    /// Abort: discard the intent log; no storage write happens.
    pub fn abort(mut self) {
        self.release_aborted();
    }

    fn release_aborted(&mut self) {
        if self.finished {
            return;
        }
        self.log.clear_aborted();
        self.finished = true;
        self.inner.writer_active.store(false, Ordering::Release);
    }

    fn cursor_for(&self, reference: &PageReference) -> Result<Cursor> {
        match reference.log_slot() {
            Some(slot) => Ok(Cursor::Logged(slot)),
            None => Ok(Cursor::Committed(resolve_committed(
                &self.inner,
                reference,
            )?)),
        }
    }

    /// Containerize the whole path down to the bucket of `record_key`,
    /// returning the slot of its key/value page's container.
    fn prepare_record_page(&mut self, record_key: u64) -> Result<u32> {
        let config = self.inner.config.clone();
        let page_key = config.page_key_for(record_key);
        let exponent = config.fanout_exponent();
        let mask = (config.fanout - 1) as u64;
        let revision = self.root.revision();

        self.grow_to_cover(page_key)?;

        // Containerize the root level first.
        let mut slot = match self.root.root_ref().log_slot() {
            Some(slot) => slot,
            None => {
                let container = if self.root.root_ref().is_null() {
                    PageContainer::from_fresh(Page::Indirect(IndirectPage::new(
                        revision,
                        config.fanout,
                    )))
                } else {
                    let committed = resolve_committed(&self.inner, self.root.root_ref())?;
                    PageContainer::from_committed(committed, revision)?
                };
                let slot = self.log.register(container)?;
                self.root.root_ref_mut().set_log_slot(slot);
                slot
            }
        };

        for level in (0..self.root.height()).rev() {
            let digit = ((page_key >> (level * exponent)) & mask) as usize;

            let child_state = {
                let indirect = self.log.container(slot)?.modified().as_indirect()?;
                indirect.child(digit).cloned()
            };

            let child_slot = match child_state {
                Some(child) if child.log_slot().is_some() => {
                    child.log_slot().unwrap() // INVARIANT: checked by the guard
                }
                Some(child) if !child.is_null() => {
                    let committed = resolve_committed(&self.inner, &child)?;
                    let container = PageContainer::from_committed(committed, revision)?;
                    self.log.register(container)?
                }
                _ => {
                    let page = if level == 0 {
                        Page::KeyValue(KeyValuePage::new(
                            page_key * config.bucket_size,
                            PageKind::Records,
                            revision,
                            config.leaf_strategy,
                        ))
                    } else {
                        Page::Indirect(IndirectPage::new(revision, config.fanout))
                    };
                    self.log.register(PageContainer::from_fresh(page))?
                }
            };

            {
                let indirect = self
                    .log
                    .container_mut(slot)?
                    .modified_mut()
                    .as_indirect_mut()?;
                let child = indirect.child_or_insert(digit, PageReference::null());
                if level == 0 {
                    child.set_page_key(page_key as i64);
                }
                child.set_log_slot(child_slot);
            }

            slot = child_slot;
        }

        Ok(slot)
    }

    /// Add levels above the root until `page_key` is addressable. The old
    /// root subtree becomes the digit-0 child of each new level.
    fn grow_to_cover(&mut self, page_key: u64) -> Result<()> {
        let exponent = self.inner.config.fanout_exponent();
        let fanout = self.inner.config.fanout;
        let revision = self.root.revision();

        while !self.root.covers_page_key(page_key, exponent) {
            let old_root = std::mem::replace(self.root.root_ref_mut(), PageReference::null());

            let mut lifted = IndirectPage::new(revision, fanout);
            if !old_root.is_null() {
                *lifted.child_or_insert(0, PageReference::null()) = old_root;
            }

            let slot = self
                .log
                .register(PageContainer::from_fresh(Page::Indirect(lifted)))?;
            self.root.root_ref_mut().set_log_slot(slot);
            self.root.set_height(self.root.height() + 1);
        }
        Ok(())
    }

    /// Depth-first persistence of one reference's subtree: children first
    /// so the parent serializes final locations, then the parent's frame,
    /// stamping `reference` with where it landed.
    fn persist_reference(&mut self, reference: &mut PageReference) -> Result<()> {
        let Some(slot) = reference.log_slot() else {
            return Ok(()); // untouched subtree, shared with prior revisions
        };

        let mut page = self.log.container_mut(slot)?.take_modified();

        if let Page::Indirect(indirect) = &mut page {
            for offset in indirect.child_offsets() {
                let child = indirect
                    .child_mut(offset)
                    .ok_or_else(|| eyre::eyre!("present child offset {offset} vanished"))?;
                self.persist_reference(child)?;
            }
        }

        let mut body = Vec::new();
        page.serialize(&self.inner.config, &mut body)?;
        let (frame_offset, len) = write_frame(self.inner.pages.as_ref(), &body)?;

        // The cached copy must match a deserialized read of the frame.
        if let Page::KeyValue(kv) = &mut page {
            kv.set_dirty(false);
        }

        reference.set_location(frame_offset, len);
        reference.clear_log_slot();
        reference.clear_cached_page();

        self.inner
            .cache
            .insert(PageAddress(frame_offset), Arc::new(page));
        Ok(())
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        // An un-committed handle aborts; the latch is always released.
        self.release_aborted();
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
