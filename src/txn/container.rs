//! # Page Containers
//!
//! While a write transaction is in flight, every touched page exists in
//! two forms at once: the *complete* page, which is the committed state
//! readers of earlier revisions keep resolving, and the *modified* page the
//! writer mutates. A [`PageContainer`] pairs the two for one page reference.
//!
//! `complete` is never mutated after the container is created; it stays
//! shared behind its `Arc` with the read cache and any open readers. On
//! commit the serialized `modified` page becomes the page future readers
//! resolve; on abort the container is dropped and `complete` remains the
//! only version in existence.

use std::sync::Arc;

use eyre::Result;

use crate::page::Page;

#[derive(Debug)]
pub struct PageContainer {
    complete: Arc<Page>,
    modified: Page,
}

impl PageContainer {
    /// Container for a page that already exists in a committed revision:
    /// `modified` starts as a copy-on-write clone tagged with the new
    /// revision.
    pub fn from_committed(complete: Arc<Page>, revision: u64) -> Result<Self> {
        let modified = complete.clone_for_revision(revision)?;
        Ok(Self { complete, modified })
    }

    /// Container for a page created inside this transaction; there is no
    /// prior committed state, so both sides start from the fresh page.
    pub fn from_fresh(page: Page) -> Self {
        Self {
            complete: Arc::new(page.clone()),
            modified: page,
        }
    }

    pub fn complete(&self) -> &Arc<Page> {
        &self.complete
    }

    pub fn modified(&self) -> &Page {
        &self.modified
    }

    pub fn modified_mut(&mut self) -> &mut Page {
        &mut self.modified
    }

    /// Move the working copy out (commit path), leaving a tombstone.
    pub fn take_modified(&mut self) -> Page {
        std::mem::replace(
            &mut self.modified,
            Page::RevisionRoot(crate::page::RevisionRootPage::new_empty(0)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LeafStrategy;
    use crate::page::{KeyValuePage, PageKind};
    use crate::record::Record;

    fn committed_page() -> Arc<Page> {
        let mut kv = KeyValuePage::new(0, PageKind::Records, 1, LeafStrategy::Ordered);
        kv.put(3, Record::new(b"committed".to_vec()));
        kv.set_dirty(false);
        Arc::new(Page::KeyValue(kv))
    }

    #[test]
    fn modifying_the_working_copy_leaves_complete_untouched() {
        let complete = committed_page();
        let mut container = PageContainer::from_committed(Arc::clone(&complete), 2).unwrap();

        container
            .modified_mut()
            .as_key_value_mut()
            .unwrap()
            .put(3, Record::new(b"changed".to_vec()));

        assert_eq!(
            container.complete().as_key_value().unwrap().get(3).unwrap().payload,
            b"committed"
        );
        assert_eq!(
            container.modified().as_key_value().unwrap().get(3).unwrap().payload,
            b"changed"
        );
        // The committed Arc is the very same instance readers hold.
        assert!(Arc::ptr_eq(container.complete(), &complete));
    }

    #[test]
    fn cow_clone_carries_the_new_revision() {
        let container = PageContainer::from_committed(committed_page(), 5).unwrap();
        assert_eq!(container.complete().revision(), 1);
        assert_eq!(container.modified().revision(), 5);
    }

    #[test]
    fn fresh_container_starts_from_the_same_state() {
        let page = Page::KeyValue(KeyValuePage::new(
            0,
            PageKind::Records,
            1,
            LeafStrategy::Unordered,
        ));
        let container = PageContainer::from_fresh(page.clone());
        assert_eq!(container.modified(), &page);
        assert_eq!(container.complete().as_ref(), &page);
    }

    #[test]
    fn take_modified_moves_the_working_copy_out() {
        let mut container = PageContainer::from_committed(committed_page(), 2).unwrap();
        let page = container.take_modified();
        assert_eq!(page.revision(), 2);
        assert_eq!(container.complete().revision(), 1);
    }
}
