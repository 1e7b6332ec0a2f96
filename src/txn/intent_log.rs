//! # Transaction Intent Log
//!
//! The staging area of exactly one in-flight write transaction: every page
//! reference the writer has materialized or modified in the new revision
//! is registered here, paired with its [`PageContainer`]. The log is an
//! explicit context object owned by the write handle, never ambient state;
//! readers of committed revisions cannot reach it.
//!
//! Containers live in a slot vector and the owning [`PageReference`] is
//! stamped with its slot, so a reference resolves into the log in O(1)
//! without hashing. Slots are append-only while the transaction runs.
//!
//! ## State Machine
//!
//! ```text
//! ┌───────┐ register() ┌────────┐ seal_committed() ┌───────────┐
//! │ Empty │ ─────────> │ Active │ ───────────────> │ Committed │
//! └───────┘            └────────┘                  └───────────┘
//!                           │
//!                           │ clear_aborted()
//!                           v
//!                      ┌─────────┐
//!                      └ Aborted ┘
//! ```
//!
//! Abort is a pure discard: slots are dropped without any storage write.
//! Commit drains the slots after the pages have been persisted. Either
//! way no container survives the transaction.

use eyre::{ensure, Result};

use crate::page::PageReference;
use crate::txn::PageContainer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogState {
    #[default]
    Empty,
    Active,
    Committed,
    Aborted,
}

#[derive(Debug, Default)]
pub struct TransactionIntentLog {
    slots: Vec<PageContainer>,
    state: LogState,
}

impl TransactionIntentLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LogState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Register a container, returning the slot to stamp into the owning
    /// reference. First registration moves the log to `Active`.
    pub fn register(&mut self, container: PageContainer) -> Result<u32> {
        ensure!(
            matches!(self.state, LogState::Empty | LogState::Active),
            "intent log is {:?}, no further registrations",
            self.state
        );
        self.state = LogState::Active;
        self.slots.push(container);
        Ok(self.slots.len() as u32 - 1)
    }

    pub fn container(&self, slot: u32) -> Result<&PageContainer> {
        self.slots
            .get(slot as usize)
            .ok_or_else(|| eyre::eyre!("intent log has no slot {slot}"))
    }

    pub fn container_mut(&mut self, slot: u32) -> Result<&mut PageContainer> {
        self.slots
            .get_mut(slot as usize)
            .ok_or_else(|| eyre::eyre!("intent log has no slot {slot}"))
    }

    /// Container registered for `reference`, if the reference was touched
    /// by this transaction.
    pub fn container_for(&self, reference: &PageReference) -> Option<&PageContainer> {
        reference
            .log_slot()
            .and_then(|slot| self.slots.get(slot as usize))
    }

    /// Abort: drop every container without touching persistent storage.
    pub fn clear_aborted(&mut self) {
        self.slots.clear();
        self.state = LogState::Aborted;
    }

    /// Commit epilogue, after all pages were persisted and published.
    pub fn seal_committed(&mut self) {
        self.slots.clear();
        self.state = LogState::Committed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LeafStrategy;
    use crate::page::{KeyValuePage, Page, PageKind};

    fn container() -> PageContainer {
        PageContainer::from_fresh(Page::KeyValue(KeyValuePage::new(
            0,
            PageKind::Records,
            1,
            LeafStrategy::Unordered,
        )))
    }

    #[test]
    fn starts_empty_and_activates_on_first_register() {
        let mut log = TransactionIntentLog::new();
        assert_eq!(log.state(), LogState::Empty);
        assert!(log.is_empty());

        let slot = log.register(container()).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(log.state(), LogState::Active);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn slots_are_dense_and_addressable() {
        let mut log = TransactionIntentLog::new();
        let a = log.register(container()).unwrap();
        let b = log.register(container()).unwrap();
        assert_eq!((a, b), (0, 1));
        assert!(log.container(a).is_ok());
        assert!(log.container(b).is_ok());
        assert!(log.container(9).is_err());
    }

    #[test]
    fn container_for_follows_the_reference_stamp() {
        let mut log = TransactionIntentLog::new();
        let slot = log.register(container()).unwrap();

        let mut stamped = PageReference::with_page_key(0);
        stamped.set_log_slot(slot);
        assert!(log.container_for(&stamped).is_some());

        let unstamped = PageReference::with_page_key(0);
        assert!(log.container_for(&unstamped).is_none());
    }

    #[test]
    fn abort_discards_everything() {
        let mut log = TransactionIntentLog::new();
        log.register(container()).unwrap();
        log.register(container()).unwrap();

        log.clear_aborted();
        assert_eq!(log.state(), LogState::Aborted);
        assert!(log.is_empty());
        assert!(log.register(container()).is_err());
    }

    #[test]
    fn sealed_log_accepts_no_registrations() {
        let mut log = TransactionIntentLog::new();
        log.register(container()).unwrap();
        log.seal_committed();
        assert_eq!(log.state(), LogState::Committed);
        let err = log.register(container()).unwrap_err();
        assert!(err.to_string().contains("Committed"));
    }
}
