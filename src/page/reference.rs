//! # Page References
//!
//! A [`PageReference`] is the typed handle through which every page is
//! reached: parent indirect pages hold references to their children, and
//! the revision root holds the reference to the top of the trie.
//!
//! A reference carries up to three ways of getting at its page, with a
//! strict priority during resolution:
//!
//! 1. `log_slot`: transient, set while the owning write transaction has
//!    the page registered in its intent log,
//! 2. `page`: an in-memory committed page shared behind `Arc`,
//! 3. `(offset, len)`: the persisted frame in the data file.
//!
//! Only the logical key and the location survive serialization; `log_slot`
//! and the cached page are runtime state. A reference with no key, no
//! location, no cached page and no log slot is *null*: the subtree was
//! never allocated. Dereferencing a null reference is
//! `StorageError::InvalidReference`.
//!
//! When a page is shared across revisions the reference content is cloned
//! into the copied parent, but the referenced page itself is not: clones
//! share the same `Arc`'d page and the same persisted frame.

use std::sync::Arc;

use eyre::Result;

use crate::config::{NULL_OFFSET, NULL_PAGE_KEY};
use crate::encoding::{put_varint, put_varint_i64, take_varint, take_varint_i64};
use crate::page::Page;

#[derive(Debug, Clone, Default)]
pub struct PageReference {
    page_key: i64,
    offset: u64,
    len: u32,
    log_slot: Option<u32>,
    page: Option<Arc<Page>>,
}

impl PageReference {
    /// A reference to nothing; the subtree behind it was never allocated.
    pub fn null() -> Self {
        Self {
            page_key: NULL_PAGE_KEY,
            offset: NULL_OFFSET,
            len: 0,
            log_slot: None,
            page: None,
        }
    }

    pub fn with_page_key(page_key: i64) -> Self {
        Self {
            page_key,
            ..Self::null()
        }
    }

    pub fn page_key(&self) -> i64 {
        self.page_key
    }

    pub fn set_page_key(&mut self, page_key: i64) {
        self.page_key = page_key;
    }

    /// Persisted frame of the referenced page, if it was ever committed.
    pub fn location(&self) -> Option<(u64, u32)> {
        (self.offset != NULL_OFFSET).then_some((self.offset, self.len))
    }

    pub fn set_location(&mut self, offset: u64, len: u32) {
        debug_assert!(offset != NULL_OFFSET);
        self.offset = offset;
        self.len = len;
    }

    pub fn cached_page(&self) -> Option<&Arc<Page>> {
        self.page.as_ref()
    }

    pub fn set_cached_page(&mut self, page: Arc<Page>) {
        self.page = Some(page);
    }

    pub fn clear_cached_page(&mut self) {
        self.page = None;
    }

    /// Intent-log slot while registered in an active write transaction.
    pub fn log_slot(&self) -> Option<u32> {
        self.log_slot
    }

    pub fn set_log_slot(&mut self, slot: u32) {
        self.log_slot = Some(slot);
    }

    pub fn clear_log_slot(&mut self) {
        self.log_slot = None;
    }

    /// True if nothing is behind this reference.
    pub fn is_null(&self) -> bool {
        self.page_key == NULL_PAGE_KEY
            && self.offset == NULL_OFFSET
            && self.page.is_none()
            && self.log_slot.is_none()
    }

    /// Persist the durable part of the reference: logical key and location.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        put_varint_i64(out, self.page_key);
        // Offsets shift by one so the null sentinel frames as a single 0 byte.
        put_varint(out, self.offset.wrapping_add(1));
        put_varint(out, self.len as u64);
    }

    pub fn deserialize(input: &mut &[u8]) -> Result<Self> {
        let page_key = take_varint_i64(input)?;
        let offset = take_varint(input)?.wrapping_sub(1);
        let len = take_varint(input)? as u32;
        Ok(Self {
            page_key,
            offset,
            len,
            log_slot: None,
            page: None,
        })
    }
}

/// Equality over the durable identity only; runtime caching state does not
/// distinguish two references to the same page.
impl PartialEq for PageReference {
    fn eq(&self, other: &Self) -> bool {
        self.page_key == other.page_key && self.offset == other.offset && self.len == other.len
    }
}

impl Eq for PageReference {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_reference_is_null() {
        let r = PageReference::null();
        assert!(r.is_null());
        assert_eq!(r.page_key(), NULL_PAGE_KEY);
        assert!(r.location().is_none());
    }

    #[test]
    fn reference_with_key_is_not_null() {
        let r = PageReference::with_page_key(5);
        assert!(!r.is_null());
        assert!(r.location().is_none());
    }

    #[test]
    fn location_round_trip() {
        let mut r = PageReference::with_page_key(3);
        r.set_location(4096, 128);
        assert_eq!(r.location(), Some((4096, 128)));
    }

    #[test]
    fn serialize_round_trip() {
        let mut r = PageReference::with_page_key(42);
        r.set_location(1 << 33, 900);

        let mut out = Vec::new();
        r.serialize(&mut out);

        let mut input = out.as_slice();
        let decoded = PageReference::deserialize(&mut input).unwrap();
        assert_eq!(decoded, r);
        assert!(input.is_empty());
    }

    #[test]
    fn null_reference_frames_compactly() {
        let mut out = Vec::new();
        PageReference::null().serialize(&mut out);
        // zigzag(-1) = 1 byte, null offset = 1 byte, len = 1 byte
        assert_eq!(out.len(), 3);

        let mut input = out.as_slice();
        let decoded = PageReference::deserialize(&mut input).unwrap();
        assert!(decoded.is_null());
    }

    #[test]
    fn runtime_state_does_not_affect_equality() {
        let mut a = PageReference::with_page_key(1);
        let b = PageReference::with_page_key(1);
        a.set_log_slot(9);
        assert_eq!(a, b);
    }
}
