//! # Revision Root Pages
//!
//! One revision root page per committed revision: the versioned entry
//! point from which that revision's whole indirect tree is reachable.
//! Older roots stay valid and readable forever; the engine never deletes a
//! revision.
//!
//! Besides the root reference the page carries the revision counters a
//! writer needs to continue from the snapshot: the highest record key ever
//! assigned, and the current height of the trie (keys beyond the covered
//! key space grow the tree by adding levels above the old root).

use eyre::{ensure, Result};

use crate::encoding::{put_varint, take_varint};
use crate::page::PageReference;

#[derive(Debug, Clone, PartialEq)]
pub struct RevisionRootPage {
    revision: u64,
    root_ref: PageReference,
    max_record_key: u64,
    height: u32,
    commit_timestamp_ms: u64,
    commit_message: Option<String>,
}

impl RevisionRootPage {
    /// Root of the initial empty tree: height one, nothing allocated yet.
    pub fn new_empty(revision: u64) -> Self {
        Self {
            revision,
            root_ref: PageReference::null(),
            max_record_key: 0,
            height: 1,
            commit_timestamp_ms: 0,
            commit_message: None,
        }
    }

    /// Provisional root for the next revision, sharing the committed tree
    /// until copy-on-write peels paths off it.
    pub fn next_revision(&self) -> Self {
        let mut root_ref = self.root_ref.clone();
        root_ref.clear_log_slot();
        Self {
            revision: self.revision + 1,
            root_ref,
            max_record_key: self.max_record_key,
            height: self.height,
            commit_timestamp_ms: 0,
            commit_message: None,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn root_ref(&self) -> &PageReference {
        &self.root_ref
    }

    pub fn root_ref_mut(&mut self) -> &mut PageReference {
        &mut self.root_ref
    }

    pub fn max_record_key(&self) -> u64 {
        self.max_record_key
    }

    pub fn note_record_key(&mut self, key: u64) {
        self.max_record_key = self.max_record_key.max(key);
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_height(&mut self, height: u32) {
        debug_assert!(height >= self.height, "trees only grow");
        self.height = height;
    }

    pub fn commit_timestamp_ms(&self) -> u64 {
        self.commit_timestamp_ms
    }

    pub fn set_commit_timestamp_ms(&mut self, millis: u64) {
        self.commit_timestamp_ms = millis;
    }

    pub fn commit_message(&self) -> Option<&str> {
        self.commit_message.as_deref()
    }

    pub fn set_commit_message(&mut self, message: impl Into<String>) {
        self.commit_message = Some(message.into());
    }

    /// Whether `page_key` is addressable under the current height. The
    /// tree addresses `fanout ^ height` buckets; once the shift exceeds
    /// the key width the whole key space is covered and no further
    /// growth is possible or needed.
    pub fn covers_page_key(&self, page_key: u64, fanout_exponent: u32) -> bool {
        match 1_u64.checked_shl(self.height * fanout_exponent) {
            Some(capacity) => page_key < capacity,
            None => true,
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        put_varint(out, self.revision);
        self.root_ref.serialize(out);
        put_varint(out, self.max_record_key);
        put_varint(out, self.height as u64);
        put_varint(out, self.commit_timestamp_ms);
        match &self.commit_message {
            Some(message) => {
                put_varint(out, message.len() as u64 + 1);
                out.extend_from_slice(message.as_bytes());
            }
            None => put_varint(out, 0),
        }
    }

    pub fn deserialize(input: &mut &[u8]) -> Result<Self> {
        let revision = take_varint(input)?;
        let root_ref = PageReference::deserialize(input)?;
        let max_record_key = take_varint(input)?;
        let height = take_varint(input)? as u32;
        ensure!(height >= 1, "revision root with zero tree height");
        let commit_timestamp_ms = take_varint(input)?;

        let tagged = take_varint(input)? as usize;
        let commit_message = if tagged == 0 {
            None
        } else {
            let len = tagged - 1;
            ensure!(input.len() >= len, "commit message truncated");
            let message = std::str::from_utf8(&input[..len])
                .map_err(|_| eyre::eyre!("commit message is not valid utf-8"))?
                .to_owned();
            *input = &input[len..];
            Some(message)
        };

        Ok(Self {
            revision,
            root_ref,
            max_record_key,
            height,
            commit_timestamp_ms,
            commit_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_root_has_null_tree() {
        let root = RevisionRootPage::new_empty(0);
        assert_eq!(root.revision(), 0);
        assert!(root.root_ref().is_null());
        assert_eq!(root.height(), 1);
    }

    #[test]
    fn next_revision_increments_and_shares_root() {
        let mut root = RevisionRootPage::new_empty(0);
        root.root_ref_mut().set_location(4096, 100);
        root.note_record_key(77);

        let next = root.next_revision();
        assert_eq!(next.revision(), 1);
        assert_eq!(next.root_ref().location(), Some((4096, 100)));
        assert_eq!(next.max_record_key(), 77);
        assert_eq!(next.height(), root.height());
    }

    #[test]
    fn next_revision_drops_stale_log_slot() {
        let mut root = RevisionRootPage::new_empty(0);
        root.root_ref_mut().set_log_slot(3);
        assert!(root.next_revision().root_ref().log_slot().is_none());
    }

    #[test]
    fn key_space_grows_with_height() {
        let mut root = RevisionRootPage::new_empty(0);
        assert!(root.covers_page_key(15, 4));
        assert!(!root.covers_page_key(16, 4));
        root.set_height(2);
        assert!(root.covers_page_key(255, 4));
        assert!(!root.covers_page_key(256, 4));
    }

    #[test]
    fn full_height_tree_covers_the_whole_key_space() {
        let mut root = RevisionRootPage::new_empty(0);
        root.set_height(16);
        assert!(root.covers_page_key(u64::MAX, 4));

        // One level short still leaves the top half unaddressable.
        let mut short = RevisionRootPage::new_empty(0);
        short.set_height(15);
        assert!(!short.covers_page_key(u64::MAX, 4));
        assert!(short.covers_page_key((1 << 60) - 1, 4));
    }

    #[test]
    fn serialize_round_trip() {
        let mut root = RevisionRootPage::new_empty(9);
        root.root_ref_mut().set_page_key(0);
        root.root_ref_mut().set_location(64, 2000);
        root.note_record_key(123_456);
        root.set_height(3);
        root.set_commit_timestamp_ms(1_700_000_000_000);
        root.set_commit_message("initial import");

        let mut out = Vec::new();
        root.serialize(&mut out);

        let mut input = out.as_slice();
        let decoded = RevisionRootPage::deserialize(&mut input).unwrap();
        assert_eq!(decoded, root);
        assert!(input.is_empty());
    }

    #[test]
    fn serialize_round_trip_without_message() {
        let root = RevisionRootPage::new_empty(0);
        let mut out = Vec::new();
        root.serialize(&mut out);
        let mut input = out.as_slice();
        assert_eq!(RevisionRootPage::deserialize(&mut input).unwrap(), root);
    }
}
