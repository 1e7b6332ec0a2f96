//! # Revision Index
//!
//! Maps revision numbers to the file location of their revision root
//! pages. Entries are fixed 32-byte zerocopy records appended in commit
//! order, so entry `n` lives at byte offset `n * 32`, "latest" is the last
//! entry, and lookup is a single positioned read.
//!
//! Appending an entry is the *publication* step of a commit: the data file
//! is synced first, then the entry is appended and synced. A crash between
//! the two leaves unreferenced page frames behind (harmless garbage) but
//! never a published revision with missing pages.
//!
//! Each entry carries its own CRC-64 so a torn index append is detected as
//! corruption rather than read as a bogus root location.

use std::sync::Arc;

use crc::{Crc, CRC_64_ECMA_182};
use eyre::{ensure, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::REVISION_ENTRY_SIZE;
use crate::error::StorageError;
use crate::storage::StorageBackend;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RevisionEntry {
    revision: U64,
    root_offset: U64,
    root_len: U32,
    reserved: U32,
    crc: U64,
}

const _: () = assert!(size_of::<RevisionEntry>() == REVISION_ENTRY_SIZE);

impl RevisionEntry {
    pub fn new(revision: u64, root_offset: u64, root_len: u32) -> Self {
        let mut entry = Self {
            revision: U64::new(revision),
            root_offset: U64::new(root_offset),
            root_len: U32::new(root_len),
            reserved: U32::new(0),
            crc: U64::new(0),
        };
        entry.crc = U64::new(CRC64.checksum(&entry.as_bytes()[..24]));
        entry
    }

    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    pub fn root_location(&self) -> (u64, u32) {
        (self.root_offset.get(), self.root_len.get())
    }

    fn verify(&self) -> Result<()> {
        let expected = CRC64.checksum(&self.as_bytes()[..24]);
        if self.crc.get() != expected {
            return Err(StorageError::Corruption(format!(
                "revision index entry for revision {} fails its checksum",
                self.revision.get()
            ))
            .into());
        }
        Ok(())
    }
}

/// The revision index over its backing file.
pub struct RevisionIndex {
    backend: Arc<dyn StorageBackend>,
}

impl RevisionIndex {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Number of committed revisions. Revision numbers are dense from 0,
    /// so this is also `latest + 1` for a non-empty index.
    pub fn count(&self) -> Result<u64> {
        let len = self.backend.len()?;
        ensure!(
            len % REVISION_ENTRY_SIZE as u64 == 0,
            "revision index length {len} is not a multiple of the entry size"
        );
        Ok(len / REVISION_ENTRY_SIZE as u64)
    }

    /// Latest committed revision number, if any revision exists.
    pub fn latest(&self) -> Result<Option<u64>> {
        Ok(self.count()?.checked_sub(1))
    }

    pub fn lookup(&self, revision: u64) -> Result<RevisionEntry> {
        let count = self.count()?;
        if revision >= count {
            return Err(StorageError::RevisionNotFound {
                requested: revision,
                latest: count.wrapping_sub(1),
            }
            .into());
        }

        let bytes = self
            .backend
            .read(revision * REVISION_ENTRY_SIZE as u64, REVISION_ENTRY_SIZE)?;
        let entry = RevisionEntry::read_from_bytes(&bytes)
            .map_err(|e| eyre::eyre!("revision index entry does not parse: {e:?}"))?;
        entry.verify()?;

        ensure!(
            entry.revision() == revision,
            "revision index entry at slot {revision} claims revision {}",
            entry.revision()
        );
        Ok(entry)
    }

    /// Publish a revision. The caller must have synced the data file
    /// already; this appends the entry and syncs the index.
    pub fn publish(&self, entry: RevisionEntry) -> Result<()> {
        let count = self.count()?;
        ensure!(
            entry.revision() == count,
            "publishing revision {} but the next dense revision is {count}",
            entry.revision()
        );
        self.backend.append(entry.as_bytes())?;
        self.backend.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn index() -> RevisionIndex {
        RevisionIndex::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn empty_index_has_no_latest() {
        let index = index();
        assert_eq!(index.count().unwrap(), 0);
        assert_eq!(index.latest().unwrap(), None);
    }

    #[test]
    fn publish_and_lookup() {
        let index = index();
        index.publish(RevisionEntry::new(0, 64, 100)).unwrap();
        index.publish(RevisionEntry::new(1, 500, 120)).unwrap();

        assert_eq!(index.latest().unwrap(), Some(1));
        assert_eq!(index.lookup(0).unwrap().root_location(), (64, 100));
        assert_eq!(index.lookup(1).unwrap().root_location(), (500, 120));
    }

    #[test]
    fn lookup_beyond_latest_is_revision_not_found() {
        let index = index();
        index.publish(RevisionEntry::new(0, 64, 100)).unwrap();

        let err = index.lookup(5).unwrap_err();
        assert!(crate::error::is_storage_error(&err, |e| matches!(
            e,
            StorageError::RevisionNotFound {
                requested: 5,
                latest: 0
            }
        )));
    }

    #[test]
    fn publish_enforces_dense_numbering() {
        let index = index();
        index.publish(RevisionEntry::new(0, 64, 100)).unwrap();
        assert!(index.publish(RevisionEntry::new(2, 999, 1)).is_err());
    }

    #[test]
    fn tampered_entry_is_corruption() {
        let backend = Arc::new(MemoryStorage::new());
        let mut bytes = RevisionEntry::new(0, 64, 100).as_bytes().to_vec();
        bytes[8] ^= 0xFF; // flip a bit of root_offset, CRC now stale
        backend.append(&bytes).unwrap();

        let index = RevisionIndex::new(backend);
        let err = index.lookup(0).unwrap_err();
        assert!(crate::error::is_storage_error(&err, |e| matches!(
            e,
            StorageError::Corruption(_)
        )));
    }
}
