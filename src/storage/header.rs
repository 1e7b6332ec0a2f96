//! # Store Header
//!
//! A fixed 64-byte zerocopy header at the start of the data file persists
//! the structural configuration a store was created with: fan-out, bucket
//! size, leaf strategy and whether position ids are stored per record.
//! Reopening a store reconstructs its [`ResourceConfig`] from these fields
//! so the trie is always walked with the shape it was built with; only the
//! record codec is re-supplied by the caller.
//!
//! All multi-byte fields are little-endian via zerocopy's `U32`/`U64`
//! wrapper types.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{
    LeafStrategy, ResourceConfig, FORMAT_VERSION, STORE_HEADER_SIZE, STORE_MAGIC,
};
use crate::storage::StorageBackend;

const FLAG_POSITION_IDS: u32 = 1 << 0;
const FLAG_ORDERED_LEAVES: u32 = 1 << 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct StoreHeader {
    magic: [u8; 16],
    version: U32,
    fanout: U32,
    bucket_size: U64,
    flags: U32,
    reserved: [u8; 28],
}

const _: () = assert!(size_of::<StoreHeader>() == STORE_HEADER_SIZE);

impl StoreHeader {
    pub fn for_config(config: &ResourceConfig) -> Self {
        let mut flags = 0;
        if config.store_position_ids {
            flags |= FLAG_POSITION_IDS;
        }
        if config.leaf_strategy == LeafStrategy::Ordered {
            flags |= FLAG_ORDERED_LEAVES;
        }
        Self {
            magic: *STORE_MAGIC,
            version: U32::new(FORMAT_VERSION),
            fanout: U32::new(config.fanout as u32),
            bucket_size: U64::new(config.bucket_size),
            flags: U32::new(flags),
            reserved: [0; 28],
        }
    }

    /// Apply the persisted structural fields onto `config` (which keeps
    /// its caller-supplied codec).
    pub fn apply_to(&self, config: &mut ResourceConfig) {
        config.fanout = self.fanout.get() as usize;
        config.bucket_size = self.bucket_size.get();
        config.store_position_ids = self.flags.get() & FLAG_POSITION_IDS != 0;
        config.leaf_strategy = if self.flags.get() & FLAG_ORDERED_LEAVES != 0 {
            LeafStrategy::Ordered
        } else {
            LeafStrategy::Unordered
        };
    }

    pub fn write_to(&self, backend: &dyn StorageBackend) -> Result<()> {
        debug_assert!(backend.is_empty()?, "header must be the first append");
        backend.append(self.as_bytes())?;
        Ok(())
    }

    pub fn read_from(backend: &dyn StorageBackend) -> Result<Self> {
        let bytes = backend.read(0, STORE_HEADER_SIZE)?;
        let header = Self::read_from_bytes(&bytes)
            .map_err(|e| eyre::eyre!("store header does not parse: {e:?}"))?;

        ensure!(
            header.magic == *STORE_MAGIC,
            "not a store data file (bad magic)"
        );
        ensure!(
            header.version.get() == FORMAT_VERSION,
            "unsupported store format version {} (supported: {})",
            header.version.get(),
            FORMAT_VERSION
        );
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn header_is_exactly_64_bytes() {
        assert_eq!(size_of::<StoreHeader>(), 64);
    }

    #[test]
    fn config_round_trip_through_header() {
        let config = ResourceConfig::new()
            .with_fanout(64)
            .with_bucket_size(128)
            .with_leaf_strategy(LeafStrategy::Ordered)
            .with_position_ids(true);

        let backend = MemoryStorage::new();
        StoreHeader::for_config(&config).write_to(&backend).unwrap();

        let header = StoreHeader::read_from(&backend).unwrap();
        let mut reopened = ResourceConfig::new();
        header.apply_to(&mut reopened);

        assert_eq!(reopened.fanout, 64);
        assert_eq!(reopened.bucket_size, 128);
        assert_eq!(reopened.leaf_strategy, LeafStrategy::Ordered);
        assert!(reopened.store_position_ids);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let backend = MemoryStorage::new();
        backend.append(&[0_u8; STORE_HEADER_SIZE]).unwrap();
        let err = StoreHeader::read_from(&backend).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn future_version_is_rejected() {
        let config = ResourceConfig::new();
        let mut header = StoreHeader::for_config(&config);
        header.version = U32::new(FORMAT_VERSION + 1);

        let backend = MemoryStorage::new();
        backend.append(header.as_bytes()).unwrap();
        let err = StoreHeader::read_from(&backend).unwrap_err();
        assert!(err.to_string().contains("unsupported store format"));
    }
}
