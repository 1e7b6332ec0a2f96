//! # Resource Configuration
//!
//! Every store is opened against a [`ResourceConfig`] describing the shape
//! of its page trie and how records are framed on disk:
//!
//! - **fan-out**: child references per indirect page level,
//! - **bucket size**: records per key/value page,
//! - **leaf strategy**: hash-map or ordered-map record store inside a
//!   key/value page (two interchangeable strategies behind one contract),
//! - **position ids**: whether an extended positional identifier is
//!   persisted alongside each record,
//! - **record codec**: the pluggable codec that encodes record bytes.
//!
//! The structural fields (fan-out, bucket size, strategy, position ids) are
//! persisted in the store header so a reopened store always sees the trie
//! it was created with; the codec is supplied by the caller at open time.
//!
//! Constants live in [`constants`], grouped with their interdependencies
//! documented and enforced through compile-time assertions.

pub mod constants;

pub use constants::*;

use std::sync::Arc;

use eyre::{ensure, Result};

use crate::record::{PlainCodec, RecordCodec};

/// Record-store strategy inside a key/value page.
///
/// Both strategies satisfy the same contract (`get`/`put`/`remove`,
/// key-ascending `entries()`); `Unordered` trades iteration work for faster
/// point access, `Ordered` keeps records sorted at all times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeafStrategy {
    #[default]
    Unordered,
    Ordered,
}

impl LeafStrategy {
    pub fn as_byte(self) -> u8 {
        match self {
            LeafStrategy::Unordered => 0,
            LeafStrategy::Ordered => 1,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(LeafStrategy::Unordered),
            1 => Ok(LeafStrategy::Ordered),
            _ => eyre::bail!("invalid leaf strategy byte: {b}"),
        }
    }
}

/// Configuration of one store resource.
#[derive(Clone)]
pub struct ResourceConfig {
    pub fanout: usize,
    pub bucket_size: u64,
    pub leaf_strategy: LeafStrategy,
    pub store_position_ids: bool,
    pub codec: Arc<dyn RecordCodec>,
}

impl ResourceConfig {
    pub fn new() -> Self {
        Self {
            fanout: DEFAULT_FANOUT,
            bucket_size: DEFAULT_BUCKET_SIZE,
            leaf_strategy: LeafStrategy::default(),
            store_position_ids: false,
            codec: Arc::new(PlainCodec),
        }
    }

    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn with_bucket_size(mut self, bucket_size: u64) -> Self {
        self.bucket_size = bucket_size;
        self
    }

    pub fn with_leaf_strategy(mut self, strategy: LeafStrategy) -> Self {
        self.leaf_strategy = strategy;
        self
    }

    pub fn with_position_ids(mut self, store: bool) -> Self {
        self.store_position_ids = store;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn RecordCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// `log2(fanout)`; valid only after [`validate`](Self::validate).
    pub fn fanout_exponent(&self) -> u32 {
        self.fanout.trailing_zeros()
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.fanout.is_power_of_two() && self.fanout >= 2,
            "fanout must be a power of two >= 2, got {}",
            self.fanout
        );
        ensure!(
            self.fanout <= 1 << 16,
            "fanout {} exceeds the 16-bit child offset space",
            self.fanout
        );
        ensure!(self.bucket_size > 0, "bucket size must be positive");
        Ok(())
    }

    /// Bucket (logical page key) holding `record_key`.
    pub fn page_key_for(&self, record_key: u64) -> u64 {
        record_key / self.bucket_size
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("fanout", &self.fanout)
            .field("bucket_size", &self.bucket_size)
            .field("leaf_strategy", &self.leaf_strategy)
            .field("store_position_ids", &self.store_position_ids)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ResourceConfig::new();
        config.validate().unwrap();
        assert_eq!(config.fanout, DEFAULT_FANOUT);
        assert_eq!(config.fanout_exponent(), DEFAULT_FANOUT_EXPONENT);
    }

    #[test]
    fn rejects_non_power_of_two_fanout() {
        let config = ResourceConfig::new().with_fanout(12);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_bucket_size() {
        let config = ResourceConfig::new().with_bucket_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn page_key_partitions_record_space() {
        let config = ResourceConfig::new().with_bucket_size(512);
        assert_eq!(config.page_key_for(0), 0);
        assert_eq!(config.page_key_for(511), 0);
        assert_eq!(config.page_key_for(512), 1);
        assert_eq!(config.page_key_for(5 * 512 + 17), 5);
    }

    #[test]
    fn leaf_strategy_byte_round_trip() {
        for strategy in [LeafStrategy::Unordered, LeafStrategy::Ordered] {
            assert_eq!(
                LeafStrategy::from_byte(strategy.as_byte()).unwrap(),
                strategy
            );
        }
        assert!(LeafStrategy::from_byte(7).is_err());
    }
}
