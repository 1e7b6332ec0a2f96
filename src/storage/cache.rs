//! # Shared Read Cache
//!
//! Read-through cache of committed, deserialized pages, shared by all
//! transactions. Committed pages are immutable, so entries are `Arc<Page>`
//! handed out by clone; the cache never mutates a cached page and eviction
//! only drops the cache's own reference.
//!
//! ## Addressing
//!
//! Entries are keyed by [`PageAddress`], the byte offset of the page's
//! frame in the data file. The file is append-only, so an offset names
//! exactly one immutable page for the lifetime of the store; it is the
//! compact equivalent of a `(revision, logical key)` pair and, unlike
//! that pair, known *before* the page has been read.
//!
//! ## Sharding and Eviction
//!
//! The cache is split into power-of-two shards, each behind its own
//! `parking_lot::RwLock`, so concurrent readers on different pages rarely
//! contend. Within a shard, eviction is SIEVE: each entry has a visited
//! flag set on access; the eviction hand sweeps the slot ring, clearing
//! flags (second chance) until it finds an unvisited entry to replace.
//! Sequential scans therefore cannot flush out frequently-read upper-level
//! indirect pages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::config::{CACHE_SHARD_COUNT, DEFAULT_CACHE_CAPACITY};
use crate::page::Page;

/// Byte offset of a page frame in the data file; stable identity of one
/// immutable committed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageAddress(pub u64);

struct CacheEntry {
    address: PageAddress,
    page: Arc<Page>,
    visited: AtomicBool,
}

struct Shard {
    map: HashMap<PageAddress, usize>,
    slots: Vec<CacheEntry>,
    hand: usize,
    capacity: usize,
}

impl Shard {
    fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            hand: 0,
            capacity,
        }
    }

    fn get(&self, address: PageAddress) -> Option<Arc<Page>> {
        let entry = &self.slots[*self.map.get(&address)?];
        entry.visited.store(true, Ordering::Release);
        Some(Arc::clone(&entry.page))
    }

    fn insert(&mut self, address: PageAddress, page: Arc<Page>) {
        if self.map.contains_key(&address) {
            return; // committed pages are immutable; first insert wins
        }

        let entry = CacheEntry {
            address,
            page,
            visited: AtomicBool::new(false),
        };

        if self.slots.len() < self.capacity {
            self.map.insert(address, self.slots.len());
            self.slots.push(entry);
            return;
        }

        let victim = self.sweep();
        self.map.remove(&self.slots[victim].address);
        self.map.insert(address, victim);
        self.slots[victim] = entry;
    }

    /// SIEVE hand: clear visited flags until an unvisited slot turns up.
    fn sweep(&mut self) -> usize {
        loop {
            let slot = self.hand;
            self.hand = (self.hand + 1) % self.slots.len();
            if self.slots[slot].visited.swap(false, Ordering::AcqRel) {
                continue;
            }
            return slot;
        }
    }
}

pub struct PageCache {
    shards: Vec<RwLock<Shard>>,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(CACHE_SHARD_COUNT);
        let per_shard = capacity / CACHE_SHARD_COUNT;
        let shards = (0..CACHE_SHARD_COUNT)
            .map(|_| RwLock::new(Shard::new(per_shard)))
            .collect();
        Self { shards }
    }

    fn shard(&self, address: PageAddress) -> &RwLock<Shard> {
        // Frame offsets are spread out; fold the high bits in before masking.
        let hash = address.0 ^ (address.0 >> 17);
        &self.shards[(hash as usize) & (CACHE_SHARD_COUNT - 1)]
    }

    pub fn get(&self, address: PageAddress) -> Option<Arc<Page>> {
        self.shard(address).read().get(address)
    }

    pub fn insert(&self, address: PageAddress, page: Arc<Page>) {
        self.shard(address).write().insert(address, page);
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
