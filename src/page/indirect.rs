//! # Indirect Pages
//!
//! One indirect page is one level of the page trie: a fan-out node holding
//! up to `fanout` child references, addressed by the per-level digit of the
//! logical page key.
//!
//! ## Child Delegates
//!
//! Most indirect pages near the top of a freshly grown subtree hold only a
//! handful of children, so child storage has two delegates and grows from
//! the cheap one to the general one on demand:
//!
//! - **Sparse**: up to [`SPARSE_CHILD_LIMIT`] `(offset, reference)` pairs
//!   in an inline `SmallVec`; linear scan, no allocation.
//! - **Bitmap**: a presence bitmap plus a dense reference vector; the
//!   child's index in the vector is the popcount of the bitmap below its
//!   offset.
//!
//! Growth happens transparently inside [`IndirectPage::child_or_insert`]
//! when a fifth distinct offset is inserted. The delegate kind is one byte
//! on disk (0 = sparse, 1 = bitmap) and a page deserializes back into the
//! delegate it was written with.
//!
//! ## Copy-on-Write
//!
//! [`IndirectPage::clone_for_revision`] produces the working copy a write
//! transaction mutates: child references are cloned (sharing the committed
//! child pages), intent-log slots are cleared, and the copy is tagged with
//! the new revision.

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use crate::config::SPARSE_CHILD_LIMIT;
use crate::encoding::{put_varint, take_varint};
use crate::page::PageReference;

const DELEGATE_SPARSE: u8 = 0;
const DELEGATE_BITMAP: u8 = 1;

#[derive(Debug, Clone, PartialEq)]
enum ChildRefs {
    Sparse(SmallVec<[(u16, PageReference); SPARSE_CHILD_LIMIT]>),
    Bitmap {
        bits: SmallVec<[u64; 4]>,
        refs: Vec<PageReference>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndirectPage {
    revision: u64,
    fanout: usize,
    children: ChildRefs,
}

impl IndirectPage {
    pub fn new(revision: u64, fanout: usize) -> Self {
        Self {
            revision,
            fanout,
            children: ChildRefs::Sparse(SmallVec::new()),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn fanout(&self) -> usize {
        self.fanout
    }

    pub fn child_count(&self) -> usize {
        match &self.children {
            ChildRefs::Sparse(entries) => entries.len(),
            ChildRefs::Bitmap { refs, .. } => refs.len(),
        }
    }

    pub fn child(&self, offset: usize) -> Option<&PageReference> {
        debug_assert!(offset < self.fanout);
        match &self.children {
            ChildRefs::Sparse(entries) => entries
                .iter()
                .find(|(o, _)| *o as usize == offset)
                .map(|(_, r)| r),
            ChildRefs::Bitmap { bits, refs } => {
                bitmap_index(bits, offset).map(|index| &refs[index])
            }
        }
    }

    pub fn child_mut(&mut self, offset: usize) -> Option<&mut PageReference> {
        debug_assert!(offset < self.fanout);
        match &mut self.children {
            ChildRefs::Sparse(entries) => entries
                .iter_mut()
                .find(|(o, _)| *o as usize == offset)
                .map(|(_, r)| r),
            ChildRefs::Bitmap { bits, refs } => {
                bitmap_index(bits, offset).map(move |index| &mut refs[index])
            }
        }
    }

    /// Child reference at `offset`, inserting the given reference first if
    /// the slot is empty. Grows the sparse delegate to a bitmap when the
    /// insert would exceed the sparse capacity.
    pub fn child_or_insert(
        &mut self,
        offset: usize,
        reference: PageReference,
    ) -> &mut PageReference {
        debug_assert!(offset < self.fanout);

        let exists = self.child(offset).is_some();
        if !exists {
            if let ChildRefs::Sparse(entries) = &self.children {
                if entries.len() == SPARSE_CHILD_LIMIT {
                    self.grow_to_bitmap();
                }
            }
            match &mut self.children {
                ChildRefs::Sparse(entries) => {
                    entries.push((offset as u16, reference));
                    entries.sort_by_key(|(o, _)| *o);
                }
                ChildRefs::Bitmap { bits, refs } => {
                    let index = rank(bits, offset);
                    bits[offset / 64] |= 1 << (offset % 64);
                    refs.insert(index, reference);
                }
            }
        }
        self.child_mut(offset).unwrap() // INVARIANT: inserted above when missing
    }

    fn grow_to_bitmap(&mut self) {
        let ChildRefs::Sparse(entries) = &mut self.children else {
            return;
        };
        let mut bits: SmallVec<[u64; 4]> = SmallVec::new();
        bits.resize(self.fanout.div_ceil(64), 0);
        let mut refs = Vec::with_capacity(entries.len() + 1);
        for (offset, reference) in entries.drain(..) {
            bits[offset as usize / 64] |= 1 << (offset as usize % 64);
            refs.push(reference);
        }
        self.children = ChildRefs::Bitmap { bits, refs };
    }

    /// Offsets of all present children, ascending.
    pub fn child_offsets(&self) -> Vec<usize> {
        match &self.children {
            ChildRefs::Sparse(entries) => entries.iter().map(|(o, _)| *o as usize).collect(),
            ChildRefs::Bitmap { bits, .. } => (0..self.fanout)
                .filter(|offset| bits[offset / 64] & (1 << (offset % 64)) != 0)
                .collect(),
        }
    }

    /// Working copy for a new revision: child reference content is cloned,
    /// the referenced pages are shared, intent-log slots never carry over.
    pub fn clone_for_revision(&self, revision: u64) -> Self {
        let mut copy = self.clone();
        copy.revision = revision;
        match &mut copy.children {
            ChildRefs::Sparse(entries) => {
                for (_, r) in entries.iter_mut() {
                    r.clear_log_slot();
                }
            }
            ChildRefs::Bitmap { refs, .. } => {
                for r in refs.iter_mut() {
                    r.clear_log_slot();
                }
            }
        }
        copy
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        put_varint(out, self.revision);
        put_varint(out, self.fanout as u64);
        match &self.children {
            ChildRefs::Sparse(entries) => {
                out.push(DELEGATE_SPARSE);
                put_varint(out, entries.len() as u64);
                for (offset, reference) in entries {
                    put_varint(out, *offset as u64);
                    reference.serialize(out);
                }
            }
            ChildRefs::Bitmap { bits, refs } => {
                out.push(DELEGATE_BITMAP);
                for word in bits {
                    out.extend_from_slice(&word.to_le_bytes());
                }
                for reference in refs {
                    reference.serialize(out);
                }
            }
        }
    }

    pub fn deserialize(input: &mut &[u8]) -> Result<Self> {
        let revision = take_varint(input)?;
        let fanout = take_varint(input)? as usize;
        ensure!(
            fanout.is_power_of_two() && fanout >= 2,
            "indirect page carries invalid fanout {fanout}"
        );
        ensure!(!input.is_empty(), "indirect page truncated at delegate kind");
        let kind = input[0];
        *input = &input[1..];

        let children = match kind {
            DELEGATE_SPARSE => {
                let count = take_varint(input)? as usize;
                ensure!(
                    count <= SPARSE_CHILD_LIMIT,
                    "sparse delegate with {count} children"
                );
                let mut entries = SmallVec::new();
                for _ in 0..count {
                    let offset = take_varint(input)? as u16;
                    let reference = PageReference::deserialize(input)?;
                    entries.push((offset, reference));
                }
                ChildRefs::Sparse(entries)
            }
            DELEGATE_BITMAP => {
                let words = fanout.div_ceil(64);
                let mut bits: SmallVec<[u64; 4]> = SmallVec::new();
                for _ in 0..words {
                    ensure!(input.len() >= 8, "indirect page bitmap truncated");
                    bits.push(u64::from_le_bytes(input[..8].try_into().unwrap()));
                    *input = &input[8..];
                }
                let present: usize = bits.iter().map(|w| w.count_ones() as usize).sum();
                let mut refs = Vec::with_capacity(present);
                for _ in 0..present {
                    refs.push(PageReference::deserialize(input)?);
                }
                ChildRefs::Bitmap { bits, refs }
            }
            other => bail!("invalid indirect delegate kind: {other}"),
        };

        Ok(Self {
            revision,
            fanout,
            children,
        })
    }
}

/// Dense index of a present child, or `None` if its bit is clear.
fn bitmap_index(bits: &[u64], offset: usize) -> Option<usize> {
    if bits[offset / 64] & (1 << (offset % 64)) == 0 {
        return None;
    }
    Some(rank(bits, offset))
}

/// Popcount of all set bits strictly below `offset`.
fn rank(bits: &[u64], offset: usize) -> usize {
    let word = offset / 64;
    let below: usize = bits[..word].iter().map(|w| w.count_ones() as usize).sum();
    let mask = (1_u64 << (offset % 64)) - 1;
    below + (bits[word] & mask).count_ones() as usize
}
