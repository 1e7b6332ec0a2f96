//! # Page Variants
//!
//! The closed set of page types of the versioned storage engine:
//!
//! - [`IndirectPage`]: one fan-out level of the page trie
//! - [`KeyValuePage`]: leaf bucket of records, the unit of I/O and of
//!   copy-on-write duplication
//! - [`RevisionRootPage`]: per-revision entry point
//!
//! [`Page`] is a tagged enum, matched over everywhere a variant matters;
//! there is deliberately no open page trait to subclass. Every serialized
//! page starts with a one-byte type tag followed by the variant body; the
//! storage layer wraps the result in a checksummed frame.
//!
//! ## Module Organization
//!
//! - `reference`: [`PageReference`], the typed handle pages are reached by
//! - `indirect`: trie fan-out nodes with sparse/bitmap child delegates
//! - `kv`: record buckets with two interchangeable store strategies
//! - `revision_root`: committed revision entry points

mod indirect;
mod kv;
mod reference;
mod revision_root;

pub use indirect::IndirectPage;
pub use kv::KeyValuePage;
pub use reference::PageReference;
pub use revision_root::RevisionRootPage;

use eyre::{bail, ensure, Result};

use crate::config::ResourceConfig;
use crate::error::StorageError;

const TAG_INDIRECT: u8 = 1;
const TAG_KEY_VALUE: u8 = 2;
const TAG_REVISION_ROOT: u8 = 3;

/// Logical subtree a key/value page belongs to. The record trie is the
/// only subtree this engine materializes; the other tags are reserved for
/// the index layers built on the same page primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageKind {
    #[default]
    Records,
    PathSummary,
    Index,
}

impl PageKind {
    pub fn as_byte(self) -> u8 {
        match self {
            PageKind::Records => 1,
            PageKind::PathSummary => 2,
            PageKind::Index => 3,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            1 => Ok(PageKind::Records),
            2 => Ok(PageKind::PathSummary),
            3 => Ok(PageKind::Index),
            _ => bail!("invalid page kind byte: {b}"),
        }
    }
}

/// One page, of whichever variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Page {
    Indirect(IndirectPage),
    KeyValue(KeyValuePage),
    RevisionRoot(RevisionRootPage),
}

impl Page {
    pub fn revision(&self) -> u64 {
        match self {
            Page::Indirect(p) => p.revision(),
            Page::KeyValue(p) => p.revision(),
            Page::RevisionRoot(p) => p.revision(),
        }
    }

    pub fn as_indirect(&self) -> Result<&IndirectPage> {
        match self {
            Page::Indirect(p) => Ok(p),
            other => Err(StorageError::Corruption(format!(
                "expected indirect page, found {}",
                other.variant_name()
            ))
            .into()),
        }
    }

    pub fn as_indirect_mut(&mut self) -> Result<&mut IndirectPage> {
        match self {
            Page::Indirect(p) => Ok(p),
            other => Err(StorageError::Corruption(format!(
                "expected indirect page, found {}",
                other.variant_name()
            ))
            .into()),
        }
    }

    pub fn as_key_value(&self) -> Result<&KeyValuePage> {
        match self {
            Page::KeyValue(p) => Ok(p),
            other => Err(StorageError::Corruption(format!(
                "expected key/value page, found {}",
                other.variant_name()
            ))
            .into()),
        }
    }

    pub fn as_key_value_mut(&mut self) -> Result<&mut KeyValuePage> {
        match self {
            Page::KeyValue(p) => Ok(p),
            other => Err(StorageError::Corruption(format!(
                "expected key/value page, found {}",
                other.variant_name()
            ))
            .into()),
        }
    }

    pub fn as_revision_root(&self) -> Result<&RevisionRootPage> {
        match self {
            Page::RevisionRoot(p) => Ok(p),
            other => Err(StorageError::Corruption(format!(
                "expected revision root page, found {}",
                other.variant_name()
            ))
            .into()),
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Page::Indirect(_) => "indirect",
            Page::KeyValue(_) => "key/value",
            Page::RevisionRoot(_) => "revision root",
        }
    }

    /// Copy-on-write duplication into the given revision. Revision roots
    /// are never cloned this way; they are created per revision.
    pub fn clone_for_revision(&self, revision: u64) -> Result<Page> {
        match self {
            Page::Indirect(p) => Ok(Page::Indirect(p.clone_for_revision(revision))),
            Page::KeyValue(p) => Ok(Page::KeyValue(p.clone_for_revision(revision))),
            Page::RevisionRoot(_) => Err(StorageError::Corruption(
                "revision root page reached through the indirect tree".into(),
            )
            .into()),
        }
    }

    /// Serialize as `[type tag][variant body]`.
    pub fn serialize(&self, config: &ResourceConfig, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Page::Indirect(p) => {
                out.push(TAG_INDIRECT);
                p.serialize(out);
            }
            Page::KeyValue(p) => {
                out.push(TAG_KEY_VALUE);
                p.serialize(config.codec.as_ref(), config.store_position_ids, out)?;
            }
            Page::RevisionRoot(p) => {
                out.push(TAG_REVISION_ROOT);
                p.serialize(out);
            }
        }
        Ok(())
    }

    pub fn deserialize(bytes: &[u8], config: &ResourceConfig) -> Result<Page> {
        ensure!(!bytes.is_empty(), "empty page body");
        let mut input = &bytes[1..];
        let page = match bytes[0] {
            TAG_INDIRECT => Page::Indirect(IndirectPage::deserialize(&mut input)?),
            TAG_KEY_VALUE => Page::KeyValue(KeyValuePage::deserialize(
                &mut input,
                config.codec.as_ref(),
                config.store_position_ids,
            )?),
            TAG_REVISION_ROOT => Page::RevisionRoot(RevisionRootPage::deserialize(&mut input)?),
            tag => {
                return Err(StorageError::Corruption(format!("invalid page type tag: {tag}")).into())
            }
        };
        ensure!(
            input.is_empty(),
            "{} trailing bytes after page body",
            input.len()
        );
        Ok(page)
    }
}
