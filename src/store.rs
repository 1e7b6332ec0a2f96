//! # Store
//!
//! The top-level resource: one directory holding a data file of immutable
//! page frames and a revision index publishing one root per committed
//! revision. A [`Store`] hands out read transactions against any committed
//! revision and at most one write transaction at a time.
//!
//! ## Lifecycle
//!
//! `create` writes the store header and bootstraps revision 0 as the empty
//! tree (a root indirect page over one empty bucket), so a fresh store is
//! immediately readable. `open` validates the header, reconstructs the
//! structural configuration from it and resumes at the latest published
//! revision. `in_memory` wires the same engine to byte buffers for tests
//! and ephemeral workloads.
//!
//! ## Single-Writer Discipline
//!
//! The writer latch is an atomic flag, not advisory: `begin_write` while a
//! write transaction is active fails immediately and deterministically
//! with `ConcurrentWrite`, never blocking. Commit and abort (including
//! abort-by-drop) release the latch.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eyre::{Result, WrapErr};
use parking_lot::RwLock;

use crate::config::ResourceConfig;
use crate::error::StorageError;
use crate::page::{Page, RevisionRootPage};
use crate::storage::{
    read_frame, FileStorage, MemoryStorage, PageAddress, PageCache, RevisionIndex, StorageBackend,
    StoreHeader, PAGES_FILE, REVISIONS_FILE,
};
use crate::txn::{ReadHandle, WriteHandle};

/// Shared state behind every handle of one store.
pub(crate) struct StoreInner {
    pub(crate) config: ResourceConfig,
    pub(crate) pages: Arc<dyn StorageBackend>,
    pub(crate) revisions: RevisionIndex,
    pub(crate) cache: PageCache,
    pub(crate) writer_active: AtomicBool,
    pub(crate) latest_root: RwLock<Arc<RevisionRootPage>>,
}

pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create a fresh store in `dir` and commit revision 0 (the empty
    /// tree). Fails if the directory already contains a store.
    pub fn create(dir: &Path, config: ResourceConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(dir)
            .wrap_err_with(|| format!("creating store directory {}", dir.display()))?;

        let pages: Arc<dyn StorageBackend> = Arc::new(FileStorage::open(&dir.join(PAGES_FILE))?);
        let revisions: Arc<dyn StorageBackend> =
            Arc::new(FileStorage::open(&dir.join(REVISIONS_FILE))?);
        eyre::ensure!(
            pages.is_empty()? && revisions.is_empty()?,
            "store directory {} already holds a store",
            dir.display()
        );

        Self::bootstrap(config, pages, revisions)
    }

    /// Open an existing store, reconstructing the structural configuration
    /// from the store header. `config` supplies the record codec (and read
    /// cache sizing); its structural fields are overwritten by the header.
    pub fn open(dir: &Path, mut config: ResourceConfig) -> Result<Self> {
        let pages: Arc<dyn StorageBackend> = Arc::new(FileStorage::open(&dir.join(PAGES_FILE))?);
        let revisions: Arc<dyn StorageBackend> =
            Arc::new(FileStorage::open(&dir.join(REVISIONS_FILE))?);

        StoreHeader::read_from(pages.as_ref())
            .wrap_err_with(|| format!("opening store at {}", dir.display()))?
            .apply_to(&mut config);

        let revisions = RevisionIndex::new(revisions);
        let latest = revisions.latest()?.ok_or_else(|| {
            StorageError::Corruption("store has a header but no committed revision".into())
        })?;

        let inner = Arc::new(StoreInner {
            config,
            pages,
            revisions,
            cache: PageCache::default(),
            writer_active: AtomicBool::new(false),
            latest_root: RwLock::new(Arc::new(RevisionRootPage::new_empty(0))),
        });
        let root = load_root(&inner, latest)?;
        *inner.latest_root.write() = root;

        Ok(Self { inner })
    }

    /// Ephemeral store over in-memory buffers.
    pub fn in_memory(config: ResourceConfig) -> Result<Self> {
        config.validate()?;
        Self::bootstrap(
            config,
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
        )
    }

    fn bootstrap(
        config: ResourceConfig,
        pages: Arc<dyn StorageBackend>,
        revisions: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        StoreHeader::for_config(&config).write_to(pages.as_ref())?;

        let inner = Arc::new(StoreInner {
            config,
            pages,
            revisions: RevisionIndex::new(revisions),
            cache: PageCache::default(),
            writer_active: AtomicBool::new(true),
            latest_root: RwLock::new(Arc::new(RevisionRootPage::new_empty(0))),
        });

        let mut genesis = WriteHandle::bootstrap(Arc::clone(&inner));
        genesis.materialize_initial_tree()?;
        genesis.commit().wrap_err("committing the empty tree")?;

        Ok(Self { inner })
    }

    /// Latest committed revision number.
    pub fn latest_revision(&self) -> u64 {
        self.inner.latest_root.read().revision()
    }

    /// Number of committed revisions (revisions are dense from 0).
    pub fn revision_count(&self) -> u64 {
        self.latest_revision() + 1
    }

    /// Begin a read transaction bound to `revision`.
    pub fn begin_read(&self, revision: u64) -> Result<ReadHandle> {
        let latest = self.latest_revision();
        if revision > latest {
            return Err(StorageError::RevisionNotFound {
                requested: revision,
                latest,
            }
            .into());
        }

        let root = if revision == latest {
            Arc::clone(&self.inner.latest_root.read())
        } else {
            load_root(&self.inner, revision)?
        };
        Ok(ReadHandle::new(Arc::clone(&self.inner), root))
    }

    /// Begin a read transaction on the latest committed revision.
    pub fn begin_read_latest(&self) -> Result<ReadHandle> {
        self.begin_read(self.latest_revision())
    }

    /// Begin the write transaction. Fails immediately with
    /// `ConcurrentWrite` while another one is active.
    pub fn begin_write(&self) -> Result<WriteHandle> {
        if self
            .inner
            .writer_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StorageError::ConcurrentWrite.into());
        }

        let latest = Arc::clone(&self.inner.latest_root.read());
        Ok(WriteHandle::new(Arc::clone(&self.inner), &latest))
    }
}

/// Load the revision root page of `revision` through the read cache.
fn load_root(inner: &StoreInner, revision: u64) -> Result<Arc<RevisionRootPage>> {
    let entry = inner.revisions.lookup(revision)?;
    let (offset, len) = entry.root_location();

    let page = match inner.cache.get(PageAddress(offset)) {
        Some(page) => page,
        None => {
            let body = read_frame(inner.pages.as_ref(), offset, len)
                .wrap_err_with(|| format!("reading root page of revision {revision}"))?;
            let page = Arc::new(Page::deserialize(&body, &inner.config)?);
            inner.cache.insert(PageAddress(offset), Arc::clone(&page));
            page
        }
    };

    Ok(Arc::new(page.as_revision_root()?.clone()))
}
