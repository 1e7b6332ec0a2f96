//! # Storage Backend Abstraction
//!
//! Copy-based backend trait so the engine runs against a real file or
//! against memory in tests without touching the page code. The interface
//! is deliberately small: positioned read, append, length, sync. Append
//! returns the offset the bytes landed at; that offset becomes part of the
//! durable page reference.
//!
//! Both implementations tolerate concurrent readers with one appender,
//! matching the engine's single-writer discipline.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use eyre::{Result, WrapErr};
use parking_lot::{Mutex, RwLock};

use crate::error::StorageError;

pub trait StorageBackend: Send + Sync {
    /// Read exactly `len` bytes at `offset`. `PageNotFound` if the range
    /// lies beyond the end of the backend.
    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Append `bytes`, returning the offset they were written at.
    fn append(&self, bytes: &[u8]) -> Result<u64>;

    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Make all appended bytes durable.
    fn sync(&self) -> Result<()>;
}

/// File-backed storage; positioned I/O serialized through a mutex.
pub struct FileStorage {
    file: Mutex<File>,
}

impl FileStorage {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .wrap_err_with(|| format!("opening storage file {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl StorageBackend for FileStorage {
    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut file = self.file.lock();
        let end = file.seek(SeekFrom::End(0))?;
        if offset.saturating_add(len as u64) > end {
            return Err(StorageError::PageNotFound { offset }.into());
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0_u8; len];
        file.read_exact(&mut buf)
            .wrap_err_with(|| format!("reading {len} bytes at offset {offset}"))?;
        Ok(buf)
    }

    fn append(&self, bytes: &[u8]) -> Result<u64> {
        let mut file = self.file.lock();
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(bytes)
            .wrap_err_with(|| format!("appending {} bytes at offset {offset}", bytes.len()))?;
        Ok(offset)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.lock().seek(SeekFrom::End(0))?)
    }

    fn sync(&self) -> Result<()> {
        self.file.lock().sync_data().wrap_err("syncing storage file")
    }
}

/// In-memory storage for tests and ephemeral stores.
#[derive(Default)]
pub struct MemoryStorage {
    buf: RwLock<Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let buf = self.buf.read();
        let start = offset as usize;
        let end = start.saturating_add(len);
        if end > buf.len() {
            return Err(StorageError::PageNotFound { offset }.into());
        }
        Ok(buf[start..end].to_vec())
    }

    fn append(&self, bytes: &[u8]) -> Result<u64> {
        let mut buf = self.buf.write();
        let offset = buf.len() as u64;
        buf.extend_from_slice(bytes);
        Ok(offset)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.buf.read().len() as u64)
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_contract(backend: &dyn StorageBackend) {
        assert!(backend.is_empty().unwrap());

        let first = backend.append(b"alpha").unwrap();
        let second = backend.append(b"beta").unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, 5);
        assert_eq!(backend.len().unwrap(), 9);

        assert_eq!(backend.read(0, 5).unwrap(), b"alpha");
        assert_eq!(backend.read(5, 4).unwrap(), b"beta");

        let err = backend.read(5, 100).unwrap_err();
        assert!(crate::error::is_storage_error(&err, |e| matches!(
            e,
            StorageError::PageNotFound { offset: 5 }
        )));

        backend.sync().unwrap();
    }

    #[test]
    fn memory_storage_contract() {
        backend_contract(&MemoryStorage::new());
    }

    #[test]
    fn file_storage_contract() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(&dir.path().join("pages")).unwrap();
        backend_contract(&storage);
    }

    #[test]
    fn file_storage_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages");

        {
            let storage = FileStorage::open(&path).unwrap();
            storage.append(b"durable").unwrap();
            storage.sync().unwrap();
        }

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.read(0, 7).unwrap(), b"durable");
    }
}
