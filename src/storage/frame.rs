//! # Checksummed Page Frames
//!
//! Every serialized page lands in the data file as one frame:
//!
//! ```text
//! [body_len: u32 LE][crc64: u64 LE][body bytes]
//! ```
//!
//! The CRC-64/ECMA-182 checksum covers the body, detecting both corruption
//! and torn writes. `read_frame` re-verifies length and checksum on every
//! read; a mismatch is `Corruption`, a read past the end of the backend is
//! `PageNotFound`. Neither is ever silently recovered.

use crc::{Crc, CRC_64_ECMA_182};
use eyre::Result;

use crate::config::PAGE_FRAME_PREFIX;
use crate::error::StorageError;
use crate::storage::StorageBackend;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Append `body` as a frame, returning `(frame_offset, body_len)`, the
/// durable location a [`PageReference`](crate::page::PageReference)
/// carries.
pub fn write_frame(backend: &dyn StorageBackend, body: &[u8]) -> Result<(u64, u32)> {
    let mut frame = Vec::with_capacity(PAGE_FRAME_PREFIX + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&CRC64.checksum(body).to_le_bytes());
    frame.extend_from_slice(body);

    let offset = backend.append(&frame)?;
    Ok((offset, body.len() as u32))
}

/// Read and verify the frame at `offset` whose body is `body_len` bytes.
pub fn read_frame(backend: &dyn StorageBackend, offset: u64, body_len: u32) -> Result<Vec<u8>> {
    let bytes = backend.read(offset, PAGE_FRAME_PREFIX + body_len as usize)?;

    let stored_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if stored_len != body_len {
        return Err(StorageError::Corruption(format!(
            "frame at offset {offset}: stored length {stored_len} != referenced length {body_len}"
        ))
        .into());
    }

    let stored_crc = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
    let body = bytes[PAGE_FRAME_PREFIX..].to_vec();
    let actual_crc = CRC64.checksum(&body);
    if stored_crc != actual_crc {
        return Err(StorageError::Corruption(format!(
            "frame at offset {offset}: checksum mismatch"
        ))
        .into());
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn frame_round_trip() {
        let backend = MemoryStorage::new();
        let (offset, len) = write_frame(&backend, b"page body").unwrap();
        assert_eq!(read_frame(&backend, offset, len).unwrap(), b"page body");
    }

    #[test]
    fn frames_append_sequentially() {
        let backend = MemoryStorage::new();
        let (first, first_len) = write_frame(&backend, b"one").unwrap();
        let (second, second_len) = write_frame(&backend, b"twotwo").unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, PAGE_FRAME_PREFIX as u64 + 3);
        assert_eq!(read_frame(&backend, first, first_len).unwrap(), b"one");
        assert_eq!(read_frame(&backend, second, second_len).unwrap(), b"twotwo");
    }

    #[test]
    fn flipped_body_byte_is_corruption() {
        let backend = MemoryStorage::new();
        let (offset, len) = write_frame(&backend, b"sensitive").unwrap();

        // Flip one byte of the body behind the backend's back.
        let corrupted_at = offset + PAGE_FRAME_PREFIX as u64 + 2;
        let mut raw = backend.read(0, backend.len().unwrap() as usize).unwrap();
        raw[corrupted_at as usize] ^= 0xFF;
        let tampered = MemoryStorage::new();
        tampered.append(&raw).unwrap();

        let err = read_frame(&tampered, offset, len).unwrap_err();
        assert!(crate::error::is_storage_error(&err, |e| matches!(
            e,
            StorageError::Corruption(_)
        )));
    }

    #[test]
    fn mismatched_length_is_corruption() {
        let backend = MemoryStorage::new();
        let (offset, _) = write_frame(&backend, b"body").unwrap();
        // Enough trailing bytes exist for the bigger read to succeed.
        write_frame(&backend, b"padding-padding").unwrap();

        let err = read_frame(&backend, offset, 8).unwrap_err();
        assert!(crate::error::is_storage_error(&err, |e| matches!(
            e,
            StorageError::Corruption(_)
        )));
    }

    #[test]
    fn read_past_end_is_page_not_found() {
        let backend = MemoryStorage::new();
        let err = read_frame(&backend, 4096, 10).unwrap_err();
        assert!(crate::error::is_storage_error(&err, |e| matches!(
            e,
            StorageError::PageNotFound { offset: 4096 }
        )));
    }
}
