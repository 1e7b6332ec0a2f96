//! # Records and the Pluggable Record Codec
//!
//! The engine stores opaque records: the application-level byte encoding is
//! a collaborator concern, supplied as a [`RecordCodec`] in the resource
//! configuration. A key/value page only frames the entry table around
//! whatever bytes the codec produces.
//!
//! A [`Record`] carries the opaque payload plus an optional extended
//! positional identifier. Position ids are persisted only when the resource
//! was created with `store_position_ids`; the [`CodecContext`] passed to
//! the codec says whether they are expected on the wire.
//!
//! Codec failures are [`StorageError::Serialization`] and abort the
//! enclosing write transaction.

use eyre::Result;
use smallvec::SmallVec;

use crate::encoding::{put_varint, take_varint};
use crate::error::StorageError;

/// Inline capacity for position ids; typical ids are a few bytes.
pub type PositionId = SmallVec<[u8; 16]>;

/// One opaque record as stored in a key/value page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub payload: Vec<u8>,
    pub position_id: Option<PositionId>,
}

impl Record {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            position_id: None,
        }
    }

    pub fn with_position_id(payload: impl Into<Vec<u8>>, id: impl AsRef<[u8]>) -> Self {
        Self {
            payload: payload.into(),
            position_id: Some(PositionId::from_slice(id.as_ref())),
        }
    }
}

/// Per-call context handed to the codec.
#[derive(Debug, Clone, Copy)]
pub struct CodecContext {
    /// Revision the containing page belongs to.
    pub revision: u64,
    /// Whether position ids are stored per record in this resource.
    pub store_position_ids: bool,
}

/// Collaborator-supplied record byte encoding.
///
/// Implementations must be deterministic: `decode(encode(r)) == r` for any
/// record they accept.
pub trait RecordCodec: Send + Sync {
    fn encode(&self, record: &Record, ctx: &CodecContext, out: &mut Vec<u8>) -> Result<()>;

    fn decode(&self, input: &mut &[u8], ctx: &CodecContext) -> Result<Record>;
}

/// Default codec: varint length framing of the raw payload, followed by the
/// position id (length-prefixed, `0` = absent) when the resource stores
/// position ids.
#[derive(Debug, Default)]
pub struct PlainCodec;

impl RecordCodec for PlainCodec {
    fn encode(&self, record: &Record, ctx: &CodecContext, out: &mut Vec<u8>) -> Result<()> {
        put_varint(out, record.payload.len() as u64);
        out.extend_from_slice(&record.payload);

        if ctx.store_position_ids {
            match &record.position_id {
                Some(id) => {
                    put_varint(out, id.len() as u64 + 1);
                    out.extend_from_slice(id);
                }
                None => put_varint(out, 0),
            }
        }
        Ok(())
    }

    fn decode(&self, input: &mut &[u8], ctx: &CodecContext) -> Result<Record> {
        let len = take_varint(input)
            .map_err(|e| StorageError::Serialization(format!("record length: {e}")))?
            as usize;
        if input.len() < len {
            return Err(StorageError::Serialization(format!(
                "record payload truncated: need {len}, have {}",
                input.len()
            ))
            .into());
        }
        let payload = input[..len].to_vec();
        *input = &input[len..];

        let position_id = if ctx.store_position_ids {
            let tagged = take_varint(input)
                .map_err(|e| StorageError::Serialization(format!("position id length: {e}")))?
                as usize;
            if tagged == 0 {
                None
            } else {
                let id_len = tagged - 1;
                if input.len() < id_len {
                    return Err(
                        StorageError::Serialization("position id truncated".into()).into()
                    );
                }
                let id = PositionId::from_slice(&input[..id_len]);
                *input = &input[id_len..];
                Some(id)
            }
        } else {
            None
        };

        Ok(Record {
            payload,
            position_id,
        })
    }
}
