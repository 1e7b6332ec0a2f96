//! # Page Framing Primitives
//!
//! Variable-length encodings shared by all page serializers:
//!
//! - [`varint`]: prefix varints for lengths, counts, keys and offsets
//! - zigzag mapping so signed logical page keys (including the `-1` null
//!   sentinel) frame compactly

pub mod varint;

pub use varint::{
    decode_varint, encode_varint, put_varint, put_varint_i64, take_varint, take_varint_i64,
    varint_len, zigzag_decode, zigzag_encode,
};
