//! # Variable-Length Integer Encoding
//!
//! Prefix varints used throughout the page byte format for entry counts,
//! key deltas, file offsets and frame lengths. The leading byte announces
//! how many bytes follow, so small values (the overwhelming majority of
//! counts and deltas) cost a single byte:
//!
//! | Value Range              | Bytes | Marker                          |
//! |--------------------------|-------|---------------------------------|
//! | 0 - 240                  | 1     | value itself                    |
//! | 241 - 2287               | 2     | 241..=248                       |
//! | 2288 - 67823             | 3     | 249                             |
//! | 67824 - 16777215         | 4     | 250                             |
//! | 16777216 - 4294967295    | 5     | 251                             |
//! | 4294967296 - u64::MAX    | 9     | 255 + 8-byte big-endian         |
//!
//! Markers 252-254 are reserved; decoding one is an error.
//!
//! Signed values (logical page keys, where `-1` is the null sentinel) are
//! zigzag-mapped first so values near zero stay in the 1-byte range.
//!
//! `put_varint`/`take_varint` are the cursor-style helpers the page
//! serializers use: append to a `Vec<u8>`, or consume from the front of a
//! `&[u8]` advancing the slice.

use eyre::{bail, ensure, Result};

/// Encoded size of `value` without encoding it.
pub fn varint_len(value: u64) -> usize {
    if value <= 240 {
        1
    } else if value <= 2287 {
        2
    } else if value <= 67823 {
        3
    } else if value <= 0xFF_FFFF {
        4
    } else if value <= 0xFFFF_FFFF {
        5
    } else {
        9
    }
}

/// Encode `value` into `buf`, returning the number of bytes written.
/// `buf` must hold at least `varint_len(value)` bytes.
pub fn encode_varint(value: u64, buf: &mut [u8]) -> usize {
    if value <= 240 {
        buf[0] = value as u8;
        1
    } else if value <= 2287 {
        let v = value - 240;
        buf[0] = ((v >> 8) + 241) as u8;
        buf[1] = (v & 0xFF) as u8;
        2
    } else if value <= 67823 {
        let v = value - 2288;
        buf[0] = 249;
        buf[1] = (v >> 8) as u8;
        buf[2] = (v & 0xFF) as u8;
        3
    } else if value <= 0xFF_FFFF {
        buf[0] = 250;
        buf[1] = (value >> 16) as u8;
        buf[2] = (value >> 8) as u8;
        buf[3] = value as u8;
        4
    } else if value <= 0xFFFF_FFFF {
        buf[0] = 251;
        buf[1] = (value >> 24) as u8;
        buf[2] = (value >> 16) as u8;
        buf[3] = (value >> 8) as u8;
        buf[4] = value as u8;
        5
    } else {
        buf[0] = 255;
        buf[1..9].copy_from_slice(&value.to_be_bytes());
        9
    }
}

/// Decode a varint from the front of `buf`, returning `(value, bytes_read)`.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize)> {
    ensure!(!buf.is_empty(), "empty buffer for varint decode");

    let first = buf[0];

    if first <= 240 {
        Ok((first as u64, 1))
    } else if first <= 248 {
        ensure!(buf.len() >= 2, "truncated 2-byte varint");
        let value = 240 + ((first as u64 - 241) << 8) + buf[1] as u64;
        Ok((value, 2))
    } else if first == 249 {
        ensure!(buf.len() >= 3, "truncated 3-byte varint");
        let value = 2288 + ((buf[1] as u64) << 8) + buf[2] as u64;
        Ok((value, 3))
    } else if first == 250 {
        ensure!(buf.len() >= 4, "truncated 4-byte varint");
        let value = ((buf[1] as u64) << 16) + ((buf[2] as u64) << 8) + buf[3] as u64;
        Ok((value, 4))
    } else if first == 251 {
        ensure!(buf.len() >= 5, "truncated 5-byte varint");
        let value = ((buf[1] as u64) << 24)
            + ((buf[2] as u64) << 16)
            + ((buf[3] as u64) << 8)
            + buf[4] as u64;
        Ok((value, 5))
    } else if first == 255 {
        ensure!(buf.len() >= 9, "truncated 9-byte varint");
        let value = u64::from_be_bytes(buf[1..9].try_into().unwrap()); // INVARIANT: length validated above
        Ok((value, 9))
    } else {
        bail!("invalid varint marker: {}", first)
    }
}

/// Append `value` to `out`.
pub fn put_varint(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0_u8; 9];
    let written = encode_varint(value, &mut buf);
    out.extend_from_slice(&buf[..written]);
}

/// Consume a varint from the front of `input`, advancing the slice.
pub fn take_varint(input: &mut &[u8]) -> Result<u64> {
    let (value, read) = decode_varint(input)?;
    *input = &input[read..];
    Ok(value)
}

/// Map a signed value onto the unsigned varint space: -1 -> 1, 1 -> 2, ...
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Append a zigzag-mapped signed value to `out`.
pub fn put_varint_i64(out: &mut Vec<u8>, value: i64) {
    put_varint(out, zigzag_encode(value));
}

/// Consume a zigzag-mapped signed value from the front of `input`.
pub fn take_varint_i64(input: &mut &[u8]) -> Result<i64> {
    Ok(zigzag_decode(take_varint(input)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_len_boundaries() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(240), 1);
        assert_eq!(varint_len(241), 2);
        assert_eq!(varint_len(2287), 2);
        assert_eq!(varint_len(2288), 3);
        assert_eq!(varint_len(67823), 3);
        assert_eq!(varint_len(67824), 4);
        assert_eq!(varint_len(0xFF_FFFF), 4);
        assert_eq!(varint_len(0x100_0000), 5);
        assert_eq!(varint_len(u32::MAX as u64), 5);
        assert_eq!(varint_len(u32::MAX as u64 + 1), 9);
        assert_eq!(varint_len(u64::MAX), 9);
    }

    #[test]
    fn round_trip_boundary_values() {
        let values = [
            0,
            1,
            240,
            241,
            2287,
            2288,
            67823,
            67824,
            0xFF_FFFF,
            0x100_0000,
            u32::MAX as u64,
            u32::MAX as u64 + 1,
            u64::MAX,
        ];

        for value in values {
            let mut buf = [0_u8; 9];
            let written = encode_varint(value, &mut buf);
            assert_eq!(written, varint_len(value));

            let (decoded, read) = decode_varint(&buf).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(read, written);
        }
    }

    #[test]
    fn decode_empty_buffer_fails() {
        let result = decode_varint(&[]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty buffer"));
    }

    #[test]
    fn decode_truncated_fails() {
        let result = decode_varint(&[251, 0, 0]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("truncated"));
    }

    #[test]
    fn decode_reserved_marker_fails() {
        for marker in 252..=254_u8 {
            let result = decode_varint(&[marker, 0]);
            assert!(result.is_err());
            assert!(result
                .unwrap_err()
                .to_string()
                .contains("invalid varint marker"));
        }
    }

    #[test]
    fn cursor_helpers_advance() {
        let mut out = Vec::new();
        put_varint(&mut out, 5);
        put_varint(&mut out, 1000);
        put_varint(&mut out, u64::MAX);

        let mut input = out.as_slice();
        assert_eq!(take_varint(&mut input).unwrap(), 5);
        assert_eq!(take_varint(&mut input).unwrap(), 1000);
        assert_eq!(take_varint(&mut input).unwrap(), u64::MAX);
        assert!(input.is_empty());
    }

    #[test]
    fn zigzag_keeps_small_magnitudes_small() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);

        for value in [-1_i64, 0, 1, -64, 64, i64::MIN, i64::MAX] {
            assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        }
    }

    #[test]
    fn signed_cursor_round_trip() {
        let mut out = Vec::new();
        put_varint_i64(&mut out, -1);
        put_varint_i64(&mut out, 42);

        let mut input = out.as_slice();
        assert_eq!(take_varint_i64(&mut input).unwrap(), -1);
        assert_eq!(take_varint_i64(&mut input).unwrap(), 42);
    }
}
