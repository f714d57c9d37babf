//! TLV field head encoding: a single head byte (plus optional escape bytes)
//! carries a field id and a value length.
//!
//! Head byte layout (bit 7 is MSB):
//!
//! ```text
//! | bit 7                 | bits 6..4        | bits 3..0          |
//! | external-length flag  | length field `n` | field-id encoding  |
//! ```
//!
//! - bit 7 = 0: the value is `n+1` bytes long, inline (1..8).
//! - bit 7 = 1: `n+1` bytes of external big-endian length follow.
//! - field-id bits `f >= 2`: inline id, `field_id = f - 2` (0..13).
//! - field-id bits `f in {0, 1}`: `f+1` bytes of external field id follow (0..65535).

use std::fmt;

use crate::int::{decode_uint, encode_uint, uint_bytes, IntCodecError};

/// Largest field id representable inline in the head byte.
pub const MAX_INLINE_FIELD_ID: u32 = 13;
/// Largest field id representable via the external 1- or 2-byte escape.
pub const MAX_FIELD_ID: u32 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCodecError {
    /// Buffer ended before the head byte's declared escape bytes were read.
    Truncated { wanted: usize, available: usize },
    /// `field_id` exceeds [`MAX_FIELD_ID`].
    FieldIdOutOfRange(u64),
}

impl fmt::Display for FieldCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldCodecError::Truncated { wanted, available } => write!(
                f,
                "truncated field head: wanted {wanted} bytes, {available} available"
            ),
            FieldCodecError::FieldIdOutOfRange(id) => {
                write!(f, "field id {id} exceeds maximum of {MAX_FIELD_ID}")
            }
        }
    }
}

impl std::error::Error for FieldCodecError {}

impl From<IntCodecError> for FieldCodecError {
    fn from(e: IntCodecError) -> Self {
        match e {
            IntCodecError::Truncated { wanted, available } => {
                FieldCodecError::Truncated { wanted, available }
            }
            IntCodecError::VarintTooLong => {
                FieldCodecError::Truncated { wanted: 0, available: 0 }
            }
        }
    }
}

/// Encode a field head for `field_id`/`length`, choosing the smallest valid
/// representation: inline length when the value itself is 1..8 bytes long,
/// else an external-length escape; inline id when `field_id <= 13`, else an
/// external-id escape.
pub fn encode_field(field_id: u32, length: u64) -> Result<Vec<u8>, FieldCodecError> {
    if field_id as u64 > MAX_FIELD_ID as u64 {
        return Err(FieldCodecError::FieldIdOutOfRange(field_id as u64));
    }

    let mut out = Vec::with_capacity(4);
    let mut head: u8 = 0;

    // Inline form covers values whose own byte length is 1..8: the head
    // byte's `n` field *is* that length, minus one. A zero length (e.g. an
    // empty `bytes` value) has no inline representation — 0 isn't in 1..8 —
    // so it always takes the external-length escape, same as anything > 8.
    let (ext_length, n) = if length >= 1 && length <= 8 {
        (false, length as usize)
    } else {
        (true, uint_bytes(length))
    };
    if ext_length {
        head |= 1 << 7;
    }
    head |= (((n - 1) & 0x7) as u8) << 4;

    let (f_code, ext_id_bytes): (u8, Option<Vec<u8>>) = if field_id <= MAX_INLINE_FIELD_ID {
        ((field_id + 2) as u8, None)
    } else {
        let flen = if (field_id as u64) < 256 { 1 } else { 2 };
        let mut buf = vec![0u8; flen];
        encode_uint(&mut buf, flen, field_id as u64);
        ((flen - 1) as u8, Some(buf))
    };
    head |= f_code & 0xF;

    out.push(head);
    if ext_length {
        let mut len_buf = vec![0u8; n];
        encode_uint(&mut len_buf, n, length);
        out.extend_from_slice(&len_buf);
    }
    if let Some(id_buf) = ext_id_bytes {
        out.extend_from_slice(&id_buf);
    }
    Ok(out)
}

/// Decode a field head from the front of `buf`.
///
/// Returns `(header_bytes_consumed, field_id, length)`.
pub fn decode_field(buf: &[u8]) -> Result<(usize, u32, u64), FieldCodecError> {
    if buf.is_empty() {
        return Err(FieldCodecError::Truncated {
            wanted: 1,
            available: 0,
        });
    }
    let head = buf[0];
    let ext_length = head & 0x80 != 0;
    let n = (((head >> 4) & 0x7) + 1) as usize;
    let f = head & 0xF;

    let mut offset = 1usize;

    let length = if ext_length {
        let len = decode_uint(&buf[offset..], n)?;
        offset += n;
        len
    } else {
        n as u64
    };

    let field_id = if f >= 2 {
        (f - 2) as u32
    } else {
        let flen = (f + 1) as usize;
        let id = decode_uint(&buf[offset..], flen)?;
        offset += flen;
        id as u32
    };

    Ok((offset, field_id, length))
}
