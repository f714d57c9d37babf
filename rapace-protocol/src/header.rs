//! RPC header codec (C4): the variable-width prefix that carries
//! `{direction, msg_type, req_id}` (and, in the long form, forwarded/body/
//! data region lengths) ahead of the schema-encoded body.
//!
//! Two wire forms exist; see DESIGN.md for why the long form (§4.4/§6.3) is
//! this crate's default and the short form (§4.3/§6.2) is carried as an
//! alternate `HeaderFormat` for wire-compat connections.

use std::fmt;

use rapace_wire::int::{decode_uint, encode_uint, uint_bytes, IntCodecError};

/// Which of the two wire encodings a connection uses for its RPC headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    Short,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCodecError {
    Truncated { wanted: usize, available: usize },
    /// A value did not fit the declared/available byte width at encode time.
    ValueTooWide { value: u64, max_bytes: usize },
}

impl fmt::Display for HeaderCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderCodecError::Truncated { wanted, available } => write!(
                f,
                "truncated RPC header: wanted {wanted} bytes, {available} available"
            ),
            HeaderCodecError::ValueTooWide { value, max_bytes } => write!(
                f,
                "value {value} does not fit in {max_bytes} bytes"
            ),
        }
    }
}

impl std::error::Error for HeaderCodecError {}

impl From<IntCodecError> for HeaderCodecError {
    fn from(e: IntCodecError) -> Self {
        match e {
            IntCodecError::Truncated { wanted, available } => {
                HeaderCodecError::Truncated { wanted, available }
            }
            IntCodecError::VarintTooLong => HeaderCodecError::Truncated {
                wanted: 0,
                available: 0,
            },
        }
    }
}

/// §4.3/§6.2: `1 + len_a + len_b` bytes, used by wire-compat clients that
/// never carry forwarded/blob regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortHeader {
    pub direction: Direction,
    pub msg_type: u64,
    pub req_id: u64,
}

impl ShortHeader {
    pub fn encode(&self) -> Result<Vec<u8>, HeaderCodecError> {
        let len_a = uint_bytes(self.msg_type).max(1);
        let len_b = uint_bytes(self.req_id).max(1);
        if len_a > 8 {
            return Err(HeaderCodecError::ValueTooWide {
                value: self.msg_type,
                max_bytes: 8,
            });
        }
        if len_b > 8 {
            return Err(HeaderCodecError::ValueTooWide {
                value: self.req_id,
                max_bytes: 8,
            });
        }
        let dir_bit = match self.direction {
            Direction::Request => 1u8,
            Direction::Response => 0u8,
        };
        let byte0 = (((len_a - 1) as u8) << 5) | (((len_b - 1) as u8) << 2) | (dir_bit << 1);

        let mut out = Vec::with_capacity(1 + len_a + len_b);
        out.push(byte0);
        let mut msg_type_buf = vec![0u8; len_a];
        encode_uint(&mut msg_type_buf, len_a, self.msg_type);
        out.extend_from_slice(&msg_type_buf);
        let mut req_id_buf = vec![0u8; len_b];
        encode_uint(&mut req_id_buf, len_b, self.req_id);
        out.extend_from_slice(&req_id_buf);
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<(usize, ShortHeader), HeaderCodecError> {
        if buf.is_empty() {
            return Err(HeaderCodecError::Truncated {
                wanted: 1,
                available: 0,
            });
        }
        let byte0 = buf[0];
        let len_a = (((byte0 >> 5) & 0x7) + 1) as usize;
        let len_b = (((byte0 >> 2) & 0x7) + 1) as usize;
        let dir_bit = (byte0 >> 1) & 0x1;
        let direction = if dir_bit == 1 {
            Direction::Request
        } else {
            Direction::Response
        };

        let mut offset = 1usize;
        let msg_type = decode_uint(&buf[offset..], len_a)?;
        offset += len_a;
        let req_id = decode_uint(&buf[offset..], len_b)?;
        offset += len_b;

        Ok((
            offset,
            ShortHeader {
                direction,
                msg_type,
                req_id,
            },
        ))
    }
}

/// Reserved `package_type` values in the long header's direction/control nibble.
pub mod package_type {
    pub const REQUEST: u8 = 0;
    pub const RESPONSE: u8 = 1;
    /// A status report in place of the call's real response: the allocate,
    /// parse, or handler stage failed before a schema-shaped response body
    /// could be produced (`rapace-core`'s server dispatch, spec.md §4.7/§7).
    pub const STATUS: u8 = 2;
}

/// §4.4/§6.3: flag-byte-prefixed header carrying the forwarded/body/data
/// blob region lengths the short header has no room for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongHeader {
    pub package_type: u8,
    pub msg_type: u64,
    pub req_id: u64,
    pub fwd_len: u64,
    pub body_len: u64,
    pub data_len: u64,
}

impl LongHeader {
    pub fn direction(&self) -> Option<Direction> {
        match self.package_type {
            package_type::REQUEST => Some(Direction::Request),
            package_type::RESPONSE => Some(Direction::Response),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, HeaderCodecError> {
        let msg_type_bytes = uint_bytes(self.msg_type).max(1);
        let req_id_bytes = uint_bytes(self.req_id).max(1);
        if msg_type_bytes > 4 {
            return Err(HeaderCodecError::ValueTooWide {
                value: self.msg_type,
                max_bytes: 4,
            });
        }
        if req_id_bytes > 8 {
            return Err(HeaderCodecError::ValueTooWide {
                value: self.req_id,
                max_bytes: 8,
            });
        }
        let fwd_bytes = if self.fwd_len == 0 { 0 } else { uint_bytes(self.fwd_len) };
        let body_bytes = if self.body_len == 0 {
            0
        } else {
            uint_bytes(self.body_len)
        };
        let data_bytes = if self.data_len == 0 {
            0
        } else {
            uint_bytes(self.data_len)
        };
        if fwd_bytes > 3 {
            return Err(HeaderCodecError::ValueTooWide {
                value: self.fwd_len,
                max_bytes: 3,
            });
        }
        if body_bytes > 3 {
            return Err(HeaderCodecError::ValueTooWide {
                value: self.body_len,
                max_bytes: 3,
            });
        }
        if data_bytes > 7 {
            return Err(HeaderCodecError::ValueTooWide {
                value: self.data_len,
                max_bytes: 7,
            });
        }

        let byte0 = ((self.package_type & 0xF) << 4)
            | (((msg_type_bytes - 1) as u8 & 0x3) << 2)
            | (fwd_bytes as u8 & 0x3);
        let byte1 = (((req_id_bytes - 1) as u8 & 0x7) << 5)
            | ((body_bytes as u8 & 0x3) << 3)
            | (data_bytes as u8 & 0x7);

        let mut out = vec![byte0, byte1];
        push_uint(&mut out, msg_type_bytes, self.msg_type);
        push_uint(&mut out, req_id_bytes, self.req_id);
        if fwd_bytes > 0 {
            push_uint(&mut out, fwd_bytes, self.fwd_len);
        }
        if body_bytes > 0 {
            push_uint(&mut out, body_bytes, self.body_len);
        }
        if data_bytes > 0 {
            push_uint(&mut out, data_bytes, self.data_len);
        }
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<(usize, LongHeader), HeaderCodecError> {
        if buf.len() < 2 {
            return Err(HeaderCodecError::Truncated {
                wanted: 2,
                available: buf.len(),
            });
        }
        let byte0 = buf[0];
        let byte1 = buf[1];

        let package_type = (byte0 >> 4) & 0xF;
        let msg_type_bytes = (((byte0 >> 2) & 0x3) + 1) as usize;
        let fwd_bytes = (byte0 & 0x3) as usize;
        let req_id_bytes = (((byte1 >> 5) & 0x7) + 1) as usize;
        let body_bytes = ((byte1 >> 3) & 0x3) as usize;
        let data_bytes = (byte1 & 0x7) as usize;

        let mut offset = 2usize;
        let msg_type = decode_uint(&buf[offset..], msg_type_bytes)?;
        offset += msg_type_bytes;
        let req_id = decode_uint(&buf[offset..], req_id_bytes)?;
        offset += req_id_bytes;
        let fwd_len = if fwd_bytes > 0 {
            let v = decode_uint(&buf[offset..], fwd_bytes)?;
            offset += fwd_bytes;
            v
        } else {
            0
        };
        let body_len = if body_bytes > 0 {
            let v = decode_uint(&buf[offset..], body_bytes)?;
            offset += body_bytes;
            v
        } else {
            0
        };
        let data_len = if data_bytes > 0 {
            let v = decode_uint(&buf[offset..], data_bytes)?;
            offset += data_bytes;
            v
        } else {
            0
        };

        Ok((
            offset,
            LongHeader {
                package_type,
                msg_type,
                req_id,
                fwd_len,
                body_len,
                data_len,
            },
        ))
    }
}

fn push_uint(out: &mut Vec<u8>, n: usize, v: u64) {
    let mut buf = vec![0u8; n];
    encode_uint(&mut buf, n, v);
    out.extend_from_slice(&buf);
}
