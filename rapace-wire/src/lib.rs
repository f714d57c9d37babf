//! Integer, TLV field, and outer frame codecs for the rapace RPC wire format.
//!
//! This crate is the bottom of the stack: `rapace-protocol` builds header
//! variants on top of it, `rapace-schema` builds the FieldStruct
//! reader/writer on top of that. Nothing in here knows about schemas,
//! services, or connections — just bytes in, bytes out.

pub mod field;
pub mod frame;
pub mod int;

pub use field::{decode_field, encode_field, FieldCodecError};
pub use frame::{decode_frame_header, encode_frame_header, FrameCodecError, FrameHeader};
pub use int::{
    decode_uint, decode_varint, encode_uint, encode_uint_min, encode_varint, pack_uint_list,
    uint_bytes, unpack_uint_list, zigzag_decode, zigzag_encode, IntCodecError,
};
