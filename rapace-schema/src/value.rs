//! FieldStruct reader/writer (C6): walks a [`Schema`]'s field table,
//! dispatching per primitive/list/nested type to the codecs in
//! `rapace-wire`.

use std::collections::BTreeMap;
use std::sync::Arc;

use rapace_protocol::error::{ProtocolError, SchemaError};
use rapace_wire::field::{decode_field, encode_field};
use rapace_wire::int::{
    decode_uint, decode_varint, encode_uint_min, encode_varint, pack_uint_list, unpack_uint_list,
    zigzag_decode, zigzag_encode,
};

use crate::error::FieldStructError;
use crate::model::{DefaultValue, Schema, SchemaRegistry, TypeTag};

/// Present-field-count prefix is a single byte; a struct may carry at most
/// this many present fields.
pub const MAX_PRESENT_FIELDS: usize = 255;

/// A typed value for one present field in a [`FieldStruct`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(String),
    Bytes(Vec<u8>),
    /// Out-of-band bytes; carried in the frame's `data` region on the wire.
    Blob(Vec<u8>),
    Struct(Box<FieldStruct>),
    ListUint(Vec<u64>),
    ListInt(Vec<i64>),
    ListString(Vec<String>),
    ListBytes(Vec<Vec<u8>>),
    ListStruct(Vec<FieldStruct>),
}

/// A schema-shaped message instance: which fields are present (the map's
/// keys) and their values, plus the schema used to interpret them.
#[derive(Debug, Clone)]
pub struct FieldStruct {
    schema: Arc<Schema>,
    values: BTreeMap<u32, FieldValue>,
}

/// Result of encoding a [`FieldStruct`]: the schema-encoded body, plus any
/// blob bytes that belong in the frame's separate `data` region, in the
/// order their fields were encountered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedBody {
    pub body: Vec<u8>,
    pub data: Vec<u8>,
}

impl FieldStruct {
    pub fn new(schema: Arc<Schema>) -> Self {
        FieldStruct {
            schema,
            values: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Marks `uid` present with `value`. Does not validate `value` against
    /// the schema's declared type for `uid` — callers that build instances
    /// from the schema's own accessors get that for free; callers feeding
    /// raw values are responsible for matching the descriptor's `TypeTag`.
    pub fn set(&mut self, uid: u32, value: FieldValue) {
        self.values.insert(uid, value);
    }

    pub fn get(&self, uid: u32) -> Option<&FieldValue> {
        self.values.get(&uid)
    }

    pub fn is_present(&self, uid: u32) -> bool {
        self.values.contains_key(&uid)
    }

    /// Encode this instance's body (and any blob data) per spec.md §4.6.
    /// Fields are emitted in ascending `uid` order.
    pub fn encode(&self) -> Result<EncodedBody, FieldStructError> {
        if self.values.len() > MAX_PRESENT_FIELDS {
            return Err(FieldStructError::TooManyFields(self.values.len()));
        }
        let mut body = Vec::new();
        let mut data = Vec::new();
        body.push(self.values.len() as u8);
        for (&uid, value) in self.values.iter() {
            let mut value_bytes = Vec::new();
            encode_value(value, &mut value_bytes, &mut data)?;
            let head = encode_field(uid, value_bytes.len() as u64)?;
            body.extend_from_slice(&head);
            body.extend_from_slice(&value_bytes);
        }
        Ok(EncodedBody { body, data })
    }

    /// Decode a `FieldStruct` of `schema`'s shape from `body`/`data`.
    /// Returns `(body_bytes_consumed, data_bytes_consumed, instance)`.
    ///
    /// Unknown field uids are skipped by consuming their declared body
    /// length (forward compatibility); this does not track `data`-region
    /// consumption for an unknown field, matching spec.md §4.6's forward
    /// compatibility contract, which only speaks to the body stream.
    pub fn decode(
        schema: Arc<Schema>,
        registry: &SchemaRegistry,
        body: &[u8],
        data: &[u8],
    ) -> Result<(usize, usize, FieldStruct), FieldStructError> {
        if body.is_empty() {
            return Err(FieldStructError::Protocol(ProtocolError::TruncatedFrame));
        }
        let n = body[0] as usize;
        let mut offset = 1usize;
        let mut data_offset = 0usize;
        let mut values = BTreeMap::new();

        for _ in 0..n {
            let (consumed, uid, length) = decode_field(&body[offset..])?;
            offset += consumed;
            let length = length as usize;
            if offset + length > body.len() {
                return Err(FieldStructError::Protocol(ProtocolError::LengthOverrun {
                    declared: length as u64,
                    remaining: (body.len() - offset) as u64,
                }));
            }
            let value_bytes = &body[offset..offset + length];

            match schema.field(uid) {
                Some(desc) => {
                    let (value, consumed_data) =
                        decode_value(desc.type_tag(), value_bytes, &data[data_offset..], registry)?;
                    values.insert(uid, value);
                    data_offset += consumed_data;
                }
                None => {
                    tracing::debug!(uid, "skipping unknown field uid for forward compatibility");
                }
            }
            offset += length;
        }

        for desc in schema.fields() {
            if !values.contains_key(&desc.uid()) {
                if let Some(default) = desc.default() {
                    values.insert(desc.uid(), default_to_value(default));
                }
            }
        }

        Ok((
            offset,
            data_offset,
            FieldStruct {
                schema,
                values,
            },
        ))
    }
}

impl PartialEq for FieldStruct {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name() == other.schema.name() && self.values == other.values
    }
}

fn default_to_value(default: &DefaultValue) -> FieldValue {
    match default {
        DefaultValue::Bool(b) => FieldValue::Bool(*b),
        DefaultValue::Int(i) => FieldValue::Int(*i),
        DefaultValue::Uint(u) => FieldValue::Uint(*u),
        DefaultValue::String(s) => FieldValue::String(s.clone()),
        DefaultValue::Bytes(b) => FieldValue::Bytes(b.clone()),
    }
}

fn encode_value(
    value: &FieldValue,
    out: &mut Vec<u8>,
    data: &mut Vec<u8>,
) -> Result<(), FieldStructError> {
    match value {
        FieldValue::Bool(b) => out.extend(encode_uint_min(*b as u64)),
        FieldValue::Int(i) => out.extend(encode_uint_min(zigzag_encode(*i))),
        FieldValue::Uint(u) => out.extend(encode_uint_min(*u)),
        FieldValue::String(s) => {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        FieldValue::Bytes(b) => out.extend_from_slice(b),
        FieldValue::Blob(b) => {
            out.extend(encode_varint(b.len() as u64));
            data.extend_from_slice(b);
        }
        FieldValue::Struct(inner) => {
            let encoded = inner.encode()?;
            out.extend_from_slice(&encoded.body);
            data.extend_from_slice(&encoded.data);
        }
        FieldValue::ListUint(items) => out.extend(pack_uint_list(items)),
        FieldValue::ListInt(items) => {
            let zz: Vec<u64> = items.iter().map(|&i| zigzag_encode(i)).collect();
            out.extend(pack_uint_list(&zz));
        }
        FieldValue::ListString(items) => {
            for s in items {
                let bytes = s.as_bytes();
                out.extend(encode_varint(bytes.len() as u64 + 1));
                out.extend_from_slice(bytes);
                out.push(0);
            }
        }
        FieldValue::ListBytes(items) => {
            for b in items {
                out.extend(encode_varint(b.len() as u64));
                out.extend_from_slice(b);
            }
        }
        FieldValue::ListStruct(items) => {
            for s in items {
                let encoded = s.encode()?;
                out.extend_from_slice(&encoded.body);
                data.extend_from_slice(&encoded.data);
            }
        }
    }
    Ok(())
}

fn decode_value(
    type_tag: &TypeTag,
    bytes: &[u8],
    data_remaining: &[u8],
    registry: &SchemaRegistry,
) -> Result<(FieldValue, usize), FieldStructError> {
    match type_tag {
        TypeTag::Bool => Ok((FieldValue::Bool(decode_uint(bytes, bytes.len())? != 0), 0)),
        TypeTag::Int8 | TypeTag::Int16 | TypeTag::Int32 | TypeTag::Int64 => {
            let u = decode_uint(bytes, bytes.len())?;
            Ok((FieldValue::Int(zigzag_decode(u)), 0))
        }
        TypeTag::Uint8 | TypeTag::Uint16 | TypeTag::Uint32 | TypeTag::Uint64 => {
            Ok((FieldValue::Uint(decode_uint(bytes, bytes.len())?), 0))
        }
        TypeTag::String => {
            if bytes.last() != Some(&0) {
                return Err(FieldStructError::Schema(SchemaError::MalformedListElement));
            }
            let s = std::str::from_utf8(&bytes[..bytes.len() - 1])
                .map_err(|_| FieldStructError::Schema(SchemaError::MalformedListElement))?;
            Ok((FieldValue::String(s.to_string()), 0))
        }
        TypeTag::Bytes => Ok((FieldValue::Bytes(bytes.to_vec()), 0)),
        TypeTag::Blob => {
            let (_, len) = decode_varint(bytes)?;
            let len = len as usize;
            if len > data_remaining.len() {
                return Err(FieldStructError::Protocol(ProtocolError::LengthOverrun {
                    declared: len as u64,
                    remaining: data_remaining.len() as u64,
                }));
            }
            Ok((FieldValue::Blob(data_remaining[..len].to_vec()), len))
        }
        TypeTag::Nested(name) => {
            let nested_schema = registry
                .get(name)
                .ok_or_else(|| FieldStructError::UnknownNestedSchema(name.clone()))?
                .clone();
            let (_, data_consumed, instance) =
                FieldStruct::decode(nested_schema, registry, bytes, data_remaining)?;
            Ok((FieldValue::Struct(Box::new(instance)), data_consumed))
        }
        TypeTag::List(inner) => decode_list_value(inner, bytes, data_remaining, registry),
    }
}

fn decode_list_value(
    inner: &TypeTag,
    bytes: &[u8],
    data_remaining: &[u8],
    registry: &SchemaRegistry,
) -> Result<(FieldValue, usize), FieldStructError> {
    match inner {
        TypeTag::Bool
        | TypeTag::Uint8
        | TypeTag::Uint16
        | TypeTag::Uint32
        | TypeTag::Uint64 => Ok((FieldValue::ListUint(unpack_uint_list(bytes)?), 0)),
        TypeTag::Int8 | TypeTag::Int16 | TypeTag::Int32 | TypeTag::Int64 => {
            let items = unpack_uint_list(bytes)?
                .into_iter()
                .map(zigzag_decode)
                .collect();
            Ok((FieldValue::ListInt(items), 0))
        }
        TypeTag::String => {
            let mut items = Vec::new();
            let mut offset = 0usize;
            while offset < bytes.len() {
                let (consumed, len) = decode_varint(&bytes[offset..])?;
                offset += consumed;
                let len = len as usize;
                if len == 0 || offset + len > bytes.len() {
                    return Err(FieldStructError::Schema(SchemaError::MalformedListElement));
                }
                let chunk = &bytes[offset..offset + len];
                if chunk.last() != Some(&0) {
                    return Err(FieldStructError::Schema(SchemaError::MalformedListElement));
                }
                let s = std::str::from_utf8(&chunk[..chunk.len() - 1])
                    .map_err(|_| FieldStructError::Schema(SchemaError::MalformedListElement))?;
                items.push(s.to_string());
                offset += len;
            }
            Ok((FieldValue::ListString(items), 0))
        }
        TypeTag::Bytes => {
            let mut items = Vec::new();
            let mut offset = 0usize;
            while offset < bytes.len() {
                let (consumed, len) = decode_varint(&bytes[offset..])?;
                offset += consumed;
                let len = len as usize;
                if offset + len > bytes.len() {
                    return Err(FieldStructError::Schema(SchemaError::MalformedListElement));
                }
                items.push(bytes[offset..offset + len].to_vec());
                offset += len;
            }
            Ok((FieldValue::ListBytes(items), 0))
        }
        TypeTag::Nested(name) => {
            let nested_schema = registry
                .get(name)
                .ok_or_else(|| FieldStructError::UnknownNestedSchema(name.clone()))?
                .clone();
            let mut items = Vec::new();
            let mut offset = 0usize;
            let mut data_offset = 0usize;
            while offset < bytes.len() {
                let (consumed, consumed_data, instance) = FieldStruct::decode(
                    nested_schema.clone(),
                    registry,
                    &bytes[offset..],
                    &data_remaining[data_offset..],
                )?;
                items.push(instance);
                offset += consumed;
                data_offset += consumed_data;
            }
            Ok((FieldValue::ListStruct(items), data_offset))
        }
        TypeTag::Blob | TypeTag::List(_) => {
            Err(FieldStructError::Schema(SchemaError::MalformedListElement))
        }
    }
}
