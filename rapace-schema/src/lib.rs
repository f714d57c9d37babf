//! Schema model (C5) and FieldStruct reader/writer (C6) for the rapace RPC
//! wire format.
//!
//! `rapace-codegen` turns IDL text into the [`model::Schema`]/
//! [`model::RpcService`] values this crate defines; `rapace-core` drives
//! [`value::FieldStruct`] encode/decode from its client and server dispatch
//! pipelines.

pub mod error;
pub mod model;
pub mod value;

pub use error::FieldStructError;
pub use model::{
    DefaultValue, FieldDescriptor, ModelError, RpcCall, RpcService, Schema, SchemaKind,
    SchemaRegistry, TypeTag, MAX_CALL_UID, MAX_FIELD_UID,
};
pub use value::{EncodedBody, FieldStruct, FieldValue, MAX_PRESENT_FIELDS};
