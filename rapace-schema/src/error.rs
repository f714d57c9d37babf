//! Errors the FieldStruct reader/writer can raise, composing the wire-level
//! errors from `rapace-wire` with the schema-level taxonomy from
//! `rapace-protocol`.

use std::fmt;

use rapace_protocol::error::{ProtocolError, SchemaError};
use rapace_wire::field::FieldCodecError;
use rapace_wire::int::IntCodecError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStructError {
    Protocol(ProtocolError),
    Schema(SchemaError),
    /// A `FieldStruct` tried to encode more than 255 present fields.
    TooManyFields(usize),
    /// A `TypeTag::Nested`/`List(Nested)` field named a schema the
    /// registry has no entry for.
    UnknownNestedSchema(String),
}

impl fmt::Display for FieldStructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldStructError::Protocol(e) => write!(f, "{e}"),
            FieldStructError::Schema(e) => write!(f, "{e}"),
            FieldStructError::TooManyFields(n) => {
                write!(f, "{n} present fields exceeds the 255-field wire limit")
            }
            FieldStructError::UnknownNestedSchema(name) => {
                write!(f, "no registered schema named {name:?}")
            }
        }
    }
}

impl std::error::Error for FieldStructError {}

impl From<ProtocolError> for FieldStructError {
    fn from(e: ProtocolError) -> Self {
        FieldStructError::Protocol(e)
    }
}

impl From<SchemaError> for FieldStructError {
    fn from(e: SchemaError) -> Self {
        FieldStructError::Schema(e)
    }
}

impl From<IntCodecError> for FieldStructError {
    fn from(_: IntCodecError) -> Self {
        FieldStructError::Protocol(ProtocolError::TruncatedFrame)
    }
}

impl From<FieldCodecError> for FieldStructError {
    fn from(e: FieldCodecError) -> Self {
        match e {
            FieldCodecError::Truncated { .. } => FieldStructError::Protocol(ProtocolError::TruncatedFrame),
            FieldCodecError::FieldIdOutOfRange(_) => {
                FieldStructError::Protocol(ProtocolError::MalformedFieldHead)
            }
        }
    }
}
