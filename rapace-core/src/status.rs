//! The `Status` schema: the body shape [`package_type::STATUS`] messages
//! carry when the allocate, parse, or handler stage of server dispatch
//! (§4.7, §7) fails before a real response can be produced.

use std::sync::Arc;

use rapace_protocol::error::{LogicalError, RapaceError, SchemaError};
use rapace_schema::model::{FieldDescriptor, Schema, SchemaKind, TypeTag};
use rapace_schema::value::{FieldStruct, FieldValue};

/// Which dispatch stage produced a status; carried on the wire as `kind` so
/// the receiving side can rebuild the right [`RapaceError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    UnknownMsgType = 0,
    ParseError = 1,
    Logical = 2,
}

impl StatusKind {
    fn from_wire(v: u64) -> StatusKind {
        match v {
            0 => StatusKind::UnknownMsgType,
            1 => StatusKind::ParseError,
            _ => StatusKind::Logical,
        }
    }
}

/// Builds the fixed `{code: uint32, message: string, kind: uint8}` schema
/// once per dispatcher; the schema is hand-rolled rather than IDL-compiled
/// since it is wire-internal, not part of any service's public contract.
pub fn status_schema() -> Arc<Schema> {
    Arc::new(
        Schema::new(
            "rapace.Status",
            SchemaKind::Response,
            vec![
                FieldDescriptor::new(0, "code", TypeTag::Uint32, None)
                    .expect("uid 0 is in range"),
                FieldDescriptor::new(1, "message", TypeTag::String, None)
                    .expect("uid 1 is in range"),
                FieldDescriptor::new(2, "kind", TypeTag::Uint8, None)
                    .expect("uid 2 is in range"),
            ],
        )
        .expect("status schema field uids are unique"),
    )
}

pub fn build_status(schema: &Arc<Schema>, kind: StatusKind, code: u32, message: impl Into<String>) -> FieldStruct {
    let mut status = FieldStruct::new(schema.clone());
    status.set(0, FieldValue::Uint(code as u64));
    status.set(1, FieldValue::String(message.into()));
    status.set(2, FieldValue::Uint(kind as u64));
    status
}

/// Reconstruct the [`RapaceError`] a status body represents, for the side
/// that receives it (client dispatch; see spec.md §7).
pub fn status_to_error(status: &FieldStruct) -> RapaceError {
    let code = match status.get(0) {
        Some(FieldValue::Uint(v)) => *v as u32,
        _ => 0,
    };
    let message = match status.get(1) {
        Some(FieldValue::String(s)) => s.clone(),
        _ => String::new(),
    };
    let kind = match status.get(2) {
        Some(FieldValue::Uint(v)) => StatusKind::from_wire(*v),
        _ => StatusKind::Logical,
    };
    match kind {
        StatusKind::UnknownMsgType => RapaceError::Schema(SchemaError::UnknownMsgType(code as u64)),
        StatusKind::ParseError => RapaceError::Schema(SchemaError::MalformedListElement),
        StatusKind::Logical => RapaceError::Logical(LogicalError {
            code: code as i32,
            message,
        }),
    }
}
