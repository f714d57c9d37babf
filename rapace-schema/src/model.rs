//! Schema model (C5): structs, RPC calls, and services as immutable,
//! freely shared data describing how `FieldStruct` instances are shaped and
//! how `msg_type`s route to request/response pairs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The type a field's value is encoded/decoded as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    String,
    Bytes,
    /// Out-of-band bytes: carried in the frame's `data` region, not the body.
    Blob,
    /// References another `Schema` by name, resolved through a [`SchemaRegistry`].
    Nested(String),
    List(Box<TypeTag>),
}

impl TypeTag {
    pub fn is_list(&self) -> bool {
        matches!(self, TypeTag::List(_))
    }
}

/// A literal default value for a field absent from the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(String),
    Bytes(Vec<u8>),
}

/// One field in a [`Schema`]. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    uid: u32,
    name: String,
    type_tag: TypeTag,
    default: Option<DefaultValue>,
}

/// Largest `uid` a struct field may carry — the per-message presence bitmap
/// is one bit per field, 64 bits wide.
pub const MAX_FIELD_UID: u32 = 63;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    FieldUidOutOfRange(u32),
    DuplicateFieldUid(u32),
    DuplicateCallUid(u64),
    CallUidOutOfRange(u64),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::FieldUidOutOfRange(uid) => {
                write!(f, "field uid {uid} exceeds maximum of {MAX_FIELD_UID}")
            }
            ModelError::DuplicateFieldUid(uid) => write!(f, "duplicate field uid {uid}"),
            ModelError::DuplicateCallUid(uid) => write!(f, "duplicate RPC call uid {uid}"),
            ModelError::CallUidOutOfRange(uid) => {
                write!(f, "RPC call uid {uid} exceeds maximum of 65535")
            }
        }
    }
}

impl std::error::Error for ModelError {}

impl FieldDescriptor {
    pub fn new(
        uid: u32,
        name: impl Into<String>,
        type_tag: TypeTag,
        default: Option<DefaultValue>,
    ) -> Result<Self, ModelError> {
        if uid > MAX_FIELD_UID {
            return Err(ModelError::FieldUidOutOfRange(uid));
        }
        Ok(FieldDescriptor {
            uid,
            name: name.into(),
            type_tag,
            default,
        })
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    pub fn default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn repeated(&self) -> bool {
        self.type_tag.is_list()
    }
}

/// What role a [`Schema`] plays: a plain nested struct, or one half of an
/// RPC call's request/response pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Struct,
    Request,
    Response,
}

/// A named, ordered collection of [`FieldDescriptor`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    kind: SchemaKind,
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    pub fn new(
        name: impl Into<String>,
        kind: SchemaKind,
        fields: Vec<FieldDescriptor>,
    ) -> Result<Self, ModelError> {
        let mut seen = std::collections::HashSet::new();
        for f in &fields {
            if !seen.insert(f.uid()) {
                return Err(ModelError::DuplicateFieldUid(f.uid()));
            }
        }
        Ok(Schema {
            name: name.into(),
            kind,
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, uid: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.uid() == uid)
    }

    /// Bytes needed for a presence bitmap covering every field, one bit each.
    pub fn bitmap_bytes(&self) -> usize {
        (self.fields.len() + 7) / 8
    }
}

/// One entry in an [`RpcService`]: a `msg_type`, its request/response
/// schemas, and whether the server executes it inline or off a task queue.
#[derive(Debug, Clone)]
pub struct RpcCall {
    uid: u64,
    name: String,
    request_schema: Arc<Schema>,
    response_schema: Arc<Schema>,
    is_async: bool,
}

/// Largest RPC call uid (`msg_type`), per spec.md §6.6.
pub const MAX_CALL_UID: u64 = 65535;

impl RpcCall {
    pub fn new(
        uid: u64,
        name: impl Into<String>,
        request_schema: Arc<Schema>,
        response_schema: Arc<Schema>,
        is_async: bool,
    ) -> Result<Self, ModelError> {
        if uid > MAX_CALL_UID {
            return Err(ModelError::CallUidOutOfRange(uid));
        }
        Ok(RpcCall {
            uid,
            name: name.into(),
            request_schema,
            response_schema,
            is_async,
        })
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_schema(&self) -> &Arc<Schema> {
        &self.request_schema
    }

    pub fn response_schema(&self) -> &Arc<Schema> {
        &self.response_schema
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }
}

/// A named set of [`RpcCall`]s. Client- and server-side dispatch tables
/// (`rapace-core`) are both keyed by `msg_type` and derived from this.
#[derive(Debug, Clone)]
pub struct RpcService {
    name: String,
    calls: Vec<RpcCall>,
}

impl RpcService {
    pub fn new(name: impl Into<String>, calls: Vec<RpcCall>) -> Result<Self, ModelError> {
        let mut seen = std::collections::HashSet::new();
        for c in &calls {
            if !seen.insert(c.uid()) {
                return Err(ModelError::DuplicateCallUid(c.uid()));
            }
        }
        Ok(RpcService {
            name: name.into(),
            calls,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn calls(&self) -> &[RpcCall] {
        &self.calls
    }

    pub fn call(&self, uid: u64) -> Option<&RpcCall> {
        self.calls.iter().find(|c| c.uid() == uid)
    }

    /// Build the `msg_type -> RpcCall` map both client and server dispatch
    /// index into.
    pub fn dispatch_table(&self) -> HashMap<u64, RpcCall> {
        self.calls.iter().map(|c| (c.uid(), c.clone())).collect()
    }
}

/// Resolves [`TypeTag::Nested`] names to their [`Schema`], so nested-struct
/// and `list[nested]` fields can recurse without the owning `Schema`
/// embedding a cyclic reference to itself.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Arc<Schema>) {
        self.schemas.insert(schema.name().to_string(), schema);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Schema>> {
        self.schemas.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(uid: u32, type_tag: TypeTag) -> FieldDescriptor {
        FieldDescriptor::new(uid, format!("f{uid}"), type_tag, None).unwrap()
    }

    #[test]
    fn bitmap_bytes_rounds_up() {
        let schema = Schema::new(
            "S",
            SchemaKind::Struct,
            vec![field(0, TypeTag::Bool), field(1, TypeTag::Bool)],
        )
        .unwrap();
        assert_eq!(schema.bitmap_bytes(), 1);

        let nine_fields: Vec<_> = (0..9).map(|i| field(i, TypeTag::Bool)).collect();
        let schema = Schema::new("S9", SchemaKind::Struct, nine_fields).unwrap();
        assert_eq!(schema.bitmap_bytes(), 2);
    }

    #[test]
    fn duplicate_field_uid_rejected() {
        let err = Schema::new(
            "S",
            SchemaKind::Struct,
            vec![field(0, TypeTag::Bool), field(0, TypeTag::Uint8)],
        )
        .unwrap_err();
        assert_eq!(err, ModelError::DuplicateFieldUid(0));
    }

    #[test]
    fn field_uid_over_max_rejected() {
        let err = FieldDescriptor::new(64, "x", TypeTag::Bool, None).unwrap_err();
        assert_eq!(err, ModelError::FieldUidOutOfRange(64));
    }

    #[test]
    fn repeated_mirrors_list_type_tag() {
        let f = field(0, TypeTag::List(Box::new(TypeTag::Uint32)));
        assert!(f.repeated());
        let g = field(1, TypeTag::Uint32);
        assert!(!g.repeated());
    }

    #[test]
    fn rpc_service_dispatch_table_keys_by_uid() {
        let req = Arc::new(Schema::new("Req", SchemaKind::Request, vec![]).unwrap());
        let resp = Arc::new(Schema::new("Resp", SchemaKind::Response, vec![]).unwrap());
        let call = RpcCall::new(7, "ping", req, resp, false).unwrap();
        let service = RpcService::new("Demo", vec![call]).unwrap();
        let table = service.dispatch_table();
        assert_eq!(table.get(&7).map(|c| c.name()), Some("ping"));
    }

    #[test]
    fn duplicate_call_uid_rejected() {
        let req = Arc::new(Schema::new("Req", SchemaKind::Request, vec![]).unwrap());
        let resp = Arc::new(Schema::new("Resp", SchemaKind::Response, vec![]).unwrap());
        let a = RpcCall::new(1, "a", req.clone(), resp.clone(), false).unwrap();
        let b = RpcCall::new(1, "b", req, resp, false).unwrap();
        assert_eq!(
            RpcService::new("Demo", vec![a, b]).unwrap_err(),
            ModelError::DuplicateCallUid(1)
        );
    }

    #[test]
    fn registry_resolves_nested_by_name() {
        let mut registry = SchemaRegistry::new();
        let inner = Arc::new(Schema::new("Inner", SchemaKind::Struct, vec![]).unwrap());
        registry.register(inner.clone());
        assert!(std::ptr::eq(registry.get("Inner").unwrap().as_ref(), inner.as_ref()));
        assert!(registry.get("Missing").is_none());
    }
}
