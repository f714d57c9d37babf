//! Recursive-descent parser for the schema IDL (spec.md §6.6):
//!
//! ```text
//! struct <Name> { <uid>: <type> <field-name> [<default-expr>]; ... }
//! request <Name> { ... }
//! response <Name> { ... }
//! rpc <ServiceName> { <uid>: [sync|async] <call-name>(<Req>) -> <Resp>; ... }
//! ```
//!
//! The call signature `<call-name>(<Req>) -> <Resp>` is this implementation's
//! resolution of an ambiguity spec.md leaves open: the prose grammar names a
//! call but never says how it picks up its request/response schema pair. See
//! `DESIGN.md` for the reasoning.

use std::fmt;
use std::sync::Arc;

use rapace_schema::{
    DefaultValue, FieldDescriptor, ModelError, RpcCall, RpcService, Schema, SchemaKind,
    SchemaRegistry, TypeTag,
};

use crate::lexer::{self, LexError, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Lex(LexError),
    UnexpectedEof,
    UnexpectedToken { found: String, expected: &'static str },
    UnknownType(String),
    UnknownSchema(String),
    Model(ModelError),
    DuplicateSchemaName(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(e) => write!(f, "{e}"),
            ParseError::UnexpectedEof => write!(f, "unexpected end of input"),
            ParseError::UnexpectedToken { found, expected } => {
                write!(f, "expected {expected}, found {found}")
            }
            ParseError::UnknownType(t) => write!(f, "unknown type {t:?}"),
            ParseError::UnknownSchema(name) => write!(f, "no schema named {name:?}"),
            ParseError::Model(e) => write!(f, "{e}"),
            ParseError::DuplicateSchemaName(name) => write!(f, "duplicate schema name {name:?}"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError::Lex(e)
    }
}

impl From<ModelError> for ParseError {
    fn from(e: ModelError) -> Self {
        ParseError::Model(e)
    }
}

/// Everything parsed from one IDL document: the schemas it declared (in
/// declaration order) plus the registry used to resolve `Nested` type
/// references, and the services it declared.
pub struct ParsedIdl {
    pub schemas: Vec<Arc<Schema>>,
    pub registry: SchemaRegistry,
    pub services: Vec<RpcService>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Result<Token, ParseError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or(ParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect_punct(&mut self, c: char) -> Result<(), ParseError> {
        match self.bump()? {
            Token::Punct(p) if p == c => Ok(()),
            other => Err(ParseError::UnexpectedToken {
                found: other.to_string(),
                expected: punct_name(c),
            }),
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.bump()? {
            Token::Ident(s) => Ok(s),
            other => Err(ParseError::UnexpectedToken {
                found: other.to_string(),
                expected: "identifier",
            }),
        }
    }

    fn at_punct(&self, c: char) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == c)
    }

    fn parse_document(&mut self) -> Result<ParsedIdl, ParseError> {
        let mut schemas: Vec<Arc<Schema>> = Vec::new();
        let mut registry = SchemaRegistry::new();
        let mut raw_calls: Vec<(u64, String, bool, String, String)> = Vec::new();
        let mut service_name = None;

        while self.peek().is_some() {
            let keyword = self.expect_ident()?;
            match keyword.as_str() {
                "struct" | "request" | "response" => {
                    let kind = match keyword.as_str() {
                        "struct" => SchemaKind::Struct,
                        "request" => SchemaKind::Request,
                        _ => SchemaKind::Response,
                    };
                    let schema = Arc::new(self.parse_schema_body(kind)?);
                    if registry.get(schema.name()).is_some() {
                        return Err(ParseError::DuplicateSchemaName(schema.name().to_string()));
                    }
                    registry.register(schema.clone());
                    schemas.push(schema);
                }
                "rpc" => {
                    let name = self.expect_ident()?;
                    service_name = Some(name);
                    self.expect_punct('{')?;
                    while !self.at_punct('}') {
                        raw_calls.push(self.parse_rpc_call()?);
                    }
                    self.expect_punct('}')?;
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        found: format!("`{other}`"),
                        expected: "`struct`, `request`, `response`, or `rpc`",
                    })
                }
            }
        }

        let mut services = Vec::new();
        if let Some(service_name) = service_name {
            let mut calls = Vec::new();
            for (uid, call_name, is_async, req_name, resp_name) in raw_calls {
                let req = registry
                    .get(&req_name)
                    .cloned()
                    .ok_or_else(|| ParseError::UnknownSchema(req_name.clone()))?;
                let resp = registry
                    .get(&resp_name)
                    .cloned()
                    .ok_or_else(|| ParseError::UnknownSchema(resp_name.clone()))?;
                calls.push(RpcCall::new(uid, call_name, req, resp, is_async)?);
            }
            services.push(RpcService::new(service_name, calls)?);
        }

        Ok(ParsedIdl {
            schemas,
            registry,
            services,
        })
    }

    fn parse_schema_body(&mut self, kind: SchemaKind) -> Result<Schema, ParseError> {
        let name = self.expect_ident()?;
        self.expect_punct('{')?;
        let mut fields = Vec::new();
        while !self.at_punct('}') {
            fields.push(self.parse_field()?);
        }
        self.expect_punct('}')?;
        Ok(Schema::new(name, kind, fields)?)
    }

    fn parse_field(&mut self) -> Result<FieldDescriptor, ParseError> {
        let uid = self.expect_number()?;
        self.expect_punct(':')?;
        let type_tag = self.parse_type()?;
        let name = self.expect_ident()?;
        let default = if self.at_punct('=') {
            self.bump()?;
            Some(self.parse_default()?)
        } else {
            None
        };
        self.expect_punct(';')?;
        Ok(FieldDescriptor::new(uid as u32, name, type_tag, default)?)
    }

    fn parse_default(&mut self) -> Result<DefaultValue, ParseError> {
        match self.bump()? {
            Token::Number(n) => Ok(DefaultValue::Uint(n)),
            Token::StringLit(s) => Ok(DefaultValue::String(s)),
            Token::Ident(s) if s == "true" => Ok(DefaultValue::Bool(true)),
            Token::Ident(s) if s == "false" => Ok(DefaultValue::Bool(false)),
            Token::Punct('-') => match self.bump()? {
                Token::Number(n) => Ok(DefaultValue::Int(-(n as i64))),
                other => Err(ParseError::UnexpectedToken {
                    found: other.to_string(),
                    expected: "number after `-`",
                }),
            },
            other => Err(ParseError::UnexpectedToken {
                found: other.to_string(),
                expected: "default literal",
            }),
        }
    }

    fn expect_number(&mut self) -> Result<u64, ParseError> {
        match self.bump()? {
            Token::Number(n) => Ok(n),
            other => Err(ParseError::UnexpectedToken {
                found: other.to_string(),
                expected: "number",
            }),
        }
    }

    fn parse_type(&mut self) -> Result<TypeTag, ParseError> {
        let name = self.expect_ident()?;
        if name == "list" {
            self.expect_punct('[')?;
            let inner = self.parse_type()?;
            self.expect_punct(']')?;
            return Ok(TypeTag::List(Box::new(inner)));
        }
        match primitive_type(&name) {
            Some(tag) => Ok(tag),
            None => Ok(TypeTag::Nested(name)),
        }
    }

    fn parse_rpc_call(&mut self) -> Result<(u64, String, bool, String, String), ParseError> {
        let uid = self.expect_number()?;
        self.expect_punct(':')?;
        let mode = self.expect_ident()?;
        let is_async = match mode.as_str() {
            "sync" => false,
            "async" => true,
            other => {
                return Err(ParseError::UnexpectedToken {
                    found: format!("`{other}`"),
                    expected: "`sync` or `async`",
                })
            }
        };
        let call_name = self.expect_ident()?;
        self.expect_punct('(')?;
        let req_name = self.expect_ident()?;
        self.expect_punct(')')?;
        self.bump_arrow()?;
        let resp_name = self.expect_ident()?;
        self.expect_punct(';')?;
        Ok((uid, call_name, is_async, req_name, resp_name))
    }

    fn bump_arrow(&mut self) -> Result<(), ParseError> {
        match self.bump()? {
            Token::Arrow => Ok(()),
            other => Err(ParseError::UnexpectedToken {
                found: other.to_string(),
                expected: "`->`",
            }),
        }
    }
}

fn primitive_type(name: &str) -> Option<TypeTag> {
    Some(match name {
        "bool" => TypeTag::Bool,
        "int8" => TypeTag::Int8,
        "int16" => TypeTag::Int16,
        "int32" => TypeTag::Int32,
        "int64" => TypeTag::Int64,
        "uint8" => TypeTag::Uint8,
        "uint16" => TypeTag::Uint16,
        "uint32" => TypeTag::Uint32,
        "uint64" => TypeTag::Uint64,
        "string" => TypeTag::String,
        "bytes" => TypeTag::Bytes,
        "blob" => TypeTag::Blob,
        _ => return None,
    })
}

fn punct_name(c: char) -> &'static str {
    match c {
        '{' => "`{`",
        '}' => "`}`",
        '(' => "`(`",
        ')' => "`)`",
        '[' => "`[`",
        ']' => "`]`",
        ':' => "`:`",
        ';' => "`;`",
        ',' => "`,`",
        '=' => "`=`",
        _ => "punctuation",
    }
}

/// Parse a complete IDL document.
pub fn parse_idl(src: &str) -> Result<ParsedIdl, ParseError> {
    let tokens = lexer::tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_document()
}
