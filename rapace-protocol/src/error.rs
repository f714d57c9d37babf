//! Error taxonomy (spec §7): every fallible boundary in the stack returns
//! one of these five kinds, composed into [`RapaceError`] at the points
//! user code observes completions.

use std::fmt;

/// Bad bytes at the wire level: frame, header, field, or length malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    BadMagic,
    BadVersion(u8),
    TruncatedFrame,
    MalformedFieldHead,
    LengthOverrun { declared: u64, remaining: u64 },
    /// A message can't be represented in [`crate::header::HeaderFormat::Short`]:
    /// it carries a `fwd`/`data` region, or a `package_type` the short
    /// header's single direction bit has no room for (spec.md §4.3/§9).
    ShortHeaderUnsupported(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::BadMagic => write!(f, "frame magic mismatch"),
            ProtocolError::BadVersion(v) => write!(f, "unsupported frame version {v}"),
            ProtocolError::TruncatedFrame => write!(f, "frame truncated mid-read"),
            ProtocolError::MalformedFieldHead => write!(f, "malformed field head"),
            ProtocolError::LengthOverrun { declared, remaining } => write!(
                f,
                "declared length {declared} exceeds remaining buffer of {remaining} bytes"
            ),
            ProtocolError::ShortHeaderUnsupported(reason) => {
                write!(f, "short header cannot represent this message: {reason}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Bad shape at the schema level: recoverable by design (decode continues,
/// dispatch answers with a status response rather than closing the
/// connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    UnknownMsgType(u64),
    UnknownFieldUid(u32),
    MalformedListElement,
    MissingRequiredField { uid: u32, name: String },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::UnknownMsgType(t) => write!(f, "unknown msg_type {t}"),
            SchemaError::UnknownFieldUid(uid) => write!(f, "unknown field uid {uid} (skipped)"),
            SchemaError::MalformedListElement => write!(f, "malformed list element"),
            SchemaError::MissingRequiredField { uid, name } => {
                write!(f, "missing required field {name} (uid {uid})")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// Connection-fatal failures: every pending context on the connection
/// completes with this error and the connection closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    ConnectionClosed,
    SocketError(String),
    BackpressureExceeded,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ConnectionClosed => write!(f, "connection closed"),
            TransportError::SocketError(msg) => write!(f, "socket error: {msg}"),
            TransportError::BackpressureExceeded => {
                write!(f, "outbound buffer exceeded high-water mark")
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// A handler-reported failure, carried in the response body rather than as
/// a wire-level or transport-level fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalError {
    pub code: i32,
    pub message: String,
}

impl fmt::Display for LogicalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for LogicalError {}

/// Local completion outcomes that never touch the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    Cancelled,
    TimedOut,
    OrphanResponse,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::Cancelled => write!(f, "request cancelled"),
            LifecycleError::TimedOut => write!(f, "request timed out"),
            LifecycleError::OrphanResponse => write!(f, "response had no matching request"),
        }
    }
}

impl std::error::Error for LifecycleError {}

/// Top-level error every user-visible completion is discriminated over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RapaceError {
    Protocol(ProtocolError),
    Schema(SchemaError),
    Transport(TransportError),
    Logical(LogicalError),
    Lifecycle(LifecycleError),
}

impl fmt::Display for RapaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RapaceError::Protocol(e) => write!(f, "protocol error: {e}"),
            RapaceError::Schema(e) => write!(f, "schema error: {e}"),
            RapaceError::Transport(e) => write!(f, "transport error: {e}"),
            RapaceError::Logical(e) => write!(f, "logical error: {e}"),
            RapaceError::Lifecycle(e) => write!(f, "lifecycle error: {e}"),
        }
    }
}

impl std::error::Error for RapaceError {}

impl From<ProtocolError> for RapaceError {
    fn from(e: ProtocolError) -> Self {
        RapaceError::Protocol(e)
    }
}

impl From<SchemaError> for RapaceError {
    fn from(e: SchemaError) -> Self {
        RapaceError::Schema(e)
    }
}

impl From<TransportError> for RapaceError {
    fn from(e: TransportError) -> Self {
        RapaceError::Transport(e)
    }
}

impl From<LogicalError> for RapaceError {
    fn from(e: LogicalError) -> Self {
        RapaceError::Logical(e)
    }
}

impl From<LifecycleError> for RapaceError {
    fn from(e: LifecycleError) -> Self {
        RapaceError::Lifecycle(e)
    }
}

impl RapaceError {
    /// Protocol and Transport errors are fatal to the connection; everything
    /// else resolves a single waiter or status response without closing it.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, RapaceError::Protocol(_) | RapaceError::Transport(_))
    }
}
