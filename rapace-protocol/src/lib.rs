//! RPC header variants (C4), the error taxonomy (§7), and the shared
//! connection configuration (§6.7) that `rapace-core` drives.

pub mod config;
pub mod error;
pub mod header;

pub use config::RapaceConfig;
pub use error::{LifecycleError, LogicalError, ProtocolError, RapaceError, SchemaError, TransportError};
pub use header::{package_type, Direction, HeaderCodecError, HeaderFormat, LongHeader, ShortHeader};
