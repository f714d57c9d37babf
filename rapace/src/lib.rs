#![doc = include_str!("../README.md")]

//! Public facade over the rapace wire codec and RPC dispatch core: a single
//! dependency pulling in the wire primitives (C1-C3), the RPC header and
//! error taxonomy (C4, §7), the schema model and `FieldStruct` reader/writer
//! (C5-C6), the IDL compiler (§6.6), and client/server dispatch plus the I/O
//! pump (C7-C9).

pub use rapace_codegen::{parse_idl, ParseError, ParsedIdl};
pub use rapace_core::client::ClientDispatch;
pub use rapace_core::message::Message;
pub use rapace_core::server::{Handler, RegisterError, ServerDispatch};
pub use rapace_core::status;
pub use rapace_core::transport::{mem::MemTransport, stream::StreamTransport, Transport};
pub use rapace_protocol::config::RapaceConfig;
pub use rapace_protocol::error::{
    LifecycleError, LogicalError, ProtocolError, RapaceError, SchemaError, TransportError,
};
pub use rapace_protocol::header::{package_type, Direction, HeaderFormat, LongHeader, ShortHeader};
pub use rapace_schema::model::{
    FieldDescriptor, RpcCall, RpcService, Schema, SchemaKind, SchemaRegistry, TypeTag,
};
pub use rapace_schema::value::{EncodedBody, FieldStruct, FieldValue};
pub use rapace_wire::field::{decode_field, encode_field};
pub use rapace_wire::frame::{decode_frame_header, encode_frame_header};
pub use rapace_wire::int::{decode_uint, encode_uint, zigzag_decode, zigzag_encode};

/// Server-side helpers mirroring the teacher's `rapace::server` convenience
/// module: a TCP listener loop that spawns a fresh [`ServerDispatch`] per
/// accepted connection.
pub mod server {
    use std::sync::Arc;

    use rapace_protocol::config::RapaceConfig;
    use rapace_schema::model::RpcService;
    use rapace_schema::model::SchemaRegistry;
    use tokio::net::{TcpListener, TcpStream};

    use crate::{ServerDispatch, StreamTransport, Transport};

    /// Wrap an already-accepted socket in a [`StreamTransport`] and hand
    /// back a [`Transport`] ready for [`ServerDispatch::new`].
    pub fn serve_connection(stream: TcpStream, config: RapaceConfig) -> Transport {
        Transport::Stream(StreamTransport::spawn(stream, config))
    }

    /// Accept connections on `addr` forever, building and running a fresh
    /// [`ServerDispatch`] for each one via `build_dispatch`.
    pub async fn run_tcp_server<F>(
        addr: &str,
        service: Arc<RpcService>,
        registry: Arc<SchemaRegistry>,
        config: RapaceConfig,
        build_dispatch: F,
    ) -> std::io::Result<()>
    where
        F: Fn(&mut ServerDispatch) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        loop {
            let (socket, peer_addr) = listener.accept().await?;
            tracing::debug!(%peer_addr, "accepted connection");
            let transport = serve_connection(socket, config.clone());
            let mut dispatch = ServerDispatch::new(transport, service.clone(), registry.clone());
            build_dispatch(&mut dispatch);
            tokio::spawn(dispatch.run());
        }
    }
}

/// Client-side helper mirroring the teacher's facade: connect a TCP socket
/// and wrap it in a ready-to-use [`ClientDispatch`].
pub async fn connect_tcp(
    addr: &str,
    service: std::sync::Arc<rapace_schema::model::RpcService>,
    registry: std::sync::Arc<rapace_schema::model::SchemaRegistry>,
    config: RapaceConfig,
) -> std::io::Result<std::sync::Arc<ClientDispatch>> {
    let stream = tokio::net::TcpStream::connect(addr).await?;
    let transport = Transport::Stream(rapace_core::transport::stream::StreamTransport::spawn(stream, config.clone()));
    Ok(ClientDispatch::new(transport, service, registry, config))
}
