//! Server dispatch (C8): the allocate→parse→execute→respond pipeline that
//! turns an inbound request frame into an outbound response or status frame
//! (spec.md §4.8). `run`'s read loop awaits sync calls inline — blocking
//! further reads on the connection until the response is sent — and hands
//! async calls to their own `tokio::spawn`ed task, the way
//! [`RpcCall::is_async`] marks them.

use std::collections::HashMap;
use std::sync::Arc;

use futures_core::future::BoxFuture;
use rapace_protocol::error::LogicalError;
use rapace_protocol::header::package_type;
use rapace_schema::model::{RpcService, SchemaRegistry};
use rapace_schema::value::FieldStruct;

use crate::message::Message;
use crate::status::{build_status, status_schema, StatusKind};
use crate::transport::Transport;

/// A registered RPC implementation. `call` takes an already-decoded request
/// and must either produce a response struct or a [`LogicalError`] to carry
/// back as a status (spec.md §4.8's "handler contract").
///
/// Unlike the teacher's `Handler` (keyed by a bare method id, synchronous),
/// this trait's handlers are always asynchronous: §4.8's sync/async routing
/// is a property of the *call* (`RpcCall::is_async`), not of the handler
/// itself — dispatch decides whether to `.await` inline or `tokio::spawn`.
pub trait Handler: Send + Sync {
    fn call(&self, request: FieldStruct) -> BoxFuture<'static, Result<FieldStruct, LogicalError>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(FieldStruct) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<FieldStruct, LogicalError>> + Send + 'static,
{
    fn call(&self, request: FieldStruct) -> BoxFuture<'static, Result<FieldStruct, LogicalError>> {
        Box::pin((self)(request))
    }
}

/// Errors registering a handler against a [`ServerDispatch`]'s table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    UnknownMsgType(u64),
    AlreadyRegistered(u64),
}

impl std::fmt::Display for RegisterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterError::UnknownMsgType(id) => write!(f, "msg_type {id} is not declared by this service"),
            RegisterError::AlreadyRegistered(id) => write!(f, "msg_type {id} already has a handler registered"),
        }
    }
}

impl std::error::Error for RegisterError {}

/// Per-connection server dispatch. Holds the service's call table and the
/// handler registered for each `msg_type`; `run()` drives the pipeline for
/// every inbound frame until the transport closes.
pub struct ServerDispatch {
    transport: Transport,
    service: Arc<RpcService>,
    registry: Arc<SchemaRegistry>,
    handlers: HashMap<u64, Arc<dyn Handler>>,
}

impl ServerDispatch {
    pub fn new(transport: Transport, service: Arc<RpcService>, registry: Arc<SchemaRegistry>) -> Self {
        ServerDispatch {
            transport,
            service,
            registry,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler invoked for `msg_type`'s requests.
    pub fn register(&mut self, msg_type: u64, handler: impl Handler + 'static) -> Result<(), RegisterError> {
        self.register_arc(msg_type, Arc::new(handler))
    }

    pub fn register_arc(&mut self, msg_type: u64, handler: Arc<dyn Handler>) -> Result<(), RegisterError> {
        if self.service.call(msg_type).is_none() {
            return Err(RegisterError::UnknownMsgType(msg_type));
        }
        if self.handlers.contains_key(&msg_type) {
            return Err(RegisterError::AlreadyRegistered(msg_type));
        }
        self.handlers.insert(msg_type, handler);
        Ok(())
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Drive the pipeline until the transport closes or returns a fatal
    /// transport error.
    pub async fn run(self) {
        let ServerDispatch {
            transport,
            service,
            registry,
            handlers,
        } = self;
        let handlers = Arc::new(handlers);

        loop {
            let message = match transport.recv_frame().await {
                Ok(message) => message,
                Err(_) => return,
            };
            if message.package_type != package_type::REQUEST {
                tracing::debug!(package_type = message.package_type, "server ignoring non-request frame");
                continue;
            }

            // §3/§4.8's sync/async split is decided here, before the pipeline
            // runs: async calls are submitted to their own task so a slow
            // handler never blocks the I/O task reading the next frame, but
            // sync calls execute inline so this loop doesn't read (and can't
            // dispatch) another frame on this connection until the response
            // for this one has been sent.
            let is_async = service.call(message.msg_type).map(|c| c.is_async()).unwrap_or(false);

            if is_async {
                let transport = transport.clone();
                let service = service.clone();
                let registry = registry.clone();
                let handlers = handlers.clone();
                tokio::spawn(async move {
                    dispatch_one(message, &transport, &service, &registry, &handlers).await;
                });
            } else {
                dispatch_one(message, &transport, &service, &registry, &handlers).await;
            }
        }
    }
}

async fn dispatch_one(
    message: Message,
    transport: &Transport,
    service: &Arc<RpcService>,
    registry: &Arc<SchemaRegistry>,
    handlers: &HashMap<u64, Arc<dyn Handler>>,
) {
    let req_id = message.req_id;

    // 1. Allocate.
    let Some(call) = service.call(message.msg_type) else {
        let status = build_status(
            &status_schema(),
            StatusKind::UnknownMsgType,
            message.msg_type as u32,
            "unknown type",
        );
        send_status(transport, req_id, &status).await;
        return;
    };

    // 2. Parse.
    let request = match FieldStruct::decode(call.request_schema().clone(), registry, &message.body, &message.data) {
        Ok((_, _, request)) => request,
        Err(e) => {
            let status = build_status(&status_schema(), StatusKind::ParseError, 0, e.to_string());
            send_status(transport, req_id, &status).await;
            return;
        }
    };

    let Some(handler) = handlers.get(&call.uid()) else {
        let status = build_status(
            &status_schema(),
            StatusKind::UnknownMsgType,
            message.msg_type as u32,
            "no handler registered",
        );
        send_status(transport, req_id, &status).await;
        return;
    };

    // 3. Execute. `run` has already decided, from `call.is_async()`, whether
    // this whole pipeline is running inline on the I/O task (sync) or on its
    // own spawned task (async); either way `dispatch_one` just awaits the
    // handler directly here.
    let outcome = handler.call(request).await;

    // 4. Respond.
    match outcome {
        Ok(response) => match response.encode() {
            Ok(encoded) => {
                let message = Message::response(message.msg_type, req_id, encoded.body, encoded.data);
                if let Err(e) = transport.send_frame(message).await {
                    tracing::debug!(error = ?e, "failed to send response, connection likely closed");
                }
            }
            Err(e) => {
                let status = build_status(&status_schema(), StatusKind::ParseError, 0, e.to_string());
                send_status(transport, req_id, &status).await;
            }
        },
        Err(logical) => {
            let status = build_status(&status_schema(), StatusKind::Logical, logical.code as u32, logical.message);
            send_status(transport, req_id, &status).await;
        }
    }
}

async fn send_status(transport: &Transport, req_id: u64, status: &FieldStruct) {
    let Ok(encoded) = status.encode() else {
        tracing::warn!("failed to encode status body itself, dropping response");
        return;
    };
    let message = Message::status(req_id, encoded.body);
    if let Err(e) = transport.send_frame(message).await {
        tracing::debug!(error = ?e, "failed to send status, connection likely closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapace_protocol::config::RapaceConfig;
    use rapace_schema::model::{FieldDescriptor, RpcCall, Schema, SchemaKind, TypeTag};
    use rapace_schema::value::FieldValue;

    fn echo_fixture() -> (Arc<RpcService>, Arc<SchemaRegistry>) {
        let req = Arc::new(
            Schema::new(
                "EchoRequest",
                SchemaKind::Request,
                vec![FieldDescriptor::new(0, "text", TypeTag::String, None).unwrap()],
            )
            .unwrap(),
        );
        let resp = Arc::new(
            Schema::new(
                "EchoResponse",
                SchemaKind::Response,
                vec![FieldDescriptor::new(0, "text", TypeTag::String, None).unwrap()],
            )
            .unwrap(),
        );
        let call = RpcCall::new(1, "echo", req, resp, false).unwrap();
        let service = Arc::new(RpcService::new("Demo", vec![call]).unwrap());
        (service, Arc::new(SchemaRegistry::new()))
    }

    #[tokio::test]
    async fn echoes_a_request_back_as_the_response() {
        let (service, registry) = echo_fixture();
        let (client_transport, server_transport) = Transport::mem_pair();

        let mut dispatch = ServerDispatch::new(server_transport, service.clone(), registry);
        dispatch
            .register(1, |request: FieldStruct| async move {
                let mut response = FieldStruct::new(request.schema().clone());
                response.set(0, request.get(0).cloned().unwrap_or(FieldValue::String(String::new())));
                Ok(response)
            })
            .unwrap();
        tokio::spawn(dispatch.run());

        let mut request = FieldStruct::new(service.call(1).unwrap().request_schema().clone());
        request.set(0, FieldValue::String("hi".into()));
        let encoded = request.encode().unwrap();
        client_transport
            .send_frame(Message::request(1, 42, encoded.body, encoded.data))
            .await
            .unwrap();

        let response = client_transport.recv_frame().await.unwrap();
        assert_eq!(response.package_type, package_type::RESPONSE);
        assert_eq!(response.req_id, 42);
        let (_, _, decoded) = FieldStruct::decode(
            service.call(1).unwrap().response_schema().clone(),
            &Arc::new(SchemaRegistry::new()),
            &response.body,
            &response.data,
        )
        .unwrap();
        assert_eq!(decoded.get(0), Some(&FieldValue::String("hi".into())));
    }

    #[tokio::test]
    async fn unknown_msg_type_gets_a_status_response() {
        let (service, registry) = echo_fixture();
        let (client_transport, server_transport) = Transport::mem_pair();
        let dispatch = ServerDispatch::new(server_transport, service, registry);
        tokio::spawn(dispatch.run());

        client_transport
            .send_frame(Message::request(99, 1, vec![], vec![]))
            .await
            .unwrap();
        let response = client_transport.recv_frame().await.unwrap();
        assert_eq!(response.package_type, package_type::STATUS);
    }

    #[tokio::test]
    async fn no_handler_registered_gets_a_status_response() {
        let (service, registry) = echo_fixture();
        let (client_transport, server_transport) = Transport::mem_pair();
        let dispatch = ServerDispatch::new(server_transport, service.clone(), registry);
        tokio::spawn(dispatch.run());

        let request = FieldStruct::new(service.call(1).unwrap().request_schema().clone());
        let encoded = request.encode().unwrap();
        client_transport
            .send_frame(Message::request(1, 1, encoded.body, encoded.data))
            .await
            .unwrap();
        let response = client_transport.recv_frame().await.unwrap();
        assert_eq!(response.package_type, package_type::STATUS);
    }

    #[tokio::test]
    async fn async_call_is_routed_through_its_own_task() {
        let req = Arc::new(Schema::new("PingRequest", SchemaKind::Request, vec![]).unwrap());
        let resp = Arc::new(
            Schema::new(
                "PingResponse",
                SchemaKind::Response,
                vec![FieldDescriptor::new(0, "nonce", TypeTag::Uint64, None).unwrap()],
            )
            .unwrap(),
        );
        let call = RpcCall::new(1, "ping", req, resp, true).unwrap();
        let service = Arc::new(RpcService::new("Demo", vec![call]).unwrap());
        let registry = Arc::new(SchemaRegistry::new());
        let (client_transport, server_transport) = Transport::mem_pair();

        let response_schema = service.call(1).unwrap().response_schema().clone();
        let mut dispatch = ServerDispatch::new(server_transport, service.clone(), registry);
        dispatch
            .register(1, move |_request: FieldStruct| {
                let response_schema = response_schema.clone();
                async move {
                    let mut response = FieldStruct::new(response_schema);
                    response.set(0, FieldValue::Uint(7));
                    Ok(response)
                }
            })
            .unwrap();
        tokio::spawn(dispatch.run());

        client_transport
            .send_frame(Message::request(1, 5, vec![], vec![]))
            .await
            .unwrap();
        let response = client_transport.recv_frame().await.unwrap();
        assert_eq!(response.package_type, package_type::RESPONSE);
        let _ = RapaceConfig::default();
    }
}
