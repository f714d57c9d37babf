//! Client dispatch (C7): allocates `req_id`s, tracks outstanding calls in a
//! correlation map, and resolves each call's waiter from whatever order
//! responses actually arrive in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rapace_protocol::config::RapaceConfig;
use rapace_protocol::error::{LifecycleError, RapaceError, SchemaError, TransportError};
use rapace_protocol::header::package_type;
use rapace_schema::model::{RpcService, SchemaRegistry};
use rapace_schema::value::FieldStruct;
use tokio::sync::oneshot;

use crate::message::Message;
use crate::status::status_to_error;
use crate::transport::Transport;

type Waiter = oneshot::Sender<Result<FieldStruct, RapaceError>>;

struct State {
    transport: Transport,
    service: Arc<RpcService>,
    registry: Arc<SchemaRegistry>,
    config: RapaceConfig,
    next_req_id: AtomicU64,
    correlation: Mutex<HashMap<u64, Waiter>>,
}

/// Drives one connection's outstanding calls. `Arc`-shared between the
/// caller that issues `call()`s and the background task draining responses.
pub struct ClientDispatch {
    state: Arc<State>,
}

impl ClientDispatch {
    /// Spawns the background receive loop and returns a handle good for
    /// concurrent `call()`s from any number of tasks.
    pub fn new(
        transport: Transport,
        service: Arc<RpcService>,
        registry: Arc<SchemaRegistry>,
        config: RapaceConfig,
    ) -> Arc<Self> {
        let state = Arc::new(State {
            transport,
            service,
            registry,
            config,
            next_req_id: AtomicU64::new(0),
            correlation: Mutex::new(HashMap::new()),
        });
        let dispatch = Arc::new(ClientDispatch { state: state.clone() });
        tokio::spawn(recv_loop(state));
        dispatch
    }

    /// Encodes `request`, sends it, and awaits the matching response (or a
    /// status, timeout, or transport failure in its place).
    pub async fn call(&self, msg_type: u64, request: FieldStruct) -> Result<FieldStruct, RapaceError> {
        let call = self
            .state
            .service
            .call(msg_type)
            .ok_or(RapaceError::Schema(SchemaError::UnknownMsgType(msg_type)))?
            .clone();

        let encoded = request
            .encode()
            .map_err(|_| RapaceError::Schema(SchemaError::MalformedListElement))?;
        let req_id = self.state.next_req_id.fetch_add(1, Ordering::Relaxed);
        let message = Message::request(msg_type, req_id, encoded.body, encoded.data);

        let (tx, rx) = oneshot::channel();
        self.state.correlation.lock().insert(req_id, tx);

        if let Err(e) = self.state.transport.send_frame(message).await {
            self.state.correlation.lock().remove(&req_id);
            return Err(RapaceError::Transport(e));
        }

        let _ = &call; // response schema already baked into `call`; kept alive for future use sites
        match tokio::time::timeout(self.state.config.reply_max_wait, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RapaceError::Transport(TransportError::ConnectionClosed)),
            Err(_) => {
                self.state.correlation.lock().remove(&req_id);
                Err(RapaceError::Lifecycle(LifecycleError::TimedOut))
            }
        }
    }

    /// Cancels an in-flight call, resolving its waiter with
    /// [`LifecycleError::Cancelled`]. A no-op if the call already completed.
    pub fn cancel(&self, req_id: u64) -> bool {
        if let Some(tx) = self.state.correlation.lock().remove(&req_id) {
            let _ = tx.send(Err(RapaceError::Lifecycle(LifecycleError::Cancelled)));
            true
        } else {
            false
        }
    }

    pub fn close(&self) {
        self.state.transport.close();
    }
}

async fn recv_loop(state: Arc<State>) {
    loop {
        match state.transport.recv_frame().await {
            Ok(message) => handle_inbound(&state, message),
            Err(_) => {
                fail_all(&state, RapaceError::Transport(TransportError::ConnectionClosed));
                return;
            }
        }
    }
}

fn handle_inbound(state: &Arc<State>, message: Message) {
    match message.package_type {
        package_type::RESPONSE => {
            let Some(tx) = state.correlation.lock().remove(&message.req_id) else {
                tracing::debug!(req_id = message.req_id, "response had no matching request");
                return;
            };
            let Some(call) = state.service.call(message.msg_type) else {
                let _ = tx.send(Err(RapaceError::Schema(SchemaError::UnknownMsgType(message.msg_type))));
                return;
            };
            let result = FieldStruct::decode(
                call.response_schema().clone(),
                &state.registry,
                &message.body,
                &message.data,
            );
            let outcome = match result {
                Ok((_, _, response)) => Ok(response),
                Err(_) => Err(RapaceError::Schema(SchemaError::MalformedListElement)),
            };
            let _ = tx.send(outcome);
        }
        package_type::STATUS => {
            let Some(tx) = state.correlation.lock().remove(&message.req_id) else {
                tracing::debug!(req_id = message.req_id, "status had no matching request");
                return;
            };
            let status_schema = crate::status::status_schema();
            let outcome = match FieldStruct::decode(status_schema, &state.registry, &message.body, &message.data) {
                Ok((_, _, status)) => Err(status_to_error(&status)),
                Err(_) => Err(RapaceError::Schema(SchemaError::MalformedListElement)),
            };
            let _ = tx.send(outcome);
        }
        other => {
            tracing::warn!(package_type = other, "client received a non-response frame, ignoring");
        }
    }
}

fn fail_all(state: &State, err: RapaceError) {
    let mut correlation = state.correlation.lock();
    for (_, tx) in correlation.drain() {
        let _ = tx.send(Err(err.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapace_schema::model::{FieldDescriptor, RpcCall, Schema, SchemaKind, TypeTag};
    use rapace_schema::value::FieldValue;

    fn ping_fixture() -> (Arc<RpcService>, Arc<SchemaRegistry>) {
        let req = Arc::new(Schema::new("PingRequest", SchemaKind::Request, vec![]).unwrap());
        let resp = Arc::new(
            Schema::new(
                "PingResponse",
                SchemaKind::Response,
                vec![FieldDescriptor::new(0, "nonce", TypeTag::Uint64, None).unwrap()],
            )
            .unwrap(),
        );
        let call = RpcCall::new(1, "ping", req, resp, false).unwrap();
        let service = Arc::new(RpcService::new("Demo", vec![call]).unwrap());
        (service, Arc::new(SchemaRegistry::new()))
    }

    #[tokio::test]
    async fn call_resolves_on_matching_response() {
        let (service, registry) = ping_fixture();
        let (client_transport, server_transport) = Transport::mem_pair();
        let client = ClientDispatch::new(client_transport, service.clone(), registry, RapaceConfig::default());

        let responder = tokio::spawn(async move {
            let request = server_transport.recv_frame().await.unwrap();
            let response_schema = service.call(request.msg_type).unwrap().response_schema().clone();
            let mut response = FieldStruct::new(response_schema);
            response.set(0, FieldValue::Uint(42));
            let encoded = response.encode().unwrap();
            server_transport
                .send_frame(Message::response(request.msg_type, request.req_id, encoded.body, encoded.data))
                .await
                .unwrap();
        });

        let request = FieldStruct::new(client.state.service.call(1).unwrap().request_schema().clone());
        let response = client.call(1, request).await.unwrap();
        assert_eq!(response.get(0), Some(&FieldValue::Uint(42)));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn out_of_order_responses_resolve_the_right_waiter() {
        let (service, registry) = ping_fixture();
        let (client_transport, server_transport) = Transport::mem_pair();
        let client = ClientDispatch::new(client_transport, service.clone(), registry, RapaceConfig::default());

        let responder = tokio::spawn(async move {
            let first = server_transport.recv_frame().await.unwrap();
            let second = server_transport.recv_frame().await.unwrap();
            // Respond to the second request first.
            for (req_id, nonce) in [(second.req_id, 2u64), (first.req_id, 1u64)] {
                let response_schema = service.call(1).unwrap().response_schema().clone();
                let mut response = FieldStruct::new(response_schema);
                response.set(0, FieldValue::Uint(nonce));
                let encoded = response.encode().unwrap();
                server_transport
                    .send_frame(Message::response(1, req_id, encoded.body, encoded.data))
                    .await
                    .unwrap();
            }
        });

        let req_schema = client.state.service.call(1).unwrap().request_schema().clone();
        let (first, second) = tokio::join!(
            client.call(1, FieldStruct::new(req_schema.clone())),
            client.call(1, FieldStruct::new(req_schema)),
        );
        assert_eq!(first.unwrap().get(0), Some(&FieldValue::Uint(1)));
        assert_eq!(second.unwrap().get(0), Some(&FieldValue::Uint(2)));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_resolves_with_cancelled_error() {
        let (service, registry) = ping_fixture();
        let (client_transport, _server_transport) = Transport::mem_pair();
        let client = ClientDispatch::new(client_transport, service.clone(), registry, RapaceConfig::default());

        let req_schema = client.state.service.call(1).unwrap().request_schema().clone();
        let client_for_task = client.clone();
        let call_task = tokio::spawn(async move { client_for_task.call(1, FieldStruct::new(req_schema)).await });
        // Give the spawned call a chance to run up to its `rx.await` (send
        // the request, register req_id 1 in the correlation map) before the
        // (never-arriving) response would otherwise resolve it.
        tokio::task::yield_now().await;
        // First call allocates req_id 0 (spec.md §4.7: "monotonic from 0").
        let cancelled = client.cancel(0);
        assert!(cancelled);
        let result = call_task.await.unwrap();
        assert_eq!(result, Err(RapaceError::Lifecycle(LifecycleError::Cancelled)));
    }
}
