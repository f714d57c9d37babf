//! The I/O pump (C9): a readiness-driven loop over a `tokio::net::TcpStream`
//! that decodes inbound frames and encodes outbound ones, backing off its
//! poll between [`RapaceConfig::io_tick_min`] and
//! [`RapaceConfig::io_tick_max`] when nothing is ready.

use std::fmt;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use rapace_protocol::config::RapaceConfig;
use rapace_protocol::error::TransportError;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::message::{encode_message, try_decode_message, Message};

const CHANNEL_CAPACITY: usize = 256;
const READ_CHUNK: usize = 64 * 1024;

/// Rough size of `message` for backpressure accounting: the bytes it will
/// contribute to the outbound buffer, not counting header overhead.
fn message_weight(message: &Message) -> usize {
    message.fwd.len() + message.body.len() + message.data.len()
}

struct Inner {
    inbound: Mutex<mpsc::Receiver<Message>>,
    outbound: mpsc::Sender<Message>,
    closed: Arc<AtomicBool>,
    notify_close: Arc<Notify>,
    outbound_bytes: Arc<AtomicUsize>,
    blocked: Arc<AtomicBool>,
    config: RapaceConfig,
}

/// One end of a socket-backed connection, driven by a background pump task.
#[derive(Clone)]
pub struct StreamTransport {
    inner: Arc<Inner>,
}

impl fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTransport")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl StreamTransport {
    /// Spawn the I/O pump over `stream` and return a handle to it.
    pub fn spawn(stream: TcpStream, config: RapaceConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let closed = Arc::new(AtomicBool::new(false));
        let notify_close = Arc::new(Notify::new());
        let outbound_bytes = Arc::new(AtomicUsize::new(0));
        let blocked = Arc::new(AtomicBool::new(false));

        let pump_closed = closed.clone();
        let pump_notify = notify_close.clone();
        let pump_outbound_bytes = outbound_bytes.clone();
        let pump_blocked = blocked.clone();
        let pump_config = config.clone();
        tokio::spawn(async move {
            run_pump(
                stream,
                pump_config,
                inbound_tx,
                outbound_rx,
                pump_notify,
                pump_outbound_bytes,
                pump_blocked,
            )
            .await;
            pump_closed.store(true, Ordering::Release);
        });

        StreamTransport {
            inner: Arc::new(Inner {
                inbound: Mutex::new(inbound_rx),
                outbound: outbound_tx,
                closed,
                notify_close,
                outbound_bytes,
                blocked,
                config,
            }),
        }
    }

    /// Refuses new submissions once the outbound buffer has crossed
    /// [`RapaceConfig::outbound_hwm`], until the pump has drained it back
    /// below [`RapaceConfig::outbound_lwm`] (spec.md §5/§6.7).
    pub async fn send_frame(&self, message: Message) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        if self.inner.blocked.load(Ordering::Acquire) {
            return Err(TransportError::BackpressureExceeded);
        }
        let weight = message_weight(&message);
        let pending = self.inner.outbound_bytes.fetch_add(weight, Ordering::AcqRel) + weight;
        if pending > self.inner.config.outbound_hwm {
            self.inner.blocked.store(true, Ordering::Release);
        }
        self.inner
            .outbound
            .send(message)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    pub async fn recv_frame(&self) -> Result<Message, TransportError> {
        let mut rx = self.inner.inbound.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify_close.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

async fn run_pump(
    mut stream: TcpStream,
    config: RapaceConfig,
    inbound_tx: mpsc::Sender<Message>,
    mut outbound_rx: mpsc::Receiver<Message>,
    notify_close: Arc<Notify>,
    outbound_bytes: Arc<AtomicUsize>,
    blocked: Arc<AtomicBool>,
) {
    let mut read_buf = BytesMut::with_capacity(READ_CHUNK);
    let mut tick = config.io_tick_min;

    'pump: loop {
        let mut progressed = false;

        while let Ok(message) = outbound_rx.try_recv() {
            let weight = message_weight(&message);
            match encode_message(&message, config.max_frame_payload, config.header_format) {
                Ok(bytes) => {
                    if let Err(e) = stream.write_all(&bytes).await {
                        tracing::warn!(error = %e, "stream write failed, closing connection");
                        break 'pump;
                    }
                    progressed = true;
                }
                Err(e) => tracing::warn!(error = %e, "failed to encode outbound message, dropping it"),
            }
            let remaining = outbound_bytes.fetch_sub(weight, Ordering::AcqRel) - weight;
            if blocked.load(Ordering::Acquire) && remaining <= config.outbound_lwm {
                blocked.store(false, Ordering::Release);
            }
        }

        loop {
            match try_decode_message(&read_buf, config.max_frame_payload, config.header_format) {
                Ok(Some((consumed, message))) => {
                    read_buf.advance(consumed);
                    if inbound_tx.send(message).await.is_err() {
                        break 'pump;
                    }
                    progressed = true;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "protocol error decoding frame, closing connection");
                    break 'pump;
                }
            }
        }

        if progressed {
            tick = config.io_tick_min;
            continue;
        }

        tokio::select! {
            _ = notify_close.notified() => break 'pump,
            readable = stream.readable() => {
                if readable.is_err() {
                    break 'pump;
                }
                match stream.try_read_buf(&mut read_buf) {
                    Ok(0) => break 'pump,
                    Ok(_) => tick = config.io_tick_min,
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "stream read failed, closing connection");
                        break 'pump;
                    }
                }
            }
            _ = tokio::time::sleep(tick) => {
                tick = (tick * 2).min(config.io_tick_max);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pumps_a_request_across_a_loopback_socket() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            StreamTransport::spawn(socket, RapaceConfig::default())
        });
        let client_socket = TcpStream::connect(addr).await.unwrap();
        let client = StreamTransport::spawn(client_socket, RapaceConfig::default());
        let server = accept.await.unwrap();

        client
            .send_frame(Message::request(3, 1, vec![1, 2, 3], vec![]))
            .await
            .unwrap();
        let received = server.recv_frame().await.unwrap();
        assert_eq!(received.msg_type, 3);
        assert_eq!(received.body, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn pumps_a_request_using_the_short_header_format() {
        use rapace_protocol::header::HeaderFormat;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut config = RapaceConfig::default();
        config.header_format = HeaderFormat::Short;

        let accept = {
            let config = config.clone();
            tokio::spawn(async move {
                let (socket, _) = listener.accept().await.unwrap();
                StreamTransport::spawn(socket, config)
            })
        };
        let client_socket = TcpStream::connect(addr).await.unwrap();
        let client = StreamTransport::spawn(client_socket, config);
        let server = accept.await.unwrap();

        client
            .send_frame(Message::request(3, 1, vec![1, 2, 3], vec![]))
            .await
            .unwrap();
        let received = server.recv_frame().await.unwrap();
        assert_eq!(received.msg_type, 3);
        assert_eq!(received.req_id, 1);
        assert_eq!(received.body, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn crossing_the_high_water_mark_refuses_new_sends() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            StreamTransport::spawn(socket, RapaceConfig::default())
        });
        let client_socket = TcpStream::connect(addr).await.unwrap();
        let mut config = RapaceConfig::default();
        config.outbound_hwm = 10;
        config.outbound_lwm = 0;
        let client = StreamTransport::spawn(client_socket, config);
        let _server = accept.await.unwrap();

        // First send's own weight (20 bytes) already crosses the 10-byte
        // high-water mark, so it trips `blocked` before the pump gets a
        // chance to drain anything.
        client
            .send_frame(Message::request(1, 1, vec![0; 20], vec![]))
            .await
            .unwrap();
        let second = client.send_frame(Message::request(1, 2, vec![0; 1], vec![])).await;
        assert_eq!(second, Err(TransportError::BackpressureExceeded));
    }

    #[tokio::test]
    async fn closing_the_socket_fails_pending_recv() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            StreamTransport::spawn(socket, RapaceConfig::default())
        });
        let client_socket = TcpStream::connect(addr).await.unwrap();
        let client = StreamTransport::spawn(client_socket, RapaceConfig::default());
        let server = accept.await.unwrap();

        client.close();
        drop(client);
        assert!(server.recv_frame().await.is_err());
    }
}
