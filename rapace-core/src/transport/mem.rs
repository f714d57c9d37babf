//! In-process transport: two halves joined by `tokio::sync::mpsc` channels,
//! one message at a time, no wire encoding at all.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rapace_protocol::error::TransportError;
use tokio::sync::{mpsc, Mutex};

use crate::message::Message;

const CHANNEL_CAPACITY: usize = 256;

struct Inner {
    tx: mpsc::Sender<Message>,
    rx: Mutex<mpsc::Receiver<Message>>,
    closed: AtomicBool,
}

/// One end of an in-process connection. Cheap to clone; clones share the
/// same channel pair.
#[derive(Clone)]
pub struct MemTransport {
    inner: Arc<Inner>,
}

impl fmt::Debug for MemTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemTransport")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl MemTransport {
    /// Build a connected pair: frames sent on one side arrive on the other.
    pub fn pair() -> (MemTransport, MemTransport) {
        let (tx_a, rx_b) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let a = MemTransport {
            inner: Arc::new(Inner {
                tx: tx_a,
                rx: Mutex::new(rx_a),
                closed: AtomicBool::new(false),
            }),
        };
        let b = MemTransport {
            inner: Arc::new(Inner {
                tx: tx_b,
                rx: Mutex::new(rx_b),
                closed: AtomicBool::new(false),
            }),
        };
        (a, b)
    }

    pub async fn send_frame(&self, message: Message) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        self.inner
            .tx
            .send(message)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    pub async fn recv_frame(&self) -> Result<Message, TransportError> {
        let mut rx = self.inner.rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
