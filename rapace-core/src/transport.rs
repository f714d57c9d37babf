//! Transport abstraction both client and server dispatch talk through,
//! without caring which backend a given connection uses.

pub mod mem;
pub mod stream;

use rapace_protocol::error::TransportError;

use crate::message::Message;
use mem::MemTransport;
use stream::StreamTransport;

/// A connection capable of sending and receiving whole [`Message`]s.
///
/// A plain enum rather than a trait object: there are exactly two backends
/// and neither dispatch crate needs to be generic over a third.
#[derive(Clone, Debug)]
pub enum Transport {
    Mem(MemTransport),
    Stream(StreamTransport),
}

impl Transport {
    pub async fn send_frame(&self, message: Message) -> Result<(), TransportError> {
        match self {
            Transport::Mem(t) => t.send_frame(message).await,
            Transport::Stream(t) => t.send_frame(message).await,
        }
    }

    pub async fn recv_frame(&self) -> Result<Message, TransportError> {
        match self {
            Transport::Mem(t) => t.recv_frame().await,
            Transport::Stream(t) => t.recv_frame().await,
        }
    }

    pub fn close(&self) {
        match self {
            Transport::Mem(t) => t.close(),
            Transport::Stream(t) => t.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Transport::Mem(t) => t.is_closed(),
            Transport::Stream(t) => t.is_closed(),
        }
    }

    /// Build a connected in-process pair.
    pub fn mem_pair() -> (Transport, Transport) {
        let (a, b) = MemTransport::pair();
        (Transport::Mem(a), Transport::Mem(b))
    }
}

impl From<MemTransport> for Transport {
    fn from(t: MemTransport) -> Self {
        Transport::Mem(t)
    }
}

impl From<StreamTransport> for Transport {
    fn from(t: StreamTransport) -> Self {
        Transport::Stream(t)
    }
}
