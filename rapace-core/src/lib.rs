//! Client dispatch (C7), server dispatch (C8), the I/O pump (C9), and the
//! transports they run over.

pub mod client;
pub mod message;
pub mod server;
pub mod status;
pub mod transport;

pub use client::ClientDispatch;
pub use message::Message;
pub use server::{Handler, RegisterError, ServerDispatch};
pub use transport::Transport;
