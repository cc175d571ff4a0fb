//! Network layer.
//! Socket ownership, the per-connection receive/send state machines and
//! frame reassembly live here. Payload semantics do not: every complete
//! frame is handed to the application [`Hook`](crate::Hook) untouched.

use std::io;

pub use buffer::Error as BufferError;
pub(crate) use conn::Connection;
pub use conn::{ConnectionHandle, ConnectionId};
pub use packet::Error as PacketError;

pub(crate) mod buffer;
pub(crate) mod conn;
pub mod packet;
pub(crate) mod send_queue;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Packet error: {0}")]
    Packet(#[from] packet::Error),
    #[error("Buffer error: {0}")]
    Buffer(#[from] buffer::Error),
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
    #[error("Connection reset by peer")]
    ConnectionReset,
}
