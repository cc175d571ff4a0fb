//! A connection engine for packet-based TCP servers.
//!
//! The engine owns the accept loop, one receive/send state machine per
//! connection and the length-prefixed frame reassembly. What a frame payload
//! means is left entirely to the application, which plugs in via [`Hook`].

use async_trait::async_trait;

pub mod config;
pub mod error;
pub mod network;
pub mod server;

pub use network::{ConnectionHandle, ConnectionId};

/// Engine events, implemented by the application.
#[async_trait]
pub trait Hook: Send + Sync + 'static {
    /// A connection has been accepted. The handle may be cloned and retained;
    /// it stays valid (sends become no-ops) after the connection closes.
    async fn connected(&self, conn: ConnectionHandle);
    /// One fully reassembled frame payload, in arrival order.
    /// Runs inline in the receive loop, so it must not block for long.
    async fn packet(&self, conn: &ConnectionHandle, payload: &[u8]);
    /// The connection has been torn down; no further frames follow.
    async fn disconnected(&self, id: ConnectionId);
}

/// Hook that ignores every event.
pub struct HookNoop;

#[async_trait]
impl Hook for HookNoop {
    async fn connected(&self, _conn: ConnectionHandle) {}
    async fn packet(&self, _conn: &ConnectionHandle, _payload: &[u8]) {}
    async fn disconnected(&self, _id: ConnectionId) {}
}
