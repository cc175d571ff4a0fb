//! One accepted socket, one connection.
//!
//! Each connection runs a single task that keeps at most one receive and at
//! most one write outstanding. Receive completions advance the buffer, run
//! the frame loop and re-arm the read; send completions drain the queue until
//! idle. Either side ending in error funnels into one idempotent teardown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::Notify;

use super::buffer::RecvBuffer;
use super::packet;
use super::send_queue::SendQueue;
use super::Error;
use crate::Hook;

/// Process-unique identity of one accepted connection.
pub type ConnectionId = u64;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

// Lifecycle is monotonic: Open -> Closing -> Closed, never backwards.
const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// State shared between the connection task and its handles.
struct Shared {
    id: ConnectionId,
    peer_addr: SocketAddr,
    state: AtomicU8,
    send_queue: SendQueue,
    send_ready: Notify,
    close_requested: Notify,
}

/// Cloneable application-side surface of a connection: identity, outbound
/// sends and close requests. Valid for the connection's whole lifetime;
/// operations on a closed connection are no-ops.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.load(Ordering::SeqCst) != OPEN
    }

    /// Queue raw bytes for transmission. The bytes are copied; the caller's
    /// buffer is never retained. Buffers reach the wire whole, in enqueue
    /// order. The queue has no depth limit: a producer that outruns the peer
    /// grows memory without bound.
    pub fn send(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.send_buffer(Bytes::copy_from_slice(data));
    }

    /// Frame `payload` (length prefix included) and queue it.
    pub fn send_packet(&self, payload: &[u8]) -> Result<(), packet::Error> {
        self.send_buffer(packet::encode(payload)?);
        Ok(())
    }

    fn send_buffer(&self, buf: Bytes) {
        if self.is_closed() {
            return;
        }
        // arm the writer only on the idle -> busy transition; an in-flight
        // drain picks the buffer up by itself
        if self.shared.send_queue.enqueue(buf) {
            self.shared.send_ready.notify_one();
        }
    }

    /// Request teardown. Safe to call any number of times, from anywhere.
    pub fn close(&self) {
        let transitioned = self
            .shared
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if transitioned {
            self.shared.close_requested.notify_one();
        }
    }
}

pub(crate) struct Connection<H: Hook> {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    recv_buffer: RecvBuffer,
    shared: Arc<Shared>,
    hook: Arc<H>,
}

impl<H: Hook> Connection<H> {
    pub(crate) fn new(stream: TcpStream, peer_addr: SocketAddr, hook: Arc<H>) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader,
            writer,
            recv_buffer: RecvBuffer::new(),
            shared: Arc::new(Shared {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                peer_addr,
                state: AtomicU8::new(OPEN),
                send_queue: SendQueue::new(),
                send_ready: Notify::new(),
                close_requested: Notify::new(),
            }),
            hook,
        }
    }

    pub(crate) fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            shared: self.shared.clone(),
        }
    }

    /// Run the connection to completion. Whatever ends it, teardown runs
    /// exactly once before this returns.
    pub(crate) async fn start(mut self) -> Result<(), Error> {
        self.hook.connected(self.handle()).await;
        let result = self.event_loop().await;
        self.teardown().await;
        result
    }

    async fn event_loop(&mut self) -> Result<(), Error> {
        loop {
            select! {
                read = self.reader.read(self.recv_buffer.writable()) => {
                    match read? {
                        0 => {
                            debug!("connection {}: closed by peer", self.shared.id);
                            return Ok(());
                        }
                        n => {
                            self.recv_buffer.advance_write(n)?;
                            self.deliver_frames().await?;
                            self.reserve_writable()?;
                        }
                    }
                }
                _ = self.shared.send_ready.notified() => {
                    self.drain_send_queue().await?;
                }
                _ = self.shared.close_requested.notified() => {
                    debug!("connection {}: close requested", self.shared.id);
                    return Ok(());
                }
            }
        }
    }

    /// Hand every complete frame in the buffer to the hook, in arrival order,
    /// then consume it. Incomplete header or payload bytes stay buffered for
    /// the next receive completion.
    async fn deliver_frames(&mut self) -> Result<(), Error> {
        loop {
            let readable = self.recv_buffer.readable();
            let total = match packet::decode(readable, self.recv_buffer.capacity())? {
                Some(total) => total,
                None => break,
            };
            let handle = self.handle();
            self.hook
                .packet(&handle, &readable[packet::HEADER_LEN..total])
                .await;
            self.recv_buffer.consume(total)?;
        }
        Ok(())
    }

    /// Guarantee room for the next receive. A buffer still full after
    /// compaction can never make progress and is fatal to this connection.
    fn reserve_writable(&mut self) -> Result<(), Error> {
        if self.recv_buffer.free_space() == 0 {
            self.recv_buffer.compact();
            if self.recv_buffer.free_space() == 0 {
                return Err(Error::Buffer(super::buffer::Error::CapacityExceeded {
                    capacity: self.recv_buffer.capacity(),
                }));
            }
        }
        Ok(())
    }

    /// Drain the queue until idle, one outstanding write at a time. Partial
    /// completions resume from the head buffer's cursor; a zero-byte
    /// completion means the peer is gone.
    async fn drain_send_queue(&mut self) -> Result<(), Error> {
        while let Some(chunk) = self.shared.send_queue.begin_next_write() {
            let written = self.writer.write(&chunk).await?;
            if written == 0 {
                return Err(Error::ConnectionReset);
            }
            self.shared.send_queue.on_write_completed(written);
        }
        Ok(())
    }

    /// Release the socket and buffers. The atomic swap makes this a no-op
    /// for every trigger after the first, however the triggers race.
    async fn teardown(&mut self) {
        if self.shared.state.swap(CLOSED, Ordering::SeqCst) == CLOSED {
            return;
        }
        let _ = self.writer.shutdown().await;
        self.shared.send_queue.clear();
        self.hook.disconnected(self.shared.id).await;
        info!(
            "connection {} ({}) closed",
            self.shared.id, self.shared.peer_addr
        );
    }
}
