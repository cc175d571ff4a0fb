//! Length-prefixed framing.
//!
//! The one binding wire contract: every frame is a little-endian `u16`
//! payload length followed by that many payload bytes. No magic number, no
//! version byte, no checksum.

use bytes::{BufMut, Bytes, BytesMut};

/// Width of the length prefix.
pub const HEADER_LEN: usize = 2;

/// Largest payload the length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Payload length {0} exceeds the u16 frame limit")]
    PayloadTooLarge(usize),
    #[error("Declared frame length {declared} can never fit a {capacity} byte receive buffer")]
    FrameTooLarge { declared: usize, capacity: usize },
}

/// Encode one frame: the length prefix followed by `payload`.
pub fn encode(payload: &[u8]) -> Result<Bytes, Error> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::PayloadTooLarge(payload.len()));
    }
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u16_le(payload.len() as u16);
    frame.extend_from_slice(payload);
    Ok(frame.freeze())
}

/// Total length (header included) of the frame at the head of `readable`, or
/// `None` while its header or payload bytes are still in flight. A declared
/// length that can never fit `max_frame` bytes is an error: waiting for that
/// payload would block forever.
pub(crate) fn decode(readable: &[u8], max_frame: usize) -> Result<Option<usize>, Error> {
    if readable.len() < HEADER_LEN {
        return Ok(None);
    }
    let len = u16::from_le_bytes([readable[0], readable[1]]) as usize;
    let total = HEADER_LEN + len;
    if total > max_frame {
        return Err(Error::FrameTooLarge {
            declared: total,
            capacity: max_frame,
        });
    }
    if readable.len() < total {
        return Ok(None);
    }
    Ok(Some(total))
}
