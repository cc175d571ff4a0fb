//! Fixed-capacity receive buffer with independent read/write cursors.
//!
//! Socket reads land directly in the writable tail, frame extraction consumes
//! from the readable middle, and compaction slides unread bytes back to
//! offset zero to reclaim trailing space. Capacity never grows; a connection
//! that cannot fit its data even after compaction is in error.

/// Receive batch granularity; compaction runs once free space drops below one
/// chunk, so the memcpy cost amortizes over chunk-sized reads.
pub(crate) const CHUNK_SIZE: usize = 4096;

const CHUNK_COUNT: usize = 5;

pub(crate) const CAPACITY: usize = CHUNK_SIZE * CHUNK_COUNT;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{requested} bytes out of range, {available} available")]
    OutOfRange { requested: usize, available: usize },
    #[error("Receive buffer capacity {capacity} exceeded")]
    CapacityExceeded { capacity: usize },
}

/// Invariant: `0 <= read_pos <= write_pos <= capacity`. Bytes outside
/// `[read_pos, write_pos)` are never observable through [`readable`].
///
/// [`readable`]: RecvBuffer::readable
pub(crate) struct RecvBuffer {
    buf: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
}

impl RecvBuffer {
    pub(crate) fn new() -> Self {
        Self::with_capacity(CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes available to read.
    pub(crate) fn data_length(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Bytes writable without compaction.
    pub(crate) fn free_space(&self) -> usize {
        self.buf.len() - self.write_pos
    }

    /// Region a socket read deposits into. Call [`advance_write`] with the
    /// exact byte count afterwards.
    ///
    /// [`advance_write`]: RecvBuffer::advance_write
    pub(crate) fn writable(&mut self) -> &mut [u8] {
        &mut self.buf[self.write_pos..]
    }

    /// Unread bytes, in arrival order.
    pub(crate) fn readable(&self) -> &[u8] {
        &self.buf[self.read_pos..self.write_pos]
    }

    pub(crate) fn advance_write(&mut self, n: usize) -> Result<(), Error> {
        if n > self.free_space() {
            return Err(Error::OutOfRange {
                requested: n,
                available: self.free_space(),
            });
        }
        self.write_pos += n;

        // reclaim trailing space before the next receive gets cramped
        if self.free_space() < CHUNK_SIZE {
            self.compact();
        }
        Ok(())
    }

    pub(crate) fn consume(&mut self, n: usize) -> Result<(), Error> {
        if n > self.data_length() {
            return Err(Error::OutOfRange {
                requested: n,
                available: self.data_length(),
            });
        }
        self.read_pos += n;

        // empty buffer: both cursors back to zero, a free full compaction
        if self.read_pos == self.write_pos {
            self.read_pos = 0;
            self.write_pos = 0;
        }
        Ok(())
    }

    /// Slide the unread bytes to offset zero. Never invoked mid-write; the
    /// connection only calls into here between completions.
    pub(crate) fn compact(&mut self) {
        let len = self.data_length();
        if len > 0 && self.read_pos > 0 {
            self.buf.copy_within(self.read_pos..self.write_pos, 0);
        }
        self.read_pos = 0;
        self.write_pos = len;
    }

    /// Copy-in path for callers that already hold the bytes. Compacts on
    /// demand; bytes that cannot fit even then are a capacity error and the
    /// buffer is left unchanged.
    pub(crate) fn write_bytes(&mut self, src: &[u8]) -> Result<(), Error> {
        if src.len() > self.free_space() {
            self.compact();
            if src.len() > self.free_space() {
                return Err(Error::CapacityExceeded {
                    capacity: self.capacity(),
                });
            }
        }
        self.buf[self.write_pos..self.write_pos + src.len()].copy_from_slice(src);
        self.write_pos += src.len();

        if self.free_space() < CHUNK_SIZE {
            self.compact();
        }
        Ok(())
    }
}
