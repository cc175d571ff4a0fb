//! Per-connection outbound queue.
//!
//! Producers on any thread append buffers; the connection's own task drains
//! them one wire write at a time. A cursor into the head buffer carries
//! partial writes forward, so a torn write resumes where it stopped and
//! buffers always leave in the exact order they arrived.

use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::Bytes;

pub(crate) struct SendQueue {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<Bytes>,
    /// Bytes of the head buffer already confirmed written.
    head_sent: usize,
    /// A write is currently outstanding (or a drain is in progress).
    sending: bool,
}

impl SendQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Append a buffer. Returns `true` when the queue just went from idle to
    /// busy and the caller must arm transmission; otherwise the in-flight
    /// drain picks the buffer up on its own. Callable from any thread; this
    /// never performs I/O itself.
    pub(crate) fn enqueue(&self, buf: Bytes) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.push_back(buf);
        if inner.sending {
            false
        } else {
            inner.sending = true;
            true
        }
    }

    /// Next slice to put on the wire, resuming the head buffer at its unsent
    /// cursor. `None` means the queue drained and transmission is idle again.
    /// Only called from the connection's own task, never concurrently with
    /// itself.
    pub(crate) fn begin_next_write(&self) -> Option<Bytes> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            let head_len = match inner.queue.front() {
                Some(head) => head.len(),
                None => {
                    inner.sending = false;
                    inner.head_sent = 0;
                    return None;
                }
            };
            // fully-written heads retire here as well, so a zero-length
            // buffer can never wedge the cursor
            if inner.head_sent >= head_len {
                inner.queue.pop_front();
                inner.head_sent = 0;
                continue;
            }
            let cursor = inner.head_sent;
            return inner.queue.front().map(|head| head.slice(cursor..));
        }
    }

    /// Record a (possibly partial) write completion. The head buffer pops
    /// only once every one of its bytes is confirmed written.
    pub(crate) fn on_write_completed(&self, bytes_written: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.head_sent += bytes_written;
        let head_len = inner.queue.front().map(|head| head.len());
        if let Some(head_len) = head_len {
            if inner.head_sent >= head_len {
                inner.queue.pop_front();
                inner.head_sent = 0;
            }
        }
    }

    /// Drop everything still queued. Teardown path only.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.clear();
        inner.head_sent = 0;
        inner.sending = false;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    /// Drain the queue as the connection task would, tearing each write into
    /// `chunk`-byte completions, and return the bytes "on the wire".
    fn drain_torn(queue: &SendQueue, chunk: usize) -> Vec<u8> {
        let mut wire = Vec::new();
        while let Some(slice) = queue.begin_next_write() {
            let n = slice.len().min(chunk);
            wire.extend_from_slice(&slice[..n]);
            queue.on_write_completed(n);
        }
        wire
    }

    #[test]
    fn enqueue_arms_only_the_idle_to_busy_transition() {
        let queue = SendQueue::new();
        assert!(queue.enqueue(Bytes::from_static(b"a")));
        assert!(!queue.enqueue(Bytes::from_static(b"b")));

        drain_torn(&queue, 16);

        // back to idle: the next enqueue arms again
        assert!(queue.enqueue(Bytes::from_static(b"c")));
    }

    #[test]
    fn buffers_leave_in_fifo_order_despite_torn_writes() {
        let queue = SendQueue::new();
        queue.enqueue(Bytes::from_static(b"AAAAA"));
        queue.enqueue(Bytes::from_static(b"BB"));
        queue.enqueue(Bytes::from_static(b"CCCCCCC"));

        // 3-byte completions tear both A and C
        assert_eq!(drain_torn(&queue, 3), b"AAAAABBCCCCCCC");
    }

    #[test]
    fn partial_write_resumes_at_the_cursor() {
        let queue = SendQueue::new();
        queue.enqueue(Bytes::from_static(b"abcdef"));

        let first = queue.begin_next_write().unwrap();
        assert_eq!(&first[..], b"abcdef");
        queue.on_write_completed(2);

        let rest = queue.begin_next_write().unwrap();
        assert_eq!(&rest[..], b"cdef");
        queue.on_write_completed(4);

        assert!(queue.begin_next_write().is_none());
    }

    #[test]
    fn zero_length_buffer_cannot_wedge_the_queue() {
        let queue = SendQueue::new();
        queue.enqueue(Bytes::new());
        queue.enqueue(Bytes::from_static(b"x"));

        assert_eq!(drain_torn(&queue, 16), b"x");
        assert!(queue.begin_next_write().is_none());
    }

    #[test]
    fn concurrent_enqueues_preserve_per_thread_order() {
        let queue = Arc::new(SendQueue::new());
        let mut producers = Vec::new();
        for thread in 0..4u8 {
            let queue = queue.clone();
            producers.push(std::thread::spawn(move || {
                for seq in 0..100u8 {
                    queue.enqueue(Bytes::copy_from_slice(&[thread, seq]));
                }
            }));
        }
        for producer in producers {
            producer.join().unwrap();
        }

        let mut last_seq: [Option<u8>; 4] = [None; 4];
        let mut drained = 0;
        while let Some(buf) = queue.begin_next_write() {
            let (thread, seq) = (buf[0] as usize, buf[1]);
            assert!(last_seq[thread].map_or(true, |prev| seq > prev));
            last_seq[thread] = Some(seq);
            queue.on_write_completed(buf.len());
            drained += 1;
        }
        assert_eq!(drained, 400);
    }

    #[test]
    fn clear_discards_queued_buffers_and_goes_idle() {
        let queue = SendQueue::new();
        queue.enqueue(Bytes::from_static(b"doomed"));
        queue.clear();

        assert!(queue.begin_next_write().is_none());
        assert!(queue.enqueue(Bytes::from_static(b"fresh")));
    }
}
