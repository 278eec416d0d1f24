//! Bounded single-producer/single-consumer byte queue (`spec.md` §4.2).
//!
//! Each tunnel owns a pair of these: `rio` (bytes read from the endpoint,
//! awaiting a `DATA` record) and `wio` (bytes read from the channel,
//! awaiting a write to the endpoint). Grounded in the accounting style of
//! `session/ring_buffer.rs` from the teacher repo, but bounded rather than
//! overwriting — exceeding capacity is the backpressure signal from
//! `spec.md` §4.3, not something to silently drop.

/// Diagnostic tag distinguishing buffer pairs by endpoint kind. Carries no
/// behavior; used only in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTag {
    Tcp,
    Process,
}

impl std::fmt::Display for BufferTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Process => write!(f, "proc"),
        }
    }
}

/// Raised when [`IoBuffer::append`] would exceed the configured capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("buffer full: {len} + {incoming} > {cap}")]
pub struct BufferFull {
    pub len: usize,
    pub incoming: usize,
    pub cap: usize,
}

/// A bounded byte queue with append/peek/consume and running statistics.
#[derive(Debug)]
pub struct IoBuffer {
    data: std::collections::VecDeque<u8>,
    cap: usize,
    total: u64,
    tag: BufferTag,
}

impl IoBuffer {
    pub fn new(cap: usize, tag: BufferTag) -> Self {
        Self {
            data: std::collections::VecDeque::new(),
            cap,
            total: 0,
            tag,
        }
    }

    /// Append bytes to the tail. Fails without partial writes if `data`
    /// would push the buffer past capacity.
    pub fn append(&mut self, incoming: &[u8]) -> Result<(), BufferFull> {
        if self.data.len() + incoming.len() > self.cap {
            return Err(BufferFull {
                len: self.data.len(),
                incoming: incoming.len(),
                cap: self.cap,
            });
        }
        self.data.extend(incoming.iter().copied());
        self.total += incoming.len() as u64;
        Ok(())
    }

    /// Borrow the buffered bytes in order without consuming them.
    ///
    /// `VecDeque` may store its contents as two discontiguous slices once the
    /// ring has wrapped; `make_contiguous` rotates the storage so the whole
    /// of `len()` is covered by one slice, which the dispatcher's
    /// drain-in-chunks forwarding loop (`spec.md` §4.5) and `wio` drain both
    /// rely on — a view over only the front slice would let `len()` overstate
    /// what `peek()` actually returns once a long-lived tunnel has wrapped.
    pub fn peek(&mut self) -> &[u8] {
        self.data.make_contiguous()
    }

    /// Drop the first `n` bytes (must be `<= len()`).
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.data.len());
        self.data.drain(..n.min(self.data.len()));
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Total bytes ever appended, for diagnostics.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn tag(&self) -> BufferTag {
        self.tag
    }
}

/// The `rio`/`wio` pair owned by a single tunnel, sharing a diagnostic tag.
#[derive(Debug)]
pub struct BufferPair {
    pub rio: IoBuffer,
    pub wio: IoBuffer,
}

impl BufferPair {
    pub fn new(cap: usize, tag: BufferTag) -> Self {
        Self {
            rio: IoBuffer::new(cap, tag),
            wio: IoBuffer::new(cap, tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_consume() {
        let mut buf = IoBuffer::new(16, BufferTag::Tcp);
        buf.append(b"hello").unwrap();
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.peek(), b"hello");
        buf.consume(2);
        assert_eq!(buf.peek(), b"llo");
        assert_eq!(buf.total(), 5);
    }

    #[test]
    fn append_fails_over_capacity() {
        let mut buf = IoBuffer::new(4, BufferTag::Process);
        buf.append(b"abcd").unwrap();
        let err = buf.append(b"e").unwrap_err();
        assert_eq!(err.cap, 4);
        // failed append left the buffer untouched
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn peek_covers_full_len_after_wrap() {
        // Repeated small append/consume cycles force the VecDeque's backing
        // storage to wrap around its capacity, so `peek()` is no longer the
        // contiguous front of storage and must cover the whole logical
        // length (`spec.md` §4.2) — this is the steady state any long-lived
        // tunnel reaches after moving more bytes than one buffer generation.
        let mut buf = IoBuffer::new(8, BufferTag::Tcp);
        for _ in 0..20 {
            buf.append(b"abc").unwrap();
            assert_eq!(buf.peek().len(), buf.len());
            buf.consume(3);
        }
        buf.append(b"abcdefgh").unwrap();
        assert_eq!(buf.peek(), b"abcdefgh");
        assert_eq!(buf.peek().len(), buf.len());
    }

    #[test]
    fn consume_releases_memory_progressively() {
        let mut buf = IoBuffer::new(8, BufferTag::Tcp);
        buf.append(b"abcdefgh").unwrap();
        buf.consume(8);
        assert!(buf.is_empty());
        buf.append(b"more").unwrap();
        assert_eq!(buf.peek(), b"more");
    }
}
