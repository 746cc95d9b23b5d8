//! Fixed-capacity circular byte buffer guarded by a mutex.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Returned when a write does not fit in the remaining capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ingestion buffer full: {requested} bytes requested, {available} available")]
pub struct BufferFull {
    /// Bytes the caller tried to enqueue.
    pub requested: usize,
    /// Free bytes at the time of the attempt.
    pub available: usize,
}

/// Circular storage. `head` is the oldest byte, `len` bytes follow it (wrapping).
#[derive(Debug)]
struct Ring {
    storage: Box<[u8]>,
    head: usize,
    len: usize,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn available(&self) -> usize {
        self.capacity() - self.len
    }

    /// Copy `bytes` after the tail. Caller has checked capacity.
    fn write(&mut self, bytes: &[u8]) {
        let capacity = self.capacity();
        let tail = (self.head + self.len) % capacity;
        let first = bytes.len().min(capacity - tail);
        self.storage[tail..tail + first].copy_from_slice(&bytes[..first]);
        self.storage[..bytes.len() - first].copy_from_slice(&bytes[first..]);
        self.len += bytes.len();
    }

    /// Move up to `out.len()` of the oldest bytes into `out`.
    fn read(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.len);
        if count == 0 {
            return 0;
        }
        let capacity = self.capacity();
        let first = count.min(capacity - self.head);
        out[..first].copy_from_slice(&self.storage[self.head..self.head + first]);
        out[first..count].copy_from_slice(&self.storage[..count - first]);
        self.head = (self.head + count) % capacity;
        self.len -= count;
        count
    }
}

/// Bounded, lock-protected byte container shared between the multiplexer
/// (producer) and downstream consumers.
///
/// Every operation takes the internal lock, so a chunk enqueued by one call
/// is never interleaved with another writer's bytes.
#[derive(Debug)]
pub struct SharedIngestionBuffer {
    inner: Mutex<Ring>,
    capacity: usize,
}

impl SharedIngestionBuffer {
    /// Create an empty buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Ring {
                storage: vec![0; capacity].into_boxed_slice(),
                head: 0,
                len: 0,
            }),
            capacity,
        }
    }

    // The ring is never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.lock().available() == 0
    }

    /// Free space in bytes.
    pub fn available(&self) -> usize {
        self.lock().available()
    }

    /// Enqueue a single byte.
    pub fn push(&self, byte: u8) -> Result<(), BufferFull> {
        self.enqueue(&[byte])
    }

    /// Enqueue a whole chunk, or nothing at all.
    ///
    /// Capacity is checked against the full length under the lock before any
    /// byte is copied. An empty chunk always succeeds.
    pub fn enqueue(&self, bytes: &[u8]) -> Result<(), BufferFull> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut ring = self.lock();
        let available = ring.available();
        if bytes.len() > available {
            return Err(BufferFull {
                requested: bytes.len(),
                available,
            });
        }
        ring.write(bytes);
        Ok(())
    }

    /// Remove and return the oldest byte.
    pub fn pop(&self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.lock().read(&mut byte) {
            0 => None,
            _ => Some(byte[0]),
        }
    }

    /// Move the oldest bytes into `out`, returning how many were copied.
    pub fn dequeue(&self, out: &mut [u8]) -> usize {
        self.lock().read(out)
    }

    /// Remove up to `max` of the oldest bytes.
    pub fn drain(&self, max: usize) -> Vec<u8> {
        let mut ring = self.lock();
        let mut out = vec![0; max.min(ring.len)];
        ring.read(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn enqueue_preserves_order() {
        let buffer = SharedIngestionBuffer::new(16);
        buffer.enqueue(b"hello ").unwrap();
        buffer.enqueue(b"world").unwrap();

        assert_eq!(buffer.len(), 11);
        assert_eq!(buffer.drain(usize::MAX), b"hello world");
        assert!(buffer.is_empty());
    }

    #[test]
    fn enqueue_is_all_or_nothing() {
        let buffer = SharedIngestionBuffer::new(8);
        buffer.enqueue(b"abcde").unwrap();

        let err = buffer.enqueue(b"fghi").unwrap_err();
        assert_eq!(err, BufferFull { requested: 4, available: 3 });

        // Earlier bytes untouched, nothing from the rejected chunk written.
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.drain(usize::MAX), b"abcde");
    }

    #[test]
    fn exact_fit_succeeds() {
        let buffer = SharedIngestionBuffer::new(4);
        buffer.enqueue(b"abcd").unwrap();
        assert!(buffer.is_full());
        assert_eq!(buffer.push(b'e'), Err(BufferFull { requested: 1, available: 0 }));
    }

    #[test]
    fn empty_chunk_always_fits() {
        let buffer = SharedIngestionBuffer::new(2);
        buffer.enqueue(b"xy").unwrap();
        assert!(buffer.enqueue(b"").is_ok());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn writes_wrap_around_the_end() {
        let buffer = SharedIngestionBuffer::new(8);
        buffer.enqueue(b"123456").unwrap();
        assert_eq!(buffer.drain(4), b"1234");

        // tail sits at index 6, this chunk wraps to the front
        buffer.enqueue(b"abcdef").unwrap();
        assert!(buffer.is_full());

        let mut out = [0u8; 8];
        assert_eq!(buffer.dequeue(&mut out), 8);
        assert_eq!(&out, b"56abcdef");
    }

    #[test]
    fn pop_returns_oldest_first() {
        let buffer = SharedIngestionBuffer::new(3);
        buffer.push(b'a').unwrap();
        buffer.push(b'b').unwrap();

        assert_eq!(buffer.pop(), Some(b'a'));
        assert_eq!(buffer.pop(), Some(b'b'));
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let buffer = SharedIngestionBuffer::new(0);
        assert!(buffer.is_full());
        assert!(buffer.push(1).is_err());
        assert_eq!(buffer.drain(10), Vec::<u8>::new());
    }

    #[test]
    fn concurrent_chunks_never_interleave() {
        let buffer = Arc::new(SharedIngestionBuffer::new(4096));
        let writers: Vec<_> = (0..4u8)
            .map(|id| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..64 {
                        buffer.enqueue(&[id; 16]).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let bytes = buffer.drain(usize::MAX);
        assert_eq!(bytes.len(), 4096);
        for chunk in bytes.chunks(16) {
            assert!(chunk.iter().all(|b| *b == chunk[0]));
        }
    }
}
