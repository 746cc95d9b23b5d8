//! Receive path: moves bytes from a ready connection into the ingestion buffer.

use std::io::{self, ErrorKind, Read};

use crate::buffer::{BufferFull, SharedIngestionBuffer};

/// Reads allowed per connection per wake-up before it has to yield.
pub const DEFAULT_READ_BUDGET: usize = 16;

/// Outcome of a successful receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// The socket has no more data for now.
    Drained { bytes: usize },
    /// The read budget ran out with data possibly still pending.
    Yielded { bytes: usize },
    /// The peer shut down its side (zero-byte read).
    Closed { bytes: usize },
}

impl Received {
    /// Bytes enqueued during this receive.
    pub fn bytes(&self) -> usize {
        match *self {
            Received::Drained { bytes }
            | Received::Yielded { bytes }
            | Received::Closed { bytes } => bytes,
        }
    }
}

/// Per-connection receive failures. Recoverable for the listener, fatal for
/// the connection.
#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("read failed: {0}")]
    Read(#[from] io::Error),
    #[error(transparent)]
    BufferFull(#[from] BufferFull),
}

/// Drain `source` into `buffer`, one chunk of up to `scratch.len()` bytes per
/// read.
///
/// Each chunk is enqueued with a single all-or-nothing call, so a chunk that
/// does not fit is rejected whole while earlier chunks stay in order. Stops
/// at `WouldBlock`, at end-of-stream or after `budget` reads.
pub fn receive<R: Read>(
    buffer: &SharedIngestionBuffer,
    source: &mut R,
    scratch: &mut [u8],
    budget: usize,
) -> Result<Received, ReceiveError> {
    debug_assert!(!scratch.is_empty(), "empty scratch reads as end-of-stream");

    let budget = budget.max(1);
    let mut bytes = 0;
    let mut reads = 0;

    loop {
        if reads == budget {
            return Ok(Received::Yielded { bytes });
        }
        match source.read(scratch) {
            Ok(0) => return Ok(Received::Closed { bytes }),
            Ok(n) => {
                reads += 1;
                buffer.enqueue(&scratch[..n])?;
                bytes += n;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                return Ok(Received::Drained { bytes });
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
