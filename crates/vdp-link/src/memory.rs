use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::{LinkError, Result};
use crate::traits::Link;

/// Default capacity of each direction of a [`MemoryLink`] pair.
pub const DEFAULT_PIPE_CAPACITY: usize = 4096;

#[derive(Debug)]
struct Pipe {
    bytes: VecDeque<u8>,
    capacity: usize,
    closed: bool,
}

impl Pipe {
    fn shared(capacity: usize) -> Arc<Mutex<Pipe>> {
        Arc::new(Mutex::new(Pipe {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
            closed: false,
        }))
    }
}

fn lock(pipe: &Mutex<Pipe>) -> MutexGuard<'_, Pipe> {
    pipe.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One end of an in-process link.
///
/// Each direction is a bounded byte pipe, so writes can come up short exactly
/// like a hardware transmit buffer, and [`Link::flush`] throws away whatever
/// the peer has not read yet.
#[derive(Debug)]
pub struct MemoryLink {
    tx: Arc<Mutex<Pipe>>,
    rx: Arc<Mutex<Pipe>>,
}

impl MemoryLink {
    /// Create two connected ends with the default per-direction capacity.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(DEFAULT_PIPE_CAPACITY)
    }

    /// Create two connected ends, each direction holding at most `capacity` bytes.
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let a_to_b = Pipe::shared(capacity);
        let b_to_a = Pipe::shared(capacity);
        let a = Self {
            tx: Arc::clone(&a_to_b),
            rx: Arc::clone(&b_to_a),
        };
        let b = Self {
            tx: b_to_a,
            rx: a_to_b,
        };
        (a, b)
    }

    /// Bytes written by this end that the peer has not read yet.
    pub fn pending_outbound(&self) -> usize {
        lock(&self.tx).bytes.len()
    }
}

impl Link for MemoryLink {
    fn bytes_available(&mut self) -> Result<usize> {
        let rx = lock(&self.rx);
        if rx.bytes.is_empty() && rx.closed {
            return Err(LinkError::Closed);
        }
        Ok(rx.bytes.len())
    }

    fn write_free(&mut self) -> Result<usize> {
        let tx = lock(&self.tx);
        if tx.closed {
            return Err(LinkError::Closed);
        }
        Ok(tx.capacity.saturating_sub(tx.bytes.len()))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut rx = lock(&self.rx);
        if rx.bytes.is_empty() && rx.closed {
            return Err(LinkError::Closed);
        }
        let n = buf.len().min(rx.bytes.len());
        for (slot, byte) in buf.iter_mut().zip(rx.bytes.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut tx = lock(&self.tx);
        if tx.closed {
            return Err(LinkError::Closed);
        }
        let free = tx.capacity.saturating_sub(tx.bytes.len());
        let n = buf.len().min(free);
        tx.bytes.extend(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        let mut tx = lock(&self.tx);
        let discarded = tx.bytes.len();
        tx.bytes.clear();
        if discarded > 0 {
            trace!(discarded, "memory link outbound reset");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        lock(&self.tx).closed = true;
        lock(&self.rx).closed = true;
    }
}
