use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

/// Bounded FIFO of encoded frames shared between two loops.
///
/// The lock is held only for the push or pop itself. A push onto a full
/// queue is refused and the frame handed back is dropped by the caller;
/// nothing ever blocks or overwrites.
#[derive(Debug)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<Bytes>>,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Bytes>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a frame. Returns `false`, leaving the queue untouched, when full.
    pub fn try_push(&self, frame: Bytes) -> bool {
        let mut frames = self.lock();
        if frames.len() >= self.capacity {
            return false;
        }
        frames.push_back(frame);
        true
    }

    /// Take the oldest frame.
    pub fn pop(&self) -> Option<Bytes> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let queue = FrameQueue::new(4);
        assert!(queue.try_push(Bytes::from_static(b"a")));
        assert!(queue.try_push(Bytes::from_static(b"b")));
        assert_eq!(queue.pop().as_deref(), Some(&b"a"[..]));
        assert_eq!(queue.pop().as_deref(), Some(&b"b"[..]));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn full_queue_refuses_and_keeps_size() {
        let queue = FrameQueue::new(2);
        assert!(queue.try_push(Bytes::from_static(b"1")));
        assert!(queue.try_push(Bytes::from_static(b"2")));
        for _ in 0..5 {
            assert!(!queue.try_push(Bytes::from_static(b"x")));
            assert_eq!(queue.len(), 2);
        }
        assert_eq!(queue.pop().as_deref(), Some(&b"1"[..]));
        assert!(queue.try_push(Bytes::from_static(b"3")));
    }

    #[test]
    fn zero_capacity_drops_everything() {
        let queue = FrameQueue::new(0);
        assert!(!queue.try_push(Bytes::from_static(b"a")));
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 0);
    }
}
