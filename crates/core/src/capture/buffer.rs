//! Bounded frame hand-off with drop-oldest policy
//!
//! The capture loop is the only producer; any number of stream readers poll
//! it. Neither side ever waits on the other: a full buffer evicts its oldest
//! frame, an empty buffer answers `None`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::frame::EncodedFrame;

/// Default number of frames held
pub const DEFAULT_CAPACITY: usize = 2;

/// Latest-wins frame buffer shared by the capture loop and stream readers
pub struct FrameBuffer {
    /// Resident frames, oldest first
    slots: Mutex<VecDeque<EncodedFrame>>,

    /// Maximum resident frames
    capacity: usize,

    /// Total frames evicted unread
    evicted: AtomicU64,
}

impl FrameBuffer {
    /// Create a buffer holding at most `capacity` frames (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    /// Insert a frame, evicting the oldest ones if at capacity
    ///
    /// Returns how many frames were evicted.
    pub fn publish(&self, frame: EncodedFrame) -> usize {
        let mut slots = self.slots.lock();

        let mut dropped = 0;
        while slots.len() >= self.capacity {
            slots.pop_front();
            dropped += 1;
        }
        slots.push_back(frame);
        drop(slots);

        if dropped > 0 {
            self.evicted.fetch_add(dropped as u64, Ordering::Relaxed);
            tracing::trace!(dropped, capacity = self.capacity, "Frame buffer full, evicted oldest");
        }
        dropped
    }

    /// Remove and return the oldest frame, if any
    pub fn try_take(&self) -> Option<EncodedFrame> {
        self.slots.lock().pop_front()
    }

    /// Discard every resident frame
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total frames evicted unread since creation
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::FrameFormat;
    use std::sync::Arc;

    fn frame(tag: &'static [u8]) -> EncodedFrame {
        EncodedFrame::new(tag, FrameFormat::Jpeg)
    }

    #[test]
    fn test_drop_oldest_keeps_order() {
        let buffer = FrameBuffer::new(2);

        assert_eq!(buffer.publish(frame(b"F1")), 0);
        assert_eq!(buffer.publish(frame(b"F2")), 0);
        assert_eq!(buffer.publish(frame(b"F3")), 1);

        let drained: Vec<_> = std::iter::from_fn(|| buffer.try_take())
            .map(|f| f.data)
            .collect();
        assert_eq!(drained, vec![&b"F2"[..], &b"F3"[..]]);
        assert_eq!(buffer.evicted(), 1);
    }

    #[test]
    fn test_empty_take_returns_none() {
        let buffer = FrameBuffer::default();
        assert!(buffer.try_take().is_none());
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let buffer = FrameBuffer::new(0);
        buffer.publish(frame(b"A"));
        buffer.publish(frame(b"B"));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.try_take().unwrap().data, &b"B"[..]);
    }

    #[test]
    fn test_each_frame_delivered_once() {
        let buffer = Arc::new(FrameBuffer::new(64));
        for _ in 0..64 {
            buffer.publish(frame(b"x"));
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let buffer = buffer.clone();
                std::thread::spawn(move || std::iter::from_fn(|| buffer.try_take()).count())
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 64);
        assert!(buffer.is_empty());
    }
}
