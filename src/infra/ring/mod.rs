//! Fixed-capacity frame ring shared between a producer context (engine
//! interrupt or bus service task) and a consumer task.
//!
//! Storage is a lock-free `heapless` queue indexed by atomics, so neither side
//! ever takes a lock. Capacity must be a power of two. When the ring is full
//! the newest frame is rejected and counted; unread frames are never
//! overwritten.
use core::sync::atomic::{AtomicU32, Ordering};

use heapless::mpmc::MpMcQueue;

use crate::protocol::can_frame::CanFrame;

/// Bounded frame queue with occupancy and rejection counters.
pub struct FrameRing<const N: usize> {
    queue: MpMcQueue<CanFrame, N>,
    pushed: AtomicU32,
    popped: AtomicU32,
    rejected: AtomicU32,
}

impl<const N: usize> Default for FrameRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameRing<N> {
    /// Number of frames the ring holds before rejecting.
    pub const CAPACITY: usize = N;

    /// Empty ring. `N` must be a power of two below 255.
    pub const fn new() -> Self {
        Self {
            queue: MpMcQueue::new(),
            pushed: AtomicU32::new(0),
            popped: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
        }
    }

    /// Append a frame. A full ring hands the frame back and bumps the
    /// saturating rejection counter.
    pub fn push(&self, frame: CanFrame) -> Result<(), CanFrame> {
        match self.queue.enqueue(frame) {
            Ok(()) => {
                self.pushed.fetch_add(1, Ordering::Release);
                Ok(())
            }
            Err(frame) => {
                let _ = self
                    .rejected
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1));
                Err(frame)
            }
        }
    }

    /// Oldest frame, if any.
    pub fn pop(&self) -> Option<CanFrame> {
        let frame = self.queue.dequeue()?;
        self.popped.fetch_add(1, Ordering::Release);
        Some(frame)
    }

    /// Frames currently buffered. Approximate while the other side is active.
    pub fn len(&self) -> usize {
        let pushed = self.pushed.load(Ordering::Acquire);
        let popped = self.popped.load(Ordering::Acquire);
        let diff = pushed.wrapping_sub(popped) as usize;
        // A pop can land before the matching push is counted.
        if diff > N {
            0
        } else {
            diff
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames rejected because the ring was full (monotonic, saturating).
    #[inline]
    pub fn rejected(&self) -> u32 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Drop every buffered frame without delivering it; returns how many.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}
