//! Frame router: fans every received frame out to the binary codec and to the
//! line codec owning the frame's bus.
//!
//! Delivery order is binary first, then line. Both sinks see the same frame
//! value. Codec tasks that own their session elsewhere are reached through a
//! [`FrameMailbox`].
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Sender, TrySendError};

use crate::core::{MAX_BUSES, RX_RING_CAPACITY};
use crate::error::GatewayError;
use crate::protocol::bus::{BusManager, CanEngine};
use crate::protocol::can_frame::CanFrame;
use crate::protocol::traits::frame_sink::FrameSink;

//==================================================================================ACTIVITY
/// "Frame activity occurred" signal, raised by the router and consumed by the
/// idle timer.
#[derive(Debug, Default)]
pub struct ActivityFlag(AtomicBool);

impl ActivityFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    #[inline]
    pub fn signal(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Read and clear.
    #[inline]
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

//==================================================================================MAILBOX
/// Non-blocking hand-off of frames to a task through an embassy channel.
/// Frames that do not fit are dropped and counted.
pub struct FrameMailbox<'a, M: RawMutex, const C: usize> {
    sender: Sender<'a, M, CanFrame, C>,
    dropped: u32,
}

impl<'a, M: RawMutex, const C: usize> FrameMailbox<'a, M, C> {
    pub fn new(sender: Sender<'a, M, CanFrame, C>) -> Self {
        Self {
            sender,
            dropped: 0,
        }
    }

    /// Frames lost because the receiving task fell behind.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl<M: RawMutex, const C: usize> FrameSink for FrameMailbox<'_, M, C> {
    fn deliver(&mut self, frame: &CanFrame) {
        if let Err(TrySendError::Full(_)) = self.sender.try_send(*frame) {
            self.dropped = self.dropped.saturating_add(1);
            #[cfg(feature = "defmt")]
            defmt::warn!("mailbox full, frame from bus {} dropped", frame.bus());
        }
    }
}

//==================================================================================ROUTER
pub struct FrameRouter<'a, G: FrameSink, L: FrameSink, const N: usize = MAX_BUSES> {
    binary: G,
    lines: [Option<L>; N],
    activity: &'a ActivityFlag,
    routed: u32,
}

impl<'a, G: FrameSink, L: FrameSink, const N: usize> FrameRouter<'a, G, L, N> {
    /// Router with no line sink attached.
    pub fn new(binary: G, activity: &'a ActivityFlag) -> Self {
        Self {
            binary,
            lines: core::array::from_fn(|_| None),
            activity,
            routed: 0,
        }
    }

    /// Attach the line sink of `bus`, returning the one it replaces.
    pub fn attach(&mut self, bus: u8, sink: L) -> Result<Option<L>, GatewayError> {
        let slot = self
            .lines
            .get_mut(bus as usize)
            .ok_or(GatewayError::InvalidBus { bus })?;
        Ok(slot.replace(sink))
    }

    /// Detach the line sink of `bus` (bus disabled).
    pub fn detach(&mut self, bus: u8) -> Option<L> {
        self.lines.get_mut(bus as usize)?.take()
    }

    pub fn has_line(&self, bus: u8) -> bool {
        matches!(self.lines.get(bus as usize), Some(Some(_)))
    }

    /// Frames routed so far (wraps).
    pub fn routed(&self) -> u32 {
        self.routed
    }

    pub fn binary_mut(&mut self) -> &mut G {
        &mut self.binary
    }

    pub fn line_mut(&mut self, bus: u8) -> Option<&mut L> {
        self.lines.get_mut(bus as usize)?.as_mut()
    }

    /// Deliver one frame: binary sink, then the line sink of its bus.
    pub fn route(&mut self, frame: &CanFrame) {
        self.binary.deliver(frame);
        if let Some(Some(line)) = self.lines.get_mut(frame.bus() as usize) {
            line.deliver(frame);
        }
        self.routed = self.routed.wrapping_add(1);
        self.activity.signal();
    }

    /// Pop every bus's RX ring in FIFO order and route the frames. Each bus
    /// gives at most one ring's worth per call. Returns the number routed.
    pub fn drain<M: RawMutex, E: CanEngine, const B: usize>(
        &mut self,
        manager: &BusManager<M, E, B>,
    ) -> usize {
        let mut routed = 0;
        for bus in 0..manager.bus_count() {
            for _ in 0..RX_RING_CAPACITY {
                match manager.receive(bus) {
                    Ok(Some(frame)) => {
                        self.route(&frame);
                        routed += 1;
                    }
                    _ => break,
                }
            }
        }
        routed
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
