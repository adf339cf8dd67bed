//! Interface consumed from the underlying software CAN engine (bit timing,
//! arbitration and PHY handling live on the other side of these traits).
use crate::protocol::can_frame::CanFrame;

/// Protocol counters maintained by the engine for one bus.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineStats {
    pub rx_total: u32,
    pub tx_total: u32,
    pub tx_attempt: u32,
    pub parse_error: u32,
}

/// The engine's transmit queue has no room; the frame was not taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxQueueFull;

/// A running engine instance bound to one bus.
pub trait EngineChannel {
    /// Next frame decoded from the wire, if any. Never blocks.
    fn poll_receive(&mut self) -> Option<CanFrame>;

    /// Hand a frame to the engine for transmission.
    fn submit_transmit(&mut self, frame: &CanFrame) -> Result<(), TxQueueFull>;

    fn statistics(&self) -> EngineStats;

    /// Stop the engine for this bus and release its pins.
    fn stop(self);
}

/// Factory of engine channels.
pub trait CanEngine {
    type Channel: EngineChannel;
    type Error: core::fmt::Debug;

    /// Start the engine for `bus` at `bitrate` bit/s.
    fn start(&mut self, bus: u8, bitrate: u32) -> Result<Self::Channel, Self::Error>;
}
