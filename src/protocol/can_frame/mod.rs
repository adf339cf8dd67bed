//! In-memory representation of a classic CAN frame as it travels through the
//! gateway: from the engine into an RX ring, out to the host codecs, and from
//! the codecs back into a TX ring.
use embedded_can::{ExtendedId, Id, StandardId};

/// Largest classic CAN payload.
pub const MAX_DLC: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Classic CAN frame tagged with the bus it belongs to.
///
/// Fields are private: a frame is immutable once built and copied by value.
/// [`with_bus`](Self::with_bus) and [`with_timestamp`](Self::with_timestamp)
/// return retagged copies.
pub struct CanFrame {
    id: Id,
    remote: bool,
    len: u8,
    data: [u8; MAX_DLC],
    bus: u8,
    timestamp_us: Option<u32>,
}

impl CanFrame {
    /// Data frame with the given identifier. Returns `None` above eight bytes.
    pub fn data_frame(id: impl Into<Id>, payload: &[u8]) -> Option<Self> {
        if payload.len() > MAX_DLC {
            return None;
        }
        let mut data = [0u8; MAX_DLC];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            id: id.into(),
            remote: false,
            len: payload.len() as u8,
            data,
            bus: 0,
            timestamp_us: None,
        })
    }

    /// Remote-request frame announcing `dlc` bytes. Returns `None` above eight.
    pub fn remote_frame(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > MAX_DLC {
            return None;
        }
        Some(Self {
            id: id.into(),
            remote: true,
            len: dlc as u8,
            data: [0; MAX_DLC],
            bus: 0,
            timestamp_us: None,
        })
    }

    /// Data frame from a raw 11-bit identifier.
    pub fn standard(raw_id: u16, payload: &[u8]) -> Option<Self> {
        Self::data_frame(StandardId::new(raw_id)?, payload)
    }

    /// Data frame from a raw 29-bit identifier.
    pub fn extended(raw_id: u32, payload: &[u8]) -> Option<Self> {
        Self::data_frame(ExtendedId::new(raw_id)?, payload)
    }

    /// Copy of this frame attached to `bus`.
    pub fn with_bus(mut self, bus: u8) -> Self {
        self.bus = bus;
        self
    }

    /// Copy of this frame carrying a capture timestamp (µs).
    pub fn with_timestamp(mut self, timestamp_us: u32) -> Self {
        self.timestamp_us = Some(timestamp_us);
        self
    }

    /// Tagged identifier.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Identifier without its standard/extended tag.
    #[inline]
    pub fn raw_id(&self) -> u32 {
        match self.id {
            Id::Standard(id) => id.as_raw() as u32,
            Id::Extended(id) => id.as_raw(),
        }
    }

    #[inline]
    pub fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    #[inline]
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Data length code (0..=8).
    #[inline]
    pub fn dlc(&self) -> usize {
        self.len as usize
    }

    /// Payload bytes; empty for remote frames.
    #[inline]
    pub fn data(&self) -> &[u8] {
        if self.remote {
            &[]
        } else {
            &self.data[..self.len as usize]
        }
    }

    /// Bus the frame was received on or is destined to.
    #[inline]
    pub fn bus(&self) -> u8 {
        self.bus
    }

    /// Capture timestamp, when the engine supplied one.
    #[inline]
    pub fn timestamp_us(&self) -> Option<u32> {
        self.timestamp_us
    }
}

impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        Self::data_frame(id, data)
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        Self::remote_frame(id, dlc)
    }

    fn is_extended(&self) -> bool {
        CanFrame::is_extended(self)
    }

    fn is_remote_frame(&self) -> bool {
        self.remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.len as usize
    }

    fn data(&self) -> &[u8] {
        CanFrame::data(self)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
