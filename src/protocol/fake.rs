//! In-memory doubles shared by the codec and router unit tests.
use core::cell::RefCell;
use std::vec::Vec;

use crate::core::MAX_BUSES;
use crate::error::GatewayError;
use crate::protocol::bus::{BusControl, CanEngine, EngineChannel, EngineStats, TxQueueFull};
use crate::protocol::can_frame::CanFrame;
use crate::protocol::traits::timer::Clock;

/// Bus control that records transmitted frames and tracks enable state.
pub struct FakeBus {
    pub count: u8,
    pub bitrates: RefCell<[Option<u32>; MAX_BUSES]>,
    pub sent: RefCell<Vec<(u8, CanFrame)>>,
}

impl FakeBus {
    pub fn new(count: u8) -> Self {
        Self {
            count,
            bitrates: RefCell::new([None; MAX_BUSES]),
            sent: RefCell::new(Vec::new()),
        }
    }

    /// All buses enabled at `bitrate`.
    pub fn enabled(count: u8, bitrate: u32) -> Self {
        let bus = Self::new(count);
        for index in 0..count as usize {
            bus.bitrates.borrow_mut()[index] = Some(bitrate);
        }
        bus
    }
}

impl BusControl for FakeBus {
    fn bus_count(&self) -> u8 {
        self.count
    }

    fn is_enabled(&self, bus: u8) -> bool {
        self.bitrate(bus).is_some()
    }

    fn bitrate(&self, bus: u8) -> Option<u32> {
        self.bitrates.borrow().get(bus as usize).copied().flatten()
    }

    fn enable(&self, bus: u8, bitrate: u32) -> Result<(), GatewayError> {
        self.bitrates.borrow_mut()[bus as usize] = Some(bitrate);
        Ok(())
    }

    fn disable(&self, bus: u8) -> Result<(), GatewayError> {
        self.bitrates.borrow_mut()[bus as usize] = None;
        Ok(())
    }

    fn set_bitrate(&self, bus: u8, bitrate: u32) -> Result<(), GatewayError> {
        if !self.is_enabled(bus) {
            return Err(GatewayError::NotEnabled { bus });
        }
        self.enable(bus, bitrate)
    }

    fn transmit(&self, bus: u8, frame: CanFrame) -> Result<(), GatewayError> {
        if !self.is_enabled(bus) {
            return Err(GatewayError::NotEnabled { bus });
        }
        self.sent.borrow_mut().push((bus, frame));
        Ok(())
    }
}

/// Clock frozen at a given microsecond count.
pub struct FixedClock(pub u32);

impl Clock for FixedClock {
    fn now_micros(&self) -> u32 {
        self.0
    }
}

/// Engine whose channels never receive and accept every transmission.
/// Frames are injected with `BusManager::push_rx`.
#[derive(Default)]
pub struct NullEngine;

pub struct NullChannel {
    stats: EngineStats,
}

impl EngineChannel for NullChannel {
    fn poll_receive(&mut self) -> Option<CanFrame> {
        None
    }

    fn submit_transmit(&mut self, _frame: &CanFrame) -> Result<(), TxQueueFull> {
        self.stats.tx_attempt += 1;
        self.stats.tx_total += 1;
        Ok(())
    }

    fn statistics(&self) -> EngineStats {
        self.stats
    }

    fn stop(self) {}
}

impl CanEngine for NullEngine {
    type Channel = NullChannel;
    type Error = ();

    fn start(&mut self, _bus: u8, _bitrate: u32) -> Result<NullChannel, ()> {
        Ok(NullChannel {
            stats: EngineStats::default(),
        })
    }
}
