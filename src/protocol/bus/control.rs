use crate::error::GatewayError;
use crate::protocol::can_frame::CanFrame;

/// Bus operations available to the host-protocol codecs.
///
/// Every call is non-blocking; codecs run on the host-I/O core and must never
/// wait on the bus side.
pub trait BusControl {
    fn bus_count(&self) -> u8;
    fn is_enabled(&self, bus: u8) -> bool;
    /// Configured bitrate, `None` while the bus is disabled.
    fn bitrate(&self, bus: u8) -> Option<u32>;
    fn enable(&self, bus: u8, bitrate: u32) -> Result<(), GatewayError>;
    fn disable(&self, bus: u8) -> Result<(), GatewayError>;
    fn set_bitrate(&self, bus: u8, bitrate: u32) -> Result<(), GatewayError>;
    fn transmit(&self, bus: u8, frame: CanFrame) -> Result<(), GatewayError>;
}

impl<B: BusControl + ?Sized> BusControl for &B {
    fn bus_count(&self) -> u8 {
        (**self).bus_count()
    }

    fn is_enabled(&self, bus: u8) -> bool {
        (**self).is_enabled(bus)
    }

    fn bitrate(&self, bus: u8) -> Option<u32> {
        (**self).bitrate(bus)
    }

    fn enable(&self, bus: u8, bitrate: u32) -> Result<(), GatewayError> {
        (**self).enable(bus, bitrate)
    }

    fn disable(&self, bus: u8) -> Result<(), GatewayError> {
        (**self).disable(bus)
    }

    fn set_bitrate(&self, bus: u8, bitrate: u32) -> Result<(), GatewayError> {
        (**self).set_bitrate(bus, bitrate)
    }

    fn transmit(&self, bus: u8, frame: CanFrame) -> Result<(), GatewayError> {
        (**self).transmit(bus, frame)
    }
}
