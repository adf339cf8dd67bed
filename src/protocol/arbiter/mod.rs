//! Byte-stream arbiter: one inbound host stream shared by the binary codec and
//! the interactive shell.
//!
//! Every byte is offered to the protocol consumer first; only bytes it does
//! not claim reach the fallback. Each byte is handled by exactly one of them.
use crate::protocol::traits::byte_io::ByteSource;

/// Stateful protocol parser fed one byte at a time.
pub trait ProtocolConsumer {
    /// `true` if the byte belongs to the protocol and was consumed.
    fn process_byte(&mut self, byte: u8) -> bool;
}

/// Receiver of every byte the protocol did not claim (the shell).
pub trait FallbackConsumer {
    fn accept(&mut self, byte: u8);
}

impl<P: ProtocolConsumer + ?Sized> ProtocolConsumer for &mut P {
    fn process_byte(&mut self, byte: u8) -> bool {
        (**self).process_byte(byte)
    }
}

impl<F: FallbackConsumer + ?Sized> FallbackConsumer for &mut F {
    fn accept(&mut self, byte: u8) {
        (**self).accept(byte)
    }
}

/// Which consumer ended up with a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Consumer {
    Protocol,
    Fallback,
}

pub struct ByteArbiter<P: ProtocolConsumer, F: FallbackConsumer> {
    protocol: P,
    fallback: F,
}

impl<P: ProtocolConsumer, F: FallbackConsumer> ByteArbiter<P, F> {
    pub fn new(protocol: P, fallback: F) -> Self {
        Self { protocol, fallback }
    }

    /// Route one byte.
    pub fn dispatch(&mut self, byte: u8) -> Consumer {
        if self.protocol.process_byte(byte) {
            Consumer::Protocol
        } else {
            self.fallback.accept(byte);
            Consumer::Fallback
        }
    }

    /// Route everything currently buffered in `source`. Returns the number of
    /// bytes handled.
    pub fn dispatch_from<R: ByteSource>(&mut self, source: &mut R) -> usize {
        let mut handled = 0;
        while let Some(byte) = source.read_byte() {
            self.dispatch(byte);
            handled += 1;
        }
        handled
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    pub fn fallback_mut(&mut self) -> &mut F {
        &mut self.fallback
    }

    pub fn into_parts(self) -> (P, F) {
        (self.protocol, self.fallback)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
