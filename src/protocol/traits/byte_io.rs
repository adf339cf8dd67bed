//! Byte-oriented host channels: the gateway only needs "read one byte",
//! "write bytes" and "flush" from a USB CDC endpoint or a network stream.
use core::fmt;

/// Outbound byte channel. Writes never block: a sink that cannot keep up
/// drops bytes on its own side.
pub trait ByteSink {
    fn write(&mut self, bytes: &[u8]);
    fn flush(&mut self);
}

/// Inbound byte channel, polled without blocking.
pub trait ByteSource {
    /// Next pending byte, or `None` when nothing is buffered.
    fn read_byte(&mut self) -> Option<u8>;
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    fn write(&mut self, bytes: &[u8]) {
        (**self).write(bytes)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

/// Capture sink: keeps what fits and silently truncates the rest.
impl<const N: usize> ByteSink for heapless::Vec<u8, N> {
    fn write(&mut self, bytes: &[u8]) {
        let room = N - self.len();
        let take = bytes.len().min(room);
        let _ = self.extend_from_slice(&bytes[..take]);
    }

    fn flush(&mut self) {}
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }
}

/// A byte slice drains front to back.
impl ByteSource for &[u8] {
    fn read_byte(&mut self) -> Option<u8> {
        let (&byte, rest) = self.split_first()?;
        *self = rest;
        Some(byte)
    }
}

//==================================================================================MERGED_SOURCE
/// Two inbound channels at the same logical priority, e.g. the USB serial
/// endpoint and an optional telnet stream. The primary source is drained first
/// on every poll.
pub struct MergedSource<A, B> {
    primary: A,
    secondary: Option<B>,
}

impl<A: ByteSource, B: ByteSource> MergedSource<A, B> {
    pub fn new(primary: A, secondary: Option<B>) -> Self {
        Self { primary, secondary }
    }

    /// Attach or replace the secondary source (network client connected).
    pub fn attach(&mut self, secondary: B) {
        self.secondary = Some(secondary);
    }

    /// Drop the secondary source (network client gone).
    pub fn detach(&mut self) -> Option<B> {
        self.secondary.take()
    }
}

impl<A: ByteSource, B: ByteSource> ByteSource for MergedSource<A, B> {
    fn read_byte(&mut self) -> Option<u8> {
        self.primary
            .read_byte()
            .or_else(|| self.secondary.as_mut().and_then(ByteSource::read_byte))
    }
}

//==================================================================================SINK_WRITER
/// `core::fmt::Write` adapter so text replies are formatted straight into a
/// sink without an intermediate buffer.
pub struct SinkWriter<'a, S: ByteSink + ?Sized>(pub &'a mut S);

impl<S: ByteSink + ?Sized> fmt::Write for SinkWriter<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write(s.as_bytes());
        Ok(())
    }
}
