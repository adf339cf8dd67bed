//! SLCAN (Lawicel) ASCII line protocol, one session per bus on its own byte
//! channel.
//!
//! Lines end with `\r` (`\n` is accepted too). Replies are `\r` for success
//! and BEL (`\x07`) for failure. Received frames go out as `t`/`T`/`r`/`R`
//! lines while the session is open:
//!
//! ```text
//! t12320A0B   standard id 0x123, two bytes A0 B0
//! T1FFFFFFF0  extended id, no data
//! r1232       standard remote frame announcing two bytes
//! ```
use core::fmt::Write;

use embedded_can::{ExtendedId, StandardId};
use heapless::Vec;

use crate::core::MAX_LINE_LEN;
use crate::error::GatewayError;
use crate::protocol::bus::BusControl;
use crate::protocol::can_frame::{CanFrame, MAX_DLC};
use crate::protocol::traits::byte_io::{ByteSink, SinkWriter};
use crate::protocol::traits::frame_sink::FrameSink;
use crate::protocol::traits::timer::Clock;

const OK: &[u8] = b"\r";
const BELL: &[u8] = b"\x07";

/// Bitrates selected by `S0`..`S8`.
pub const SPEED_TABLE: [u32; 9] = [
    10_000, 20_000, 50_000, 100_000, 125_000, 250_000, 500_000, 800_000, 1_000_000,
];

/// Timestamps wrap every minute.
const TIMESTAMP_MODULO_MS: u64 = 60_000;

pub struct SlcanSession<B: BusControl, S: ByteSink, C: Clock> {
    index: u8,
    bus: B,
    sink: S,
    clock: C,
    open: bool,
    listen_only: bool,
    timestamps: bool,
    line: Vec<u8, MAX_LINE_LEN>,
    /// Current line outgrew the buffer; skip to the next terminator.
    overlong: bool,
    parse_errors: u32,
}

impl<B: BusControl, S: ByteSink, C: Clock> SlcanSession<B, S, C> {
    /// Closed session for bus `index`.
    pub fn new(index: u8, bus: B, sink: S, clock: C) -> Self {
        Self {
            index,
            bus,
            sink,
            clock,
            open: false,
            listen_only: false,
            timestamps: false,
            line: Vec::new(),
            overlong: false,
            parse_errors: 0,
        }
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    #[inline]
    pub fn bus_index(&self) -> u8 {
        self.index
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open
    }

    #[inline]
    pub fn is_listen_only(&self) -> bool {
        self.listen_only
    }

    #[inline]
    pub fn timestamps(&self) -> bool {
        self.timestamps
    }

    #[inline]
    pub fn parse_errors(&self) -> u32 {
        self.parse_errors
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Feed one inbound byte. A command runs when its terminator arrives; the
    /// result of that command is returned (it has already been answered on
    /// the wire).
    pub fn process_byte(&mut self, byte: u8) -> Result<(), GatewayError> {
        match byte {
            b'\r' | b'\n' => {
                if self.overlong {
                    self.overlong = false;
                    self.line.clear();
                    return self.reject(GatewayError::ParseError);
                }
                if self.line.is_empty() {
                    return Ok(());
                }
                let line = core::mem::take(&mut self.line);
                match self.dispatch(&line) {
                    Ok(()) => Ok(()),
                    Err(e) => self.reject(e),
                }
            }
            _ if self.overlong => Ok(()),
            _ => {
                if self.line.push(byte).is_err() {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("slcan{}: line too long, discarding", self.index);
                    self.overlong = true;
                    self.line.clear();
                }
                Ok(())
            }
        }
    }

    fn dispatch(&mut self, line: &[u8]) -> Result<(), GatewayError> {
        let (&command, args) = line.split_first().ok_or(GatewayError::ParseError)?;

        #[cfg(feature = "defmt")]
        defmt::debug!("slcan{}: command {=u8}", self.index, command);

        match command {
            b'O' | b'L' if args.is_empty() => {
                self.open = true;
                self.listen_only = command == b'L';
                self.reply(OK);
            }
            b'C' if args.is_empty() => {
                self.open = false;
                self.listen_only = false;
                self.reply(OK);
            }
            b'S' => self.set_speed(args)?,
            b't' | b'T' | b'r' | b'R' => self.send_frame(line)?,
            b'Z' => {
                self.timestamps = match args {
                    b"0" => false,
                    b"1" => true,
                    _ => return Err(GatewayError::ParseError),
                };
                self.reply(OK);
            }
            b'F' => self.reply(b"F00\r"),
            b'V' => self.reply(b"V1013\r"),
            b'N' => {
                let _ = write!(SinkWriter(&mut self.sink), "N{:04X}\r", self.index);
                self.sink.flush();
            }
            // Acceptance filters and UART settings: accepted, no effect.
            b'M' | b'm' | b'X' | b'Q' => self.reply(OK),
            _ => return Err(GatewayError::ParseError),
        }
        Ok(())
    }

    fn set_speed(&mut self, args: &[u8]) -> Result<(), GatewayError> {
        let bitrate = match args {
            [digit] => digit
                .checked_sub(b'0')
                .and_then(|n| SPEED_TABLE.get(n as usize))
                .copied()
                .ok_or(GatewayError::ParseError)?,
            _ => return Err(GatewayError::ParseError),
        };
        if self.open {
            return Err(GatewayError::AlreadyEnabled {
                bus: self.index,
                bitrate: self.bus.bitrate(self.index).unwrap_or(0),
            });
        }

        self.bus.set_bitrate(self.index, bitrate)?;
        self.reply(OK);
        Ok(())
    }

    fn send_frame(&mut self, line: &[u8]) -> Result<(), GatewayError> {
        if !self.open || self.listen_only {
            return Err(GatewayError::BusClosed { bus: self.index });
        }
        let frame = parse_frame(line).ok_or(GatewayError::ParseError)?;
        self.bus.transmit(self.index, frame)?;
        self.reply(if frame.is_extended() { b"Z\r" } else { b"z\r" });
        Ok(())
    }

    /// Answer BEL and hand the error back. Only malformed input counts as a
    /// parse error.
    fn reject(&mut self, error: GatewayError) -> Result<(), GatewayError> {
        if error == GatewayError::ParseError {
            self.parse_errors = self.parse_errors.saturating_add(1);
        }
        #[cfg(feature = "defmt")]
        defmt::warn!("slcan{}: {}", self.index, error);
        self.reply(BELL);
        Err(error)
    }

    fn reply(&mut self, bytes: &[u8]) {
        self.sink.write(bytes);
        self.sink.flush();
    }

    /// Write a received frame as a text line. Ignored while closed.
    pub fn comm_can_frame(&mut self, frame: &CanFrame) {
        if !self.open {
            return;
        }

        let tag = match (frame.is_extended(), frame.is_remote()) {
            (false, false) => 't',
            (true, false) => 'T',
            (false, true) => 'r',
            (true, true) => 'R',
        };

        let mut writer = SinkWriter(&mut self.sink);
        let _ = if frame.is_extended() {
            write!(writer, "{}{:08X}{:X}", tag, frame.raw_id(), frame.dlc())
        } else {
            write!(writer, "{}{:03X}{:X}", tag, frame.raw_id(), frame.dlc())
        };
        for byte in frame.data() {
            let _ = write!(writer, "{:02X}", byte);
        }
        if self.timestamps {
            // Taken from the millisecond clock: capture stamps are 32-bit
            // microseconds and would jump at their wrap.
            let millis = self.clock.now_millis() % TIMESTAMP_MODULO_MS;
            let _ = write!(writer, "{:04X}", millis);
        }
        let _ = writer.write_str("\r");
        self.sink.flush();
    }
}

impl<B: BusControl, S: ByteSink, C: Clock> FrameSink for SlcanSession<B, S, C> {
    fn deliver(&mut self, frame: &CanFrame) {
        self.comm_can_frame(frame);
    }
}

//==================================================================================PARSING
fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

fn parse_hex(digits: &[u8]) -> Option<u32> {
    digits
        .iter()
        .try_fold(0u32, |acc, &d| Some((acc << 4) | hex_value(d)? as u32))
}

/// Parse a `t`/`T`/`r`/`R` line into a frame. Data frames must carry exactly
/// `dlc` bytes.
pub fn parse_frame(line: &[u8]) -> Option<CanFrame> {
    let (&kind, rest) = line.split_first()?;
    let (extended, remote) = match kind {
        b't' => (false, false),
        b'T' => (true, false),
        b'r' => (false, true),
        b'R' => (true, true),
        _ => return None,
    };

    let id_len = if extended { 8 } else { 3 };
    let raw_id = parse_hex(rest.get(..id_len)?)?;
    let dlc = hex_value(*rest.get(id_len)?)? as usize;
    let payload = &rest[id_len + 1..];
    if dlc > MAX_DLC {
        return None;
    }

    if remote {
        if !payload.is_empty() {
            return None;
        }
        return if extended {
            CanFrame::remote_frame(ExtendedId::new(raw_id)?, dlc)
        } else {
            CanFrame::remote_frame(StandardId::new(u16::try_from(raw_id).ok()?)?, dlc)
        };
    }

    if payload.len() != dlc * 2 {
        return None;
    }
    let mut data = [0u8; MAX_DLC];
    for (slot, pair) in data.iter_mut().zip(payload.chunks_exact(2)) {
        *slot = (hex_value(pair[0])? << 4) | hex_value(pair[1])?;
    }

    if extended {
        CanFrame::extended(raw_id, &data[..dlc])
    } else {
        CanFrame::standard(u16::try_from(raw_id).ok()?, &data[..dlc])
    }
}
