//! GVRET binary host protocol, wire compatible with SavvyCAN-class capture
//! tools.
//!
//! One [`GvretSession`] serves every bus. Inbound commands start with the
//! `0xF1` sync byte followed by an opcode and a fixed or length-prefixed
//! payload; the session parses them one byte at a time so a command may be
//! split across any number of reads. Bytes that cannot start a command are
//! left for the shell.
//!
//! Frame command layout (host to gateway):
//! `F1 00 | id u32 LE (bit 31 = extended) | bus | len | data[len] | checksum`
//!
//! Frame layout (gateway to host, binary mode):
//! `F1 00 | timestamp u32 LE | id u32 LE | (bus << 4) | len | data[len] | 00`
use core::fmt::Write;

use heapless::Vec;

use crate::core::{GVRET_BUILD_NUMBER, GVRET_EEPROM_VERSION, MAX_BITRATE, MAX_BUSES};
use crate::protocol::arbiter::ProtocolConsumer;
use crate::protocol::bus::BusControl;
use crate::protocol::can_frame::{CanFrame, MAX_DLC};
use crate::protocol::traits::byte_io::{ByteSink, SinkWriter};
use crate::protocol::traits::frame_sink::FrameSink;
use crate::protocol::traits::timer::Clock;

/// Leading byte of every command and binary frame.
pub const SYNC: u8 = 0xF1;
/// Idle byte switching output to binary mode.
pub const BINARY_MODE: u8 = 0xE7;

const EXTENDED_FLAG: u32 = 0x8000_0000;
const STANDARD_MASK: u32 = 0x0000_07FF;
const EXTENDED_MASK: u32 = 0x1FFF_FFFF;

const SPEED_MASK: u32 = 0x000F_FFFF;
const SPEED_EXPLICIT: u32 = 0x8000_0000;
const SPEED_ENABLE: u32 = 0x4000_0000;
const SPEED_LISTEN_ONLY: u32 = 0x2000_0000;

const FLAG_ENABLED: u8 = 0x01;
const FLAG_LISTEN_ONLY: u8 = 0x10;

/// id + bus + len, before the data bytes of a frame command.
const FRAME_HEADER_LEN: usize = 6;
/// Largest in-flight payload: frame header, eight data bytes, checksum.
const PAYLOAD_CAPACITY: usize = FRAME_HEADER_LEN + MAX_DLC + 1;

/// Buses covered by the `0x05`/`0x06` commands; the extended pair covers the
/// next three.
const BASE_BUSES: u8 = 2;
const EXTENDED_BUSES: u8 = 3;

//==================================================================================COMMAND
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    BuildCanFrame,
    TimeSync,
    DigitalInputs,
    AnalogInputs,
    SetDigitalOutputs,
    SetupCanBus,
    CanBusParams,
    DeviceInfo,
    SingleWireMode,
    KeepAlive,
    SystemType,
    EchoCanFrame,
    BusCount,
    ExtendedBuses,
    SetupExtendedBuses,
}

impl Command {
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Some(match opcode {
            0x00 => Self::BuildCanFrame,
            0x01 => Self::TimeSync,
            0x02 => Self::DigitalInputs,
            0x03 => Self::AnalogInputs,
            0x04 => Self::SetDigitalOutputs,
            0x05 => Self::SetupCanBus,
            0x06 => Self::CanBusParams,
            0x07 => Self::DeviceInfo,
            0x08 => Self::SingleWireMode,
            0x09 => Self::KeepAlive,
            0x0A => Self::SystemType,
            0x0B => Self::EchoCanFrame,
            0x0C => Self::BusCount,
            0x0D => Self::ExtendedBuses,
            0x0E => Self::SetupExtendedBuses,
            _ => return None,
        })
    }

    pub fn opcode(self) -> u8 {
        match self {
            Self::BuildCanFrame => 0x00,
            Self::TimeSync => 0x01,
            Self::DigitalInputs => 0x02,
            Self::AnalogInputs => 0x03,
            Self::SetDigitalOutputs => 0x04,
            Self::SetupCanBus => 0x05,
            Self::CanBusParams => 0x06,
            Self::DeviceInfo => 0x07,
            Self::SingleWireMode => 0x08,
            Self::KeepAlive => 0x09,
            Self::SystemType => 0x0A,
            Self::EchoCanFrame => 0x0B,
            Self::BusCount => 0x0C,
            Self::ExtendedBuses => 0x0D,
            Self::SetupExtendedBuses => 0x0E,
        }
    }

    /// Payload bytes following the opcode. Frame commands start with the
    /// header length and grow once the length byte is known.
    fn payload_len(self) -> usize {
        match self {
            Self::BuildCanFrame | Self::EchoCanFrame => FRAME_HEADER_LEN,
            Self::SetDigitalOutputs | Self::SingleWireMode | Self::SystemType => 1,
            Self::SetupCanBus => 8,
            Self::SetupExtendedBuses => 12,
            _ => 0,
        }
    }

    fn carries_frame(self) -> bool {
        matches!(self, Self::BuildCanFrame | Self::EchoCanFrame)
    }
}

#[derive(Debug, Clone, Copy)]
enum ParseState {
    Idle,
    /// Sync byte seen, opcode next.
    Opcode,
    Payload {
        command: Command,
        step: usize,
        expected: usize,
        buffer: [u8; PAYLOAD_CAPACITY],
    },
}

//==================================================================================SESSION
/// GVRET session shared by every bus.
pub struct GvretSession<B: BusControl, S: ByteSink, C: Clock> {
    bus: B,
    sink: S,
    clock: C,
    binary_mode: bool,
    state: ParseState,
    parse_errors: u32,
    listen_only: [bool; MAX_BUSES],
}

impl<B: BusControl, S: ByteSink, C: Clock> GvretSession<B, S, C> {
    /// Session in text output mode, awaiting a command.
    pub fn new(bus: B, sink: S, clock: C) -> Self {
        Self {
            bus,
            sink,
            clock,
            binary_mode: false,
            state: ParseState::Idle,
            parse_errors: 0,
            listen_only: [false; MAX_BUSES],
        }
    }

    #[inline]
    pub fn binary_mode(&self) -> bool {
        self.binary_mode
    }

    /// Output format toggle. Inbound parsing is unaffected.
    pub fn set_binary_mode(&mut self, on: bool) {
        self.binary_mode = on;
    }

    /// Unknown opcodes seen since the session started.
    #[inline]
    pub fn parse_errors(&self) -> u32 {
        self.parse_errors
    }

    /// Listen-only flag last requested by the host for `bus`.
    pub fn listen_only(&self, bus: u8) -> bool {
        self.listen_only.get(bus as usize).copied().unwrap_or(false)
    }

    /// `true` while a command is partially received.
    pub fn in_command(&self) -> bool {
        !matches!(self.state, ParseState::Idle)
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Feed one inbound byte. Returns `true` when the byte belongs to this
    /// protocol, `false` when it should go to the fallback consumer.
    pub fn process_byte(&mut self, byte: u8) -> bool {
        match self.state {
            ParseState::Idle => match byte {
                BINARY_MODE => {
                    self.binary_mode = true;
                    true
                }
                SYNC => {
                    self.state = ParseState::Opcode;
                    true
                }
                _ => false,
            },
            ParseState::Opcode => {
                self.start_command(byte);
                true
            }
            ParseState::Payload {
                command,
                mut step,
                mut expected,
                mut buffer,
            } => {
                buffer[step] = byte;
                step += 1;

                if command.carries_frame() && step == FRAME_HEADER_LEN {
                    expected = FRAME_HEADER_LEN + frame_len(byte) + 1;
                }

                if step >= expected {
                    self.state = ParseState::Idle;
                    self.execute(command, &buffer[..step]);
                } else {
                    self.state = ParseState::Payload {
                        command,
                        step,
                        expected,
                        buffer,
                    };
                }
                true
            }
        }
    }

    fn start_command(&mut self, opcode: u8) {
        let Some(command) = Command::from_opcode(opcode) else {
            self.parse_errors = self.parse_errors.saturating_add(1);
            self.state = ParseState::Idle;
            #[cfg(feature = "defmt")]
            defmt::warn!("gvret: unknown opcode {=u8:#x}", opcode);
            return;
        };

        #[cfg(feature = "defmt")]
        defmt::debug!("gvret: command {}", command);

        let expected = command.payload_len();
        if expected == 0 {
            self.state = ParseState::Idle;
            self.execute(command, &[]);
        } else {
            self.state = ParseState::Payload {
                command,
                step: 0,
                expected,
                buffer: [0; PAYLOAD_CAPACITY],
            };
        }
    }

    fn execute(&mut self, command: Command, payload: &[u8]) {
        match command {
            Command::BuildCanFrame => {
                if let Some((bus, frame)) = self.decode_frame(payload) {
                    if let Err(_e) = self.bus.transmit(bus, frame) {
                        #[cfg(feature = "defmt")]
                        defmt::warn!("gvret: transmit on bus {} failed: {}", bus, _e);
                    }
                }
            }
            Command::EchoCanFrame => {
                if let Some((bus, frame)) = self.decode_frame(payload) {
                    self.emit_frame(bus, &frame);
                }
            }
            Command::TimeSync => {
                let mut reply = reply_header(command);
                let _ = reply.extend_from_slice(&self.clock.now_micros().to_le_bytes());
                self.send(&reply);
            }
            Command::DigitalInputs => self.send(&[SYNC, command.opcode(), 0x00, 0x00]),
            Command::AnalogInputs => {
                let mut reply = reply_header(command);
                let _ = reply.extend_from_slice(&[0; 9]);
                self.send(&reply);
            }
            Command::SetupCanBus => {
                for (index, word) in speed_words(payload).take(BASE_BUSES as usize) {
                    self.apply_speed(index, word);
                }
            }
            Command::SetupExtendedBuses => {
                for (index, word) in speed_words(payload).take(EXTENDED_BUSES as usize) {
                    self.apply_speed(BASE_BUSES + index, word);
                }
            }
            Command::CanBusParams => {
                let mut reply = reply_header(command);
                for bus in 0..BASE_BUSES {
                    self.push_bus_params(&mut reply, bus);
                }
                self.send(&reply);
            }
            Command::ExtendedBuses => {
                let mut reply = reply_header(command);
                for bus in BASE_BUSES..BASE_BUSES + EXTENDED_BUSES {
                    self.push_bus_params(&mut reply, bus);
                }
                self.send(&reply);
            }
            Command::DeviceInfo => {
                let build = GVRET_BUILD_NUMBER.to_le_bytes();
                self.send(&[
                    SYNC,
                    command.opcode(),
                    build[0],
                    build[1],
                    GVRET_EEPROM_VERSION,
                    0x00,
                    0x00,
                    0x00,
                ]);
            }
            Command::KeepAlive => self.send(&[SYNC, command.opcode(), 0xDE, 0xAD]),
            Command::BusCount => {
                let count = self.bus.bus_count();
                self.send(&[SYNC, command.opcode(), count]);
            }
            // Accepted for compatibility; the gateway has no such hardware.
            Command::SetDigitalOutputs | Command::SingleWireMode | Command::SystemType => {}
        }
    }

    /// Decode a frame command payload. Frames for buses beyond the bus count
    /// are acknowledged and dropped.
    fn decode_frame(&self, payload: &[u8]) -> Option<(u8, CanFrame)> {
        let raw = u32::from_le_bytes(payload.get(0..4)?.try_into().ok()?);
        let bus = *payload.get(4)?;
        let len = frame_len(*payload.get(5)?);
        let data = payload.get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len)?;

        if bus >= self.bus.bus_count() {
            #[cfg(feature = "defmt")]
            defmt::debug!("gvret: frame for unknown bus {} ignored", bus);
            return None;
        }

        let frame = if raw & EXTENDED_FLAG != 0 {
            CanFrame::extended(raw & EXTENDED_MASK, data)
        } else {
            CanFrame::standard((raw & STANDARD_MASK) as u16, data)
        }?;
        Some((bus, frame.with_bus(bus)))
    }

    /// Apply one speed word from a setup command.
    fn apply_speed(&mut self, bus: u8, word: u32) {
        if bus >= self.bus.bus_count() {
            return;
        }

        let bitrate = (word & SPEED_MASK).min(MAX_BITRATE);
        let (enable, listen_only) = if word & SPEED_EXPLICIT != 0 {
            (word & SPEED_ENABLE != 0, word & SPEED_LISTEN_ONLY != 0)
        } else {
            (bitrate != 0, false)
        };

        if let Some(flag) = self.listen_only.get_mut(bus as usize) {
            *flag = enable && listen_only;
        }

        let result = if !enable {
            self.bus.disable(bus)
        } else if bitrate == 0 {
            // Enable request without a speed keeps the current one.
            Ok(())
        } else if self.bus.is_enabled(bus) {
            self.bus.set_bitrate(bus, bitrate)
        } else {
            self.bus.enable(bus, bitrate)
        };

        if let Err(_e) = result {
            #[cfg(feature = "defmt")]
            defmt::warn!("gvret: bus {} setup failed: {}", bus, _e);
        }
    }

    fn push_bus_params(&self, reply: &mut Vec<u8, REPLY_CAPACITY>, bus: u8) {
        let (flags, speed) = match self.bus.bitrate(bus) {
            Some(bitrate) if bus < self.bus.bus_count() => {
                let listen = if self.listen_only(bus) { FLAG_LISTEN_ONLY } else { 0 };
                (FLAG_ENABLED | listen, bitrate)
            }
            _ => (0, 0),
        };
        let _ = reply.push(flags);
        let _ = reply.extend_from_slice(&speed.to_le_bytes());
    }

    fn send(&mut self, bytes: &[u8]) {
        self.sink.write(bytes);
        self.sink.flush();
    }

    /// Serialize a received frame for the host, in binary or text form
    /// depending on the output mode.
    pub fn emit_frame(&mut self, bus: u8, frame: &CanFrame) {
        let timestamp = frame
            .timestamp_us()
            .unwrap_or_else(|| self.clock.now_micros());

        if self.binary_mode {
            let raw = if frame.is_extended() {
                frame.raw_id() | EXTENDED_FLAG
            } else {
                frame.raw_id()
            };
            let data = frame.data();

            let mut out: Vec<u8, REPLY_CAPACITY> = Vec::new();
            let _ = out.extend_from_slice(&[SYNC, Command::BuildCanFrame.opcode()]);
            let _ = out.extend_from_slice(&timestamp.to_le_bytes());
            let _ = out.extend_from_slice(&raw.to_le_bytes());
            let _ = out.push((bus << 4) | frame.dlc() as u8);
            // The length nibble always announces `dlc` bytes; remote frames
            // carry them as zeros.
            if frame.is_remote() {
                let _ = out.extend_from_slice(&[0u8; MAX_DLC][..frame.dlc()]);
            } else {
                let _ = out.extend_from_slice(data);
            }
            let _ = out.push(0x00);
            self.send(&out);
        } else {
            let mut writer = SinkWriter(&mut self.sink);
            let kind = if frame.is_extended() { 'X' } else { 'S' };
            let _ = write!(
                writer,
                "{} - {:X} {} {} {}",
                timestamp,
                frame.raw_id(),
                kind,
                bus,
                frame.dlc()
            );
            for byte in frame.data() {
                let _ = write!(writer, " {:X}", byte);
            }
            let _ = writer.write_str("\r\n");
            self.sink.flush();
        }
    }
}

/// Largest reply or outbound binary frame.
const REPLY_CAPACITY: usize = 24;

fn reply_header(command: Command) -> Vec<u8, REPLY_CAPACITY> {
    let mut reply = Vec::new();
    let _ = reply.extend_from_slice(&[SYNC, command.opcode()]);
    reply
}

/// Data length carried by a frame command's length byte.
#[inline]
fn frame_len(byte: u8) -> usize {
    ((byte & 0x0F) as usize).min(MAX_DLC)
}

/// Little-endian speed words of a setup payload, indexed from zero.
fn speed_words(payload: &[u8]) -> impl Iterator<Item = (u8, u32)> + '_ {
    payload
        .chunks_exact(4)
        .enumerate()
        .map(|(index, chunk)| {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            (index as u8, word)
        })
}

impl<B: BusControl, S: ByteSink, C: Clock> ProtocolConsumer for GvretSession<B, S, C> {
    fn process_byte(&mut self, byte: u8) -> bool {
        GvretSession::process_byte(self, byte)
    }
}

impl<B: BusControl, S: ByteSink, C: Clock> FrameSink for GvretSession<B, S, C> {
    fn deliver(&mut self, frame: &CanFrame) {
        self.emit_frame(frame.bus(), frame);
    }
}
