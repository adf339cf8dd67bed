//! Error definitions shared across library modules.
//! [`GatewayError`] covers every locally recovered failure (the gateway keeps
//! running); [`StartupError`] is the only fatal class and is surfaced to the
//! firmware's startup sequence.
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Failures of bus, codec and routing operations. None of them is fatal.
pub enum GatewayError {
    /// Bus index outside the configured range.
    #[error("Invalid bus {bus}")]
    InvalidBus { bus: u8 },
    /// Requested value outside the accepted bounds (e.g. bus count).
    #[error("Value {requested} outside 1..={max}")]
    InvalidRange { requested: u32, max: u32 },
    /// Bus already running at a different bitrate; disable it first.
    #[error("Bus {bus} already enabled at {bitrate} bps")]
    AlreadyEnabled { bus: u8, bitrate: u32 },
    /// Operation requires an enabled bus.
    #[error("Bus {bus} not enabled")]
    NotEnabled { bus: u8 },
    /// TX ring saturated: the frame was dropped and counted.
    #[error("TX buffer full on bus {bus}")]
    BufferFull { bus: u8 },
    /// RX ring saturated: the newest frame was dropped and counted.
    #[error("RX overflow on bus {bus}")]
    RxOverflow { bus: u8 },
    /// Malformed protocol input; the session resynchronized.
    #[error("Protocol parse error")]
    ParseError,
    /// Line protocol frame-send while the session is not open.
    #[error("Line session for bus {bus} is closed")]
    BusClosed { bus: u8 },
    /// Underlying CAN engine refused the request.
    #[error("CAN engine fault on bus {bus}")]
    EngineFault { bus: u8 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Resource-creation failures detected while bringing the gateway up.
pub enum StartupError {
    /// Configured bus count is zero or above the build limit.
    #[error("Invalid bus count {requested} (max {max})")]
    InvalidBusCount { requested: u8, max: u8 },
    /// Configuration names a bus the firmware is not built for.
    #[error("Unknown bus {bus}")]
    UnknownBus { bus: u8 },
    /// Startup bitrate is zero or above the supported maximum.
    #[error("Invalid bitrate {bitrate} for bus {bus}")]
    InvalidBitrate { bus: u8, bitrate: u32 },
    /// The CAN engine could not start a bus listed in the configuration.
    #[error("CAN engine failed to start bus {bus}")]
    EngineStart { bus: u8 },
    /// A task is pinned to a core the target does not have.
    #[error("Task {task} pinned to missing core {core}")]
    MissingCore { task: &'static str, core: u8 },
}
