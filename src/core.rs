//! Compile-time limits shared by every module, plus the runtime
//! [`GatewayConfig`] applied once at startup.
//!
//! Buffer capacities are powers of two: the frame rings are lock-free queues
//! indexed with wrapping atomics and reject any other size at construction.

use crate::error::StartupError;

/// Number of physical CAN buses the firmware is built for.
pub const MAX_BUSES: usize = 3;

/// Capacity of each per-bus receive ring (frames).
pub const RX_RING_CAPACITY: usize = 64;

/// Capacity of each per-bus transmit ring (frames).
pub const TX_RING_CAPACITY: usize = 32;

/// Longest SLCAN line accepted, terminator excluded.
///
/// `T` + 8 id digits + DLC + 16 data digits + 4 timestamp digits = 30.
pub const MAX_LINE_LEN: usize = 32;

/// Delay applied by polling tasks after a pass without any work (ms).
pub const IDLE_SLEEP_MS: u32 = 1;

/// Period of the task/CPU statistics sampler (ms).
pub const STATS_SAMPLE_INTERVAL_MS: u32 = 1000;

/// Bounded wait used on every statistics snapshot lock (ms).
pub const STATS_LOCK_TIMEOUT_MS: u32 = 100;

/// Maximum number of tasks tracked by one statistics sample.
pub const MAX_TASKS: usize = 16;

/// Capacity of the mailboxes carrying received frames to codec tasks.
pub const FRAME_MAILBOX_CAPACITY: usize = 32;

/// Firmware build number reported by the GVRET device-info reply.
pub const GVRET_BUILD_NUMBER: u16 = 618;

/// Settings layout version reported by the GVRET device-info reply.
pub const GVRET_EEPROM_VERSION: u8 = 0x20;

/// Highest bitrate a bus accepts (bps).
pub const MAX_BITRATE: u32 = 1_000_000;

//==================================================================================GATEWAY_CONFIG
/// Startup configuration: how many buses are managed and which ones come up
/// enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GatewayConfig {
    /// Number of managed buses (1..=MAX_BUSES).
    pub bus_count: u8,
    /// Startup bitrate per bus; `None` leaves the bus disabled.
    pub bitrates: [Option<u32>; MAX_BUSES],
    /// Delay applied by polling tasks when idle (ms).
    pub idle_sleep_ms: u32,
    /// Whether line codec sessions start with timestamps enabled.
    pub slcan_timestamps: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bus_count: MAX_BUSES as u8,
            bitrates: [None; MAX_BUSES],
            idle_sleep_ms: IDLE_SLEEP_MS,
            slcan_timestamps: false,
        }
    }
}

impl GatewayConfig {
    /// Entry point of the fluent builder.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder {
            config: Self::default(),
            unknown_bus: None,
        }
    }

    /// Startup bitrate configured for `bus`, if the bus starts enabled.
    pub fn bitrate(&self, bus: u8) -> Option<u32> {
        self.bitrates.get(bus as usize).copied().flatten()
    }
}

//==================================================================================GATEWAY_CONFIG_BUILDER
#[derive(Debug)]
/// Fluent builder validating the configuration on [`build`](Self::build).
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
    unknown_bus: Option<u8>,
}

impl GatewayConfigBuilder {
    /// Number of managed buses.
    pub fn bus_count(mut self, count: u8) -> Self {
        self.config.bus_count = count;
        self
    }

    /// Bring `bus` up at `bitrate` during startup. Out-of-range buses are
    /// reported by `build()`.
    pub fn bitrate(mut self, bus: u8, bitrate: u32) -> Self {
        match self.config.bitrates.get_mut(bus as usize) {
            Some(slot) => *slot = Some(bitrate),
            None => self.unknown_bus = Some(bus),
        }
        self
    }

    /// Delay applied by polling tasks when idle.
    pub fn idle_sleep_ms(mut self, millis: u32) -> Self {
        self.config.idle_sleep_ms = millis;
        self
    }

    /// Start line codec sessions with timestamps enabled.
    pub fn slcan_timestamps(mut self, enabled: bool) -> Self {
        self.config.slcan_timestamps = enabled;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<GatewayConfig, StartupError> {
        if let Some(bus) = self.unknown_bus {
            return Err(StartupError::UnknownBus { bus });
        }
        let count = self.config.bus_count;
        if count == 0 || count as usize > MAX_BUSES {
            return Err(StartupError::InvalidBusCount {
                requested: count,
                max: MAX_BUSES as u8,
            });
        }
        for (bus, bitrate) in self.config.bitrates.iter().enumerate() {
            if let Some(rate) = bitrate {
                if *rate == 0 || *rate > MAX_BITRATE {
                    return Err(StartupError::InvalidBitrate {
                        bus: bus as u8,
                        bitrate: *rate,
                    });
                }
            }
        }
        Ok(self.config)
    }
}
