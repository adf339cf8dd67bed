//! Bus manager: owns every physical CAN bus, its RX/TX rings and the engine
//! channel running it.
//!
//! The manager is shared by reference between both cores. Host-side tasks call
//! [`BusManager::transmit`] and [`BusManager::receive`]; the bus service task
//! on the engine core calls [`BusManager::service`] to move frames between the
//! rings and the engine. Ring access is lock-free. The engine link sits behind
//! a short critical section that the host side only takes to enable or
//! disable a bus.
//!
//! RX overflow policy: drop-newest. Unread frames are never overwritten; the
//! rejected frame is counted in the bus's overflow counter.
pub mod control;
pub mod engine;

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;

use crate::core::{GatewayConfig, MAX_BITRATE, MAX_BUSES, RX_RING_CAPACITY, TX_RING_CAPACITY};
use crate::error::{GatewayError, StartupError};
use crate::infra::ring::FrameRing;
use crate::infra::snapshot::Snapshot;
use crate::protocol::can_frame::CanFrame;

pub use control::BusControl;
pub use engine::{CanEngine, EngineChannel, EngineStats, TxQueueFull};

/// Counters reported for one enabled bus.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusStats {
    /// Last engine counters mirrored by the service task. `None` before the
    /// first service pass or while the mirror is being refreshed.
    pub engine: Option<EngineStats>,
    pub rx_buffered: usize,
    pub tx_buffered: usize,
    /// Frames lost because the RX ring was full.
    pub rx_overflow: u32,
    /// Frames refused by `transmit` because the TX ring was full.
    pub tx_dropped: u32,
}

/// One-line summary of a bus, valid whether it is enabled or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusStatus {
    pub bus: u8,
    pub enabled: bool,
    pub bitrate: Option<u32>,
}

struct EngineLink<C> {
    channel: C,
    /// Frame the engine refused last pass; retried before the TX ring.
    pending_tx: Option<CanFrame>,
}

/// Per-bus state.
pub struct CanBus<M: RawMutex, C> {
    index: u8,
    enabled: AtomicBool,
    bitrate: AtomicU32,
    rx: FrameRing<RX_RING_CAPACITY>,
    tx: FrameRing<TX_RING_CAPACITY>,
    link: BlockingMutex<M, RefCell<Option<EngineLink<C>>>>,
    stats: Snapshot<M, EngineStats>,
    /// Set once the current link published into `stats`. Until then the
    /// mirror may still hold a previous session's counters.
    stats_fresh: AtomicBool,
}

impl<M: RawMutex, C> CanBus<M, C> {
    fn new(index: u8) -> Self {
        Self {
            index,
            enabled: AtomicBool::new(false),
            bitrate: AtomicU32::new(0),
            rx: FrameRing::new(),
            tx: FrameRing::new(),
            link: BlockingMutex::new(RefCell::new(None)),
            stats: Snapshot::new(),
            stats_fresh: AtomicBool::new(false),
        }
    }

    #[inline]
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn bitrate(&self) -> Option<u32> {
        self.is_enabled()
            .then(|| self.bitrate.load(Ordering::Acquire))
    }

    fn require_enabled(&self) -> Result<(), GatewayError> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(GatewayError::NotEnabled { bus: self.index })
        }
    }
}

//==================================================================================BUS_MANAGER
/// Owner of `N` CAN buses driven by engine `E`.
pub struct BusManager<M: RawMutex, E: CanEngine, const N: usize = MAX_BUSES> {
    engine: BlockingMutex<M, RefCell<E>>,
    buses: [CanBus<M, E::Channel>; N],
    bus_count: AtomicU8,
}

impl<M: RawMutex, E: CanEngine, const N: usize> BusManager<M, E, N> {
    /// Manager with every bus disabled and the bus count at `N`.
    pub fn new(engine: E) -> Self {
        Self {
            engine: BlockingMutex::new(RefCell::new(engine)),
            buses: core::array::from_fn(|i| CanBus::new(i as u8)),
            bus_count: AtomicU8::new(N as u8),
        }
    }

    /// Startup sequence: bus count, then every configured bus.
    pub fn apply(&self, config: &GatewayConfig) -> Result<(), StartupError> {
        self.set_bus_count(config.bus_count)
            .map_err(|_| StartupError::InvalidBusCount {
                requested: config.bus_count,
                max: N as u8,
            })?;

        for bus in 0..config.bus_count {
            if let Some(bitrate) = config.bitrate(bus) {
                self.enable(bus, bitrate).map_err(|_e| {
                    #[cfg(feature = "defmt")]
                    defmt::error!("startup: bus {} failed to start: {}", bus, _e);
                    StartupError::EngineStart { bus }
                })?;
            }
        }
        Ok(())
    }

    /// Bus within the configured count.
    fn bus(&self, bus: u8) -> Result<&CanBus<M, E::Channel>, GatewayError> {
        if bus >= self.bus_count() {
            return Err(GatewayError::InvalidBus { bus });
        }
        self.slot(bus)
    }

    /// Bus within the build limit, whatever the configured count.
    fn slot(&self, bus: u8) -> Result<&CanBus<M, E::Channel>, GatewayError> {
        self.buses
            .get(bus as usize)
            .ok_or(GatewayError::InvalidBus { bus })
    }

    #[inline]
    pub fn bus_count(&self) -> u8 {
        self.bus_count.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self, bus: u8) -> bool {
        self.bus(bus).map(CanBus::is_enabled).unwrap_or(false)
    }

    pub fn bitrate(&self, bus: u8) -> Option<u32> {
        self.bus(bus).ok()?.bitrate()
    }

    pub fn status(&self, bus: u8) -> Result<BusStatus, GatewayError> {
        let slot = self.bus(bus)?;
        Ok(BusStatus {
            bus,
            enabled: slot.is_enabled(),
            bitrate: slot.bitrate(),
        })
    }

    /// Start the engine for `bus`. Enabling again at the same bitrate is a
    /// no-op; at another bitrate it fails with `AlreadyEnabled`.
    pub fn enable(&self, bus: u8, bitrate: u32) -> Result<(), GatewayError> {
        let slot = self.bus(bus)?;
        if bitrate == 0 || bitrate > MAX_BITRATE {
            return Err(GatewayError::InvalidRange {
                requested: bitrate,
                max: MAX_BITRATE,
            });
        }

        // Holding the engine serializes enable/disable against each other.
        self.engine.lock(|engine| {
            if slot.is_enabled() {
                let current = slot.bitrate.load(Ordering::Acquire);
                return if current == bitrate {
                    Ok(())
                } else {
                    Err(GatewayError::AlreadyEnabled { bus, bitrate: current })
                };
            }

            let channel = engine.borrow_mut().start(bus, bitrate).map_err(|_e| {
                #[cfg(feature = "defmt")]
                defmt::error!("bus {}: engine refused {} bps: {}", bus, bitrate, defmt::Debug2Format(&_e));
                GatewayError::EngineFault { bus }
            })?;

            // Frames pushed by callers that raced the last disable.
            slot.rx.clear();
            slot.tx.clear();
            slot.stats_fresh.store(false, Ordering::Release);
            slot.stats.try_clear();
            slot.link.lock(|link| {
                *link.borrow_mut() = Some(EngineLink {
                    channel,
                    pending_tx: None,
                })
            });
            slot.bitrate.store(bitrate, Ordering::Release);
            slot.enabled.store(true, Ordering::Release);

            #[cfg(feature = "defmt")]
            defmt::info!("bus {} enabled at {} bps", bus, bitrate);
            Ok(())
        })
    }

    /// Stop the engine and drop every buffered frame. Idempotent; accepts any
    /// bus the firmware is built for, even beyond the current count.
    pub fn disable(&self, bus: u8) -> Result<(), GatewayError> {
        let slot = self.slot(bus)?;

        let was_enabled = self.engine.lock(|_| {
            let was_enabled = slot.enabled.swap(false, Ordering::AcqRel);
            if let Some(link) = slot.link.lock(|link| link.borrow_mut().take()) {
                link.channel.stop();
            }
            slot.stats_fresh.store(false, Ordering::Release);
            was_enabled
        });

        let _dropped = slot.rx.clear() + slot.tx.clear();
        slot.stats.try_clear();

        if was_enabled {
            #[cfg(feature = "defmt")]
            defmt::info!("bus {} disabled, {} buffered frames dropped", bus, _dropped);
        }
        Ok(())
    }

    /// Restart an enabled bus at a new bitrate. Status reads racing this call
    /// may briefly see the bus disabled.
    pub fn set_bitrate(&self, bus: u8, bitrate: u32) -> Result<(), GatewayError> {
        let slot = self.bus(bus)?;
        slot.require_enabled()?;
        if bitrate == 0 || bitrate > MAX_BITRATE {
            return Err(GatewayError::InvalidRange {
                requested: bitrate,
                max: MAX_BITRATE,
            });
        }
        if slot.bitrate.load(Ordering::Acquire) == bitrate {
            return Ok(());
        }

        self.disable(bus)?;
        self.enable(bus, bitrate)
    }

    /// Change the number of managed buses. Buses at or beyond `count` are
    /// disabled; the others keep their state.
    pub fn set_bus_count(&self, count: u8) -> Result<(), GatewayError> {
        if count == 0 || count as usize > N {
            return Err(GatewayError::InvalidRange {
                requested: count as u32,
                max: N as u32,
            });
        }

        self.bus_count.store(count, Ordering::Release);
        for bus in count..N as u8 {
            self.disable(bus)?;
        }
        Ok(())
    }

    /// Oldest received frame of `bus`, if any.
    pub fn receive(&self, bus: u8) -> Result<Option<CanFrame>, GatewayError> {
        let slot = self.bus(bus)?;
        slot.require_enabled()?;
        Ok(slot.rx.pop())
    }

    /// Queue a frame for transmission on `bus`. The frame is retagged with the
    /// bus index.
    pub fn transmit(&self, bus: u8, frame: CanFrame) -> Result<(), GatewayError> {
        let slot = self.bus(bus)?;
        slot.require_enabled()?;
        slot.tx.push(frame.with_bus(bus)).map_err(|_| {
            #[cfg(feature = "defmt")]
            defmt::warn!("bus {}: TX ring full, frame dropped", bus);
            GatewayError::BufferFull { bus }
        })
    }

    /// Producer entry for engines that deliver frames from an interrupt
    /// callback instead of being polled.
    pub fn push_rx(&self, bus: u8, frame: CanFrame) -> Result<(), GatewayError> {
        let slot = self.bus(bus)?;
        slot.require_enabled()?;
        slot.rx
            .push(frame.with_bus(bus))
            .map_err(|_| GatewayError::RxOverflow { bus })
    }

    /// Counters for an enabled bus. Never touches the engine.
    pub fn stats(&self, bus: u8) -> Result<BusStats, GatewayError> {
        let slot = self.bus(bus)?;
        slot.require_enabled()?;
        Ok(BusStats {
            engine: if slot.stats_fresh.load(Ordering::Acquire) {
                slot.stats.try_latest()
            } else {
                None
            },
            rx_buffered: slot.rx.len(),
            tx_buffered: slot.tx.len(),
            rx_overflow: slot.rx.rejected(),
            tx_dropped: slot.tx.rejected(),
        })
    }

    /// One service pass over `bus`: drain the engine into the RX ring, feed
    /// the TX ring to the engine in order, refresh the stats mirror.
    ///
    /// Returns the number of frames moved. Disabled buses yield `0`.
    pub fn service(&self, bus: u8) -> usize {
        let Ok(slot) = self.bus(bus) else {
            return 0;
        };

        slot.link.lock(|cell| {
            let mut guard = cell.borrow_mut();
            let Some(link) = guard.as_mut() else {
                return 0;
            };
            let mut moved = 0;

            // Bounded so a chattering bus cannot starve TX.
            for _ in 0..RX_RING_CAPACITY {
                let Some(frame) = link.channel.poll_receive() else {
                    break;
                };
                moved += 1;
                if slot.rx.push(frame.with_bus(bus)).is_err() {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("bus {}: RX overflow ({} total)", bus, slot.rx.rejected());
                }
            }

            loop {
                let Some(frame) = link.pending_tx.take().or_else(|| slot.tx.pop()) else {
                    break;
                };
                match link.channel.submit_transmit(&frame) {
                    Ok(()) => moved += 1,
                    Err(TxQueueFull) => {
                        link.pending_tx = Some(frame);
                        break;
                    }
                }
            }

            if slot.stats.try_publish(link.channel.statistics()) {
                slot.stats_fresh.store(true, Ordering::Release);
            }
            moved
        })
    }

    /// [`service`](Self::service) over every configured bus.
    pub fn service_all(&self) -> usize {
        (0..self.bus_count()).map(|bus| self.service(bus)).sum()
    }
}

impl<M: RawMutex, E: CanEngine, const N: usize> BusControl for BusManager<M, E, N> {
    fn bus_count(&self) -> u8 {
        BusManager::bus_count(self)
    }

    fn is_enabled(&self, bus: u8) -> bool {
        BusManager::is_enabled(self, bus)
    }

    fn bitrate(&self, bus: u8) -> Option<u32> {
        BusManager::bitrate(self, bus)
    }

    fn enable(&self, bus: u8, bitrate: u32) -> Result<(), GatewayError> {
        BusManager::enable(self, bus, bitrate)
    }

    fn disable(&self, bus: u8) -> Result<(), GatewayError> {
        BusManager::disable(self, bus)
    }

    fn set_bitrate(&self, bus: u8, bitrate: u32) -> Result<(), GatewayError> {
        BusManager::set_bitrate(self, bus, bitrate)
    }

    fn transmit(&self, bus: u8, frame: CanFrame) -> Result<(), GatewayError> {
        BusManager::transmit(self, bus, frame)
    }
}
