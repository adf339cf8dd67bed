//! Task topology and the loops that drive the gateway.
//!
//! Core 1 runs the CAN engine and the bus service loop and nothing else; every
//! host-facing task lives on core 0. Each loop does one non-blocking pass,
//! then either yields (the pass found work) or sleeps for the idle delay.
//!
//! Firmware spawns one task per [`TASK_TABLE`] entry with its executor of
//! choice and hands it the matching loop below.
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Receiver;

use crate::core::{GatewayConfig, IDLE_SLEEP_MS, STATS_SAMPLE_INTERVAL_MS};
use crate::error::StartupError;
use crate::protocol::arbiter::{ByteArbiter, FallbackConsumer, ProtocolConsumer};
use crate::protocol::bus::{BusControl, BusManager, CanEngine};
use crate::protocol::can_frame::CanFrame;
use crate::protocol::router::{ActivityFlag, FrameRouter};
use crate::protocol::slcan::SlcanSession;
use crate::protocol::traits::byte_io::{ByteSink, ByteSource};
use crate::protocol::traits::frame_sink::FrameSink;
use crate::protocol::traits::timer::{Clock, GatewayTimer};
use crate::stats::{SystemStats, TaskStatsSource};

//==================================================================================TOPOLOGY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Core {
    /// USB, codecs, router, statistics.
    Host = 0,
    /// CAN engine and bus service.
    Bus = 1,
}

impl Core {
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Scheduler affinity bitmask.
    pub const fn affinity_mask(self) -> u32 {
        1 << self as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskRole {
    UsbDevice,
    BusService,
    FrameRouter,
    HostCommand,
    LineCodec { bus: u8 },
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskSpec {
    pub name: &'static str,
    pub role: TaskRole,
    pub core: Core,
    /// Higher runs first.
    pub priority: u8,
}

impl TaskSpec {
    const fn new(name: &'static str, role: TaskRole, core: Core, priority: u8) -> Self {
        Self {
            name,
            role,
            core,
            priority,
        }
    }

    pub const fn affinity_mask(&self) -> u32 {
        self.core.affinity_mask()
    }
}

/// Every task the gateway spawns.
pub const TASK_TABLE: &[TaskSpec] = &[
    TaskSpec::new("usb", TaskRole::UsbDevice, Core::Host, 4),
    TaskSpec::new("can", TaskRole::BusService, Core::Bus, 7),
    TaskSpec::new("router", TaskRole::FrameRouter, Core::Host, 5),
    TaskSpec::new("gvret", TaskRole::HostCommand, Core::Host, 6),
    TaskSpec::new("slcan0", TaskRole::LineCodec { bus: 0 }, Core::Host, 3),
    TaskSpec::new("slcan1", TaskRole::LineCodec { bus: 1 }, Core::Host, 3),
    TaskSpec::new("slcan2", TaskRole::LineCodec { bus: 2 }, Core::Host, 3),
    TaskSpec::new("stats", TaskRole::Stats, Core::Host, 1),
];

/// Check that every task can be placed on a target with `core_count` cores.
pub fn validate(table: &[TaskSpec], core_count: u8) -> Result<(), StartupError> {
    match table.iter().find(|task| task.core.index() >= core_count) {
        Some(task) => Err(StartupError::MissingCore {
            task: task.name,
            core: task.core.index(),
        }),
        None => Ok(()),
    }
}

/// Tasks pinned to `core`, in table order.
pub fn tasks_on(table: &[TaskSpec], core: Core) -> impl Iterator<Item = &TaskSpec> {
    table.iter().filter(move |task| task.core == core)
}

/// Startup sequence: check the task placement, then bring the buses up.
pub fn bring_up<M: RawMutex, E: CanEngine, const N: usize>(
    manager: &BusManager<M, E, N>,
    config: &GatewayConfig,
    core_count: u8,
) -> Result<(), StartupError> {
    validate(TASK_TABLE, core_count)?;
    manager.apply(config)?;
    #[cfg(feature = "defmt")]
    defmt::info!(
        "gateway up: {} buses, {} tasks",
        manager.bus_count(),
        TASK_TABLE.len()
    );
    Ok(())
}

//==================================================================================IDLE
/// Delay after a polling pass: yield when the pass did work, sleep otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleBackoff {
    idle_ms: u32,
}

impl Default for IdleBackoff {
    fn default() -> Self {
        Self::new(IDLE_SLEEP_MS)
    }
}

impl IdleBackoff {
    pub const fn new(idle_ms: u32) -> Self {
        Self { idle_ms }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.idle_sleep_ms)
    }

    /// Milliseconds to wait; `0` means yield.
    #[inline]
    pub fn pause(&self, work: usize) -> u32 {
        if work > 0 {
            0
        } else {
            self.idle_ms
        }
    }
}

/// Consumer side of the [`ActivityFlag`]: reports when no frame was routed for
/// `timeout_ms`.
pub struct IdleTimer<'a> {
    activity: &'a ActivityFlag,
    timeout_us: u32,
    last_activity_us: u32,
}

impl<'a> IdleTimer<'a> {
    pub fn new(activity: &'a ActivityFlag, timeout_ms: u32, now_us: u32) -> Self {
        Self {
            activity,
            timeout_us: timeout_ms.saturating_mul(1000),
            last_activity_us: now_us,
        }
    }

    /// Consume the flag and tell whether the gateway went idle.
    pub fn poll<C: Clock>(&mut self, clock: &C) -> bool {
        let now = clock.now_micros();
        if self.activity.take() {
            self.last_activity_us = now;
            return false;
        }
        now.wrapping_sub(self.last_activity_us) >= self.timeout_us
    }
}

//==================================================================================PASSES
/// One host command pass: route the inbound bytes through the arbiter, then
/// hand queued frames to the protocol codec. Returns the amount of work done.
pub fn host_command_pass<P, F, R, M, const C: usize>(
    arbiter: &mut ByteArbiter<P, F>,
    source: &mut R,
    inbox: &Receiver<'_, M, CanFrame, C>,
) -> usize
where
    P: ProtocolConsumer + FrameSink,
    F: FallbackConsumer,
    R: ByteSource,
    M: RawMutex,
{
    let mut work = arbiter.dispatch_from(source);
    for _ in 0..C {
        let Ok(frame) = inbox.try_receive() else {
            break;
        };
        arbiter.protocol_mut().deliver(&frame);
        work += 1;
    }
    work
}

/// One line codec pass: feed the port's bytes to the session, then write out
/// queued frames for its bus.
pub fn line_codec_pass<B, S, Ck, R, M, const C: usize>(
    session: &mut SlcanSession<B, S, Ck>,
    source: &mut R,
    inbox: &Receiver<'_, M, CanFrame, C>,
) -> usize
where
    B: BusControl,
    S: ByteSink,
    Ck: Clock,
    R: ByteSource,
    M: RawMutex,
{
    let mut work = 0;
    while let Some(byte) = source.read_byte() {
        if let Err(_err) = session.process_byte(byte) {
            #[cfg(feature = "defmt")]
            defmt::debug!("slcan{}: {}", session.bus_index(), _err);
        }
        work += 1;
    }
    for _ in 0..C {
        let Ok(frame) = inbox.try_receive() else {
            break;
        };
        session.deliver(&frame);
        work += 1;
    }
    work
}

//==================================================================================TASKS
/// Core 1: move frames between the engine and the rings of every bus.
pub async fn bus_service_task<M, E, T, const N: usize>(
    manager: &BusManager<M, E, N>,
    mut timer: T,
    backoff: IdleBackoff,
) -> !
where
    M: RawMutex,
    E: CanEngine,
    T: GatewayTimer,
{
    loop {
        let work = manager.service_all();
        timer.delay_ms(backoff.pause(work)).await;
    }
}

/// Drain the RX rings into the router.
pub async fn frame_router_task<G, L, M, E, T, const N: usize, const B: usize>(
    router: &mut FrameRouter<'_, G, L, N>,
    manager: &BusManager<M, E, B>,
    mut timer: T,
    backoff: IdleBackoff,
) -> !
where
    G: FrameSink,
    L: FrameSink,
    M: RawMutex,
    E: CanEngine,
    T: GatewayTimer,
{
    loop {
        let work = router.drain(manager);
        timer.delay_ms(backoff.pause(work)).await;
    }
}

/// Host stream: arbiter in front of the binary codec and the shell.
pub async fn host_command_task<P, F, R, M, T, const C: usize>(
    arbiter: &mut ByteArbiter<P, F>,
    mut source: R,
    inbox: Receiver<'_, M, CanFrame, C>,
    mut timer: T,
    backoff: IdleBackoff,
) -> !
where
    P: ProtocolConsumer + FrameSink,
    F: FallbackConsumer,
    R: ByteSource,
    M: RawMutex,
    T: GatewayTimer,
{
    loop {
        let work = host_command_pass(arbiter, &mut source, &inbox);
        timer.delay_ms(backoff.pause(work)).await;
    }
}

/// Line port of one bus.
pub async fn line_codec_task<B, S, Ck, R, M, T, const C: usize>(
    session: &mut SlcanSession<B, S, Ck>,
    mut source: R,
    inbox: Receiver<'_, M, CanFrame, C>,
    mut timer: T,
    backoff: IdleBackoff,
) -> !
where
    B: BusControl,
    S: ByteSink,
    Ck: Clock,
    R: ByteSource,
    M: RawMutex,
    T: GatewayTimer,
{
    loop {
        let work = line_codec_pass(session, &mut source, &inbox);
        timer.delay_ms(backoff.pause(work)).await;
    }
}

/// Sample the scheduler once per period. A cycle whose publication times out
/// is skipped.
pub async fn stats_collection_task<M, S, T>(stats: &SystemStats<M>, mut source: S, mut timer: T) -> !
where
    M: RawMutex,
    S: TaskStatsSource,
    T: GatewayTimer,
{
    loop {
        let sample = source.sample();
        if !stats.publish(sample, &mut timer).await {
            #[cfg(feature = "defmt")]
            defmt::warn!("stats sample dropped: snapshot busy");
        }
        timer.delay_ms(STATS_SAMPLE_INTERVAL_MS).await;
    }
}
