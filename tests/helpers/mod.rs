/// Test doubles simulating the CAN engine, the host ports and the timer during
/// integration tests.
use korri_gateway::core::MAX_BUSES;
use korri_gateway::protocol::{
    arbiter::FallbackConsumer,
    bus::{CanEngine, EngineChannel, EngineStats, TxQueueFull},
    can_frame::CanFrame,
    traits::{
        byte_io::{ByteSink, ByteSource},
        timer::{Clock, GatewayTimer},
    },
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

#[derive(Default)]
#[allow(dead_code)]
/// One simulated bus: frames waiting to be received and frames put on the wire.
pub struct Wire {
    pub incoming: VecDeque<CanFrame>,
    pub sent: Vec<CanFrame>,
    pub stats: EngineStats,
    pub running: bool,
    /// Every transmitted frame comes back as a received one (a peer echoing).
    pub loopback: bool,
    /// Monotonic timestamp stamped on received frames.
    pub clock_us: u32,
}

pub type SharedWire = Arc<Mutex<Wire>>;

pub struct MockChannel {
    wire: SharedWire,
}

impl EngineChannel for MockChannel {
    fn poll_receive(&mut self) -> Option<CanFrame> {
        let mut wire = self.wire.lock().unwrap();
        let frame = wire.incoming.pop_front()?;
        wire.stats.rx_total += 1;
        wire.clock_us += 100;
        Some(frame.with_timestamp(wire.clock_us))
    }

    fn submit_transmit(&mut self, frame: &CanFrame) -> Result<(), TxQueueFull> {
        let mut wire = self.wire.lock().unwrap();
        wire.stats.tx_attempt += 1;
        wire.stats.tx_total += 1;
        wire.sent.push(*frame);
        if wire.loopback {
            wire.incoming.push_back(*frame);
        }
        Ok(())
    }

    fn statistics(&self) -> EngineStats {
        self.wire.lock().unwrap().stats
    }

    fn stop(self) {
        self.wire.lock().unwrap().running = false;
    }
}

#[derive(Clone, Default)]
#[allow(dead_code)]
/// In-memory engine; clones share the same wires so tests can observe them.
pub struct MockEngine {
    pub wires: [SharedWire; MAX_BUSES],
}

#[allow(dead_code)]
impl MockEngine {
    pub fn loopback() -> Self {
        let engine = Self::default();
        for wire in &engine.wires {
            wire.lock().unwrap().loopback = true;
        }
        engine
    }

    /// Queue a frame as if it arrived on `bus`.
    pub fn inject(&self, bus: usize, frame: CanFrame) {
        self.wires[bus].lock().unwrap().incoming.push_back(frame);
    }

    pub fn sent(&self, bus: usize) -> Vec<CanFrame> {
        self.wires[bus].lock().unwrap().sent.clone()
    }

    pub fn running(&self, bus: usize) -> bool {
        self.wires[bus].lock().unwrap().running
    }
}

impl CanEngine for MockEngine {
    type Channel = MockChannel;
    type Error = ();

    fn start(&mut self, bus: u8, _bitrate: u32) -> Result<MockChannel, ()> {
        let wire = self.wires.get(bus as usize).ok_or(())?.clone();
        wire.lock().unwrap().running = true;
        Ok(MockChannel { wire })
    }
}

#[derive(Clone, Default)]
#[allow(dead_code)]
/// Host port output; clones share the buffer.
pub struct RecordingSink(Arc<Mutex<Vec<u8>>>);

#[allow(dead_code)]
impl RecordingSink {
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.take()).into_owned()
    }
}

impl ByteSink for RecordingSink {
    fn write(&mut self, bytes: &[u8]) {
        self.0.lock().unwrap().extend_from_slice(bytes);
    }

    fn flush(&mut self) {}
}

#[derive(Clone, Default)]
#[allow(dead_code)]
/// Host port input fed by the test while the gateway runs.
pub struct HostInput(Arc<Mutex<VecDeque<u8>>>);

#[allow(dead_code)]
impl HostInput {
    pub fn push(&self, bytes: &[u8]) {
        self.0.lock().unwrap().extend(bytes.iter().copied());
    }
}

impl ByteSource for HostInput {
    fn read_byte(&mut self) -> Option<u8> {
        self.0.lock().unwrap().pop_front()
    }
}

#[derive(Clone, Default)]
#[allow(dead_code)]
/// Shell stand-in recording every byte the binary protocol left over.
pub struct FallbackRecorder(Arc<Mutex<Vec<u8>>>);

#[allow(dead_code)]
impl FallbackRecorder {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl FallbackConsumer for FallbackRecorder {
    fn accept(&mut self, byte: u8) {
        self.0.lock().unwrap().push(byte);
    }
}

#[allow(dead_code)]
/// Timer based on `tokio::time::sleep` to drive delays in tests.
pub struct MockTimer;

impl GatewayTimer for MockTimer {
    async fn delay_ms(&mut self, millis: u32) {
        if millis == 0 {
            tokio::task::yield_now().await;
        } else {
            sleep(Duration::from_millis(millis as u64)).await;
        }
    }
}

#[allow(dead_code)]
/// Clock frozen at a given microsecond count.
pub struct FixedClock(pub u32);

impl Clock for FixedClock {
    fn now_micros(&self) -> u32 {
        self.0
    }
}
