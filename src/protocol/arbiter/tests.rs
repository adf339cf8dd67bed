use super::*;
use crate::protocol::fake::{FakeBus, FixedClock};
use crate::protocol::gvret::GvretSession;
use crate::protocol::traits::byte_io::MergedSource;
use heapless::Vec;
use std::vec::Vec as StdVec;

#[derive(Default)]
struct Shell {
    seen: StdVec<u8>,
}

impl FallbackConsumer for Shell {
    fn accept(&mut self, byte: u8) {
        self.seen.push(byte);
    }
}

/// Claims every even byte.
struct Evens;

impl ProtocolConsumer for Evens {
    fn process_byte(&mut self, byte: u8) -> bool {
        byte % 2 == 0
    }
}

#[test]
fn test_each_byte_has_exactly_one_consumer() {
    let mut arbiter = ByteArbiter::new(Evens, Shell::default());

    let routed: StdVec<Consumer> = (0u8..6).map(|b| arbiter.dispatch(b)).collect();
    assert_eq!(
        routed,
        [
            Consumer::Protocol,
            Consumer::Fallback,
            Consumer::Protocol,
            Consumer::Fallback,
            Consumer::Protocol,
            Consumer::Fallback
        ]
    );
    assert_eq!(arbiter.fallback_mut().seen, [1, 3, 5]);
}

#[test]
fn test_binary_command_then_shell_text() {
    let bus = FakeBus::enabled(3, 500_000);
    let gvret: GvretSession<_, Vec<u8, 64>, _> =
        GvretSession::new(&bus, Vec::new(), FixedClock(0));
    let mut arbiter = ByteArbiter::new(gvret, Shell::default());

    let mut stream = StdVec::from([0xF1, 0x0C]);
    stream.extend_from_slice(b"help\n");

    let routed: StdVec<Consumer> = stream.iter().map(|&b| arbiter.dispatch(b)).collect();
    assert_eq!(&routed[..2], &[Consumer::Protocol; 2]);
    assert!(routed[2..].iter().all(|c| *c == Consumer::Fallback));

    let (mut gvret, shell) = arbiter.into_parts();
    assert_eq!(shell.seen, b"help\n");
    assert_eq!(gvret.sink_mut().as_slice(), &[0xF1, 0x0C, 3]);
}

#[test]
fn test_drains_merged_sources_usb_first() {
    let mut arbiter = ByteArbiter::new(Evens, Shell::default());
    let usb: &[u8] = &[1, 2, 3];
    let telnet: &[u8] = &[5, 7];
    let mut source = MergedSource::new(usb, Some(telnet));

    assert_eq!(arbiter.dispatch_from(&mut source), 5);
    assert_eq!(arbiter.fallback_mut().seen, [1, 3, 5, 7]);
    assert_eq!(arbiter.dispatch_from(&mut source), 0);
}
