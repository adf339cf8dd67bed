use super::*;
use crate::protocol::fake::NullEngine;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

type Log = Rc<RefCell<Vec<(&'static str, CanFrame)>>>;

struct Recorder {
    name: &'static str,
    log: Log,
}

impl FrameSink for Recorder {
    fn deliver(&mut self, frame: &CanFrame) {
        self.log.borrow_mut().push((self.name, *frame));
    }
}

fn recorder(name: &'static str, log: &Log) -> Recorder {
    Recorder {
        name,
        log: log.clone(),
    }
}

fn frame_on(bus: u8, id: u16) -> CanFrame {
    CanFrame::standard(id, &[id as u8]).unwrap().with_bus(bus)
}

#[test]
fn test_binary_then_owning_line() {
    let log = Log::default();
    let activity = ActivityFlag::new();
    let mut router: FrameRouter<_, _> = FrameRouter::new(recorder("gvret", &log), &activity);
    router.attach(1, recorder("slcan1", &log)).unwrap();
    router.attach(2, recorder("slcan2", &log)).unwrap();

    let frame = frame_on(1, 0x100);
    router.route(&frame);

    assert_eq!(*log.borrow(), [("gvret", frame), ("slcan1", frame)]);
    assert!(activity.take());
    assert!(!activity.is_set());
}

#[test]
fn test_bus_without_line_only_reaches_binary() {
    let log = Log::default();
    let activity = ActivityFlag::new();
    let mut router: FrameRouter<_, _> = FrameRouter::new(recorder("gvret", &log), &activity);
    router.attach(0, recorder("slcan0", &log)).unwrap();
    assert!(router.detach(0).is_some());
    assert!(!router.has_line(0));

    router.route(&frame_on(0, 0x1));
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(router.routed(), 1);
}

#[test]
fn test_attach_rejects_unknown_bus() {
    let log = Log::default();
    let activity = ActivityFlag::new();
    let mut router: FrameRouter<_, _> = FrameRouter::new(recorder("gvret", &log), &activity);
    assert!(matches!(
        router.attach(MAX_BUSES as u8, recorder("x", &log)),
        Err(GatewayError::InvalidBus { .. })
    ));
}

#[test]
fn test_drain_preserves_per_bus_order() {
    let manager: BusManager<CriticalSectionRawMutex, NullEngine> = BusManager::new(NullEngine);
    manager.enable(0, 500_000).unwrap();
    manager.enable(2, 500_000).unwrap();
    for id in 1..=3 {
        manager.push_rx(0, frame_on(0, id)).unwrap();
        manager.push_rx(2, frame_on(2, 0x10 + id)).unwrap();
    }

    let log = Log::default();
    let activity = ActivityFlag::new();
    let mut router: FrameRouter<_, _> = FrameRouter::new(recorder("gvret", &log), &activity);
    router.attach(2, recorder("slcan2", &log)).unwrap();

    assert_eq!(router.drain(&manager), 6);
    let log = log.borrow();
    let bus0: Vec<u32> = log
        .iter()
        .filter(|(_, f)| f.bus() == 0)
        .map(|(_, f)| f.raw_id())
        .collect();
    assert_eq!(bus0, [1, 2, 3]);
    let line2: Vec<u32> = log
        .iter()
        .filter(|(sink, _)| *sink == "slcan2")
        .map(|(_, f)| f.raw_id())
        .collect();
    assert_eq!(line2, [0x11, 0x12, 0x13]);
}

#[test]
fn test_mailbox_counts_drops_when_full() {
    let channel: Channel<CriticalSectionRawMutex, CanFrame, 2> = Channel::new();
    let mut mailbox = FrameMailbox::new(channel.sender());

    for id in 0..3 {
        mailbox.deliver(&frame_on(0, id));
    }
    assert_eq!(mailbox.dropped(), 1);
    assert_eq!(channel.try_receive().ok().map(|f| f.raw_id()), Some(0));
    assert_eq!(channel.try_receive().ok().map(|f| f.raw_id()), Some(1));
    assert!(channel.try_receive().is_err());
}
