//! Unit tests for frame construction and the `embedded_can::Frame` bridge.
use super::*;
use embedded_can::Frame;

#[test]
/// Standard and extended constructors keep the identifier width.
fn test_identifier_kinds() {
    let std_frame = CanFrame::standard(0x123, &[1, 2]).expect("valid frame");
    assert!(!std_frame.is_extended());
    assert_eq!(std_frame.raw_id(), 0x123);

    let ext_frame = CanFrame::extended(0x1234_5678, &[]).expect("valid frame");
    assert!(ext_frame.is_extended());
    assert_eq!(ext_frame.raw_id(), 0x1234_5678);
}

#[test]
/// Out-of-range identifiers and payloads are refused.
fn test_limits() {
    assert!(CanFrame::standard(0x800, &[]).is_none());
    assert!(CanFrame::extended(0x2000_0000, &[]).is_none());
    assert!(CanFrame::standard(0x7FF, &[0; 9]).is_none());
    assert!(CanFrame::remote_frame(StandardId::ZERO, 9).is_none());
}

#[test]
/// Remote frames carry a DLC but expose no payload.
fn test_remote_frame() {
    let frame = CanFrame::remote_frame(StandardId::new(0x10).unwrap(), 4).unwrap();
    assert!(frame.is_remote());
    assert_eq!(frame.dlc(), 4);
    assert!(frame.data().is_empty());
}

#[test]
/// Retagging returns a copy and leaves the original untouched.
fn test_retagging() {
    let frame = CanFrame::standard(0x42, &[0xAA]).unwrap();
    let tagged = frame.with_bus(2).with_timestamp(1234);
    assert_eq!(frame.bus(), 0);
    assert_eq!(frame.timestamp_us(), None);
    assert_eq!(tagged.bus(), 2);
    assert_eq!(tagged.timestamp_us(), Some(1234));
    assert_eq!(tagged.data(), frame.data());
}

#[test]
/// The `embedded_can::Frame` implementation agrees with the inherent API.
fn test_embedded_can_bridge() {
    let frame = <CanFrame as Frame>::new(ExtendedId::new(0x18FF_0001).unwrap(), &[1, 2, 3])
        .expect("valid frame");
    assert!(Frame::is_extended(&frame));
    assert!(Frame::is_data_frame(&frame));
    assert_eq!(Frame::dlc(&frame), 3);
    assert_eq!(Frame::data(&frame), &[1, 2, 3]);
    assert_eq!(Frame::id(&frame), frame.id());
}
